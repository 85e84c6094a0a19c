//! Event type to category assignment.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::rule::normalize;

pub const DEFAULT_FALLBACK: &str = "GENERAL";

/// Substring rule: any event type containing `needle` maps to `category`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub needle: String,
    pub category: String,
}

impl KeywordRule {
    pub fn new(needle: &str, category: &str) -> Self {
        Self {
            needle: normalize(needle),
            category: normalize(category),
        }
    }
}

/// Two-tier category assignment: exact membership first, then the first
/// keyword whose needle occurs in the event type, then the fallback.
///
/// Keyword matching is a best-effort default, not a security boundary: a
/// creatively named event type can land in an unexpected category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryResolver {
    exact: HashMap<String, String>,
    keywords: Vec<KeywordRule>,
    fallback: String,
}

impl CategoryResolver {
    pub fn new(
        exact: HashMap<String, String>,
        keywords: Vec<KeywordRule>,
        fallback: impl Into<String>,
    ) -> Self {
        let fallback = normalize(&fallback.into());
        Self {
            exact: exact
                .into_iter()
                .map(|(event_type, category)| (normalize(&event_type), normalize(&category)))
                .collect(),
            keywords: keywords
                .into_iter()
                .map(|k| KeywordRule::new(&k.needle, &k.category))
                .filter(|k| !k.needle.is_empty())
                .collect(),
            fallback: if fallback.is_empty() {
                DEFAULT_FALLBACK.to_string()
            } else {
                fallback
            },
        }
    }

    pub fn category_for(&self, event_type: &str) -> String {
        let event_type = normalize(event_type);
        if let Some(category) = self.exact.get(&event_type) {
            return category.clone();
        }
        self.keywords
            .iter()
            .find(|k| event_type.contains(&k.needle))
            .map(|k| k.category.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }
}

impl Default for CategoryResolver {
    fn default() -> Self {
        Self::new(
            HashMap::new(),
            vec![
                KeywordRule::new("TAX", "TAX"),
                KeywordRule::new("CREDIT", "CREDIT"),
                KeywordRule::new("AUDIT", "AUDIT"),
            ],
            DEFAULT_FALLBACK,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_membership_wins_over_keywords() {
        let mut exact = HashMap::new();
        exact.insert("tax_refund_note".to_string(), "general".to_string());
        let resolver = CategoryResolver::new(exact, vec![KeywordRule::new("tax", "tax")], "misc");

        assert_eq!(resolver.category_for("TAX_REFUND_NOTE"), "GENERAL");
        assert_eq!(resolver.category_for("quarterly_tax_filing"), "TAX");
        assert_eq!(resolver.category_for("SUPPORT_TICKET"), "MISC");
    }

    #[test]
    fn unconfigured_resolver_always_resolves() {
        let resolver = CategoryResolver::default();
        assert_eq!(resolver.category_for("R&D_TAX_CREDIT"), "TAX");
        assert_eq!(resolver.category_for("CREDIT_MEMO"), "CREDIT");
        assert_eq!(resolver.category_for(""), DEFAULT_FALLBACK);
    }
}
