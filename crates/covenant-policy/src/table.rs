//! Immutable policy snapshot and resolution.

use std::collections::BTreeMap;

use covenant_types::EnforcementMode;
use serde::Serialize;

use crate::error::{PolicyError, PolicyResult};
use crate::rule::{normalize, DriftBounds, PolicyRule, WILDCARD};

/// `max_drift_score` of the compiled-in default before clamping.
pub const DEFAULT_MAX_DRIFT: u32 = 10;

/// Which tier of the lookup produced a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicySource {
    EventType,
    Category,
    Default,
}

/// A rule together with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPolicy {
    pub rule: PolicyRule,
    pub source: PolicySource,
}

impl ResolvedPolicy {
    /// True when a configured or tuned row governs the call.
    pub fn is_configured(&self) -> bool {
        self.source != PolicySource::Default
    }
}

/// All rows at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyTable {
    rows: BTreeMap<(String, String), PolicyRule>,
}

impl PolicyTable {
    pub fn new(rules: impl IntoIterator<Item = PolicyRule>) -> Self {
        Self {
            rows: rules.into_iter().map(|rule| (rule.key(), rule)).collect(),
        }
    }

    pub fn rules(&self) -> impl Iterator<Item = &PolicyRule> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The category-wide row, if one exists.
    pub fn category_rule(&self, category: &str) -> Option<&PolicyRule> {
        self.rows
            .get(&(normalize(category), WILDCARD.to_string()))
    }

    /// Exact event type, then category wildcard, then the compiled-in default.
    pub fn resolve(
        &self,
        category: &str,
        event_type: &str,
        default_mode: EnforcementMode,
        bounds: &DriftBounds,
    ) -> ResolvedPolicy {
        let category = normalize(category);
        let event_type = normalize(event_type);

        if let Some(rule) = self
            .rows
            .values()
            .find(|rule| !rule.is_wildcard() && rule.event_type == event_type)
        {
            return ResolvedPolicy {
                rule: rule.clone(),
                source: PolicySource::EventType,
            };
        }

        if let Some(rule) = self.category_rule(&category) {
            return ResolvedPolicy {
                rule: rule.clone(),
                source: PolicySource::Category,
            };
        }

        ResolvedPolicy {
            rule: compiled_default(&category, default_mode, bounds),
            source: PolicySource::Default,
        }
    }

    /// Fails when one concrete event type is configured under two categories.
    ///
    /// Exact matches ignore the category, so such a pair would make the
    /// winning row depend on key order.
    pub fn ensure_unambiguous(&self) -> PolicyResult<()> {
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for rule in self.rows.values().filter(|rule| !rule.is_wildcard()) {
            if let Some(first) = owners.insert(&rule.event_type, &rule.category) {
                return Err(PolicyError::Validation(format!(
                    "event type {} is configured under both {} and {}",
                    rule.event_type, first, rule.category
                )));
            }
        }
        Ok(())
    }

    /// Copy of the table with `updated` rows replacing same-key rows.
    pub fn with_rules(&self, updated: &[PolicyRule]) -> Self {
        let mut rows = self.rows.clone();
        for rule in updated {
            rows.insert(rule.key(), rule.clone());
        }
        Self { rows }
    }
}

/// The rule used when nothing is configured for a category.
pub fn compiled_default(
    category: &str,
    mode: EnforcementMode,
    bounds: &DriftBounds,
) -> PolicyRule {
    PolicyRule::category(category, mode, bounds.clamp(DEFAULT_MAX_DRIFT))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PolicyTable {
        PolicyTable::new(vec![
            PolicyRule::category("TAX", EnforcementMode::Strict, 5),
            PolicyRule::new("TAX", "TAX_AMENDMENT", EnforcementMode::AuditOnly, 12),
        ])
    }

    #[test]
    fn precedence_is_event_type_then_category_then_default() {
        let bounds = DriftBounds::default();
        let t = table();

        let exact = t.resolve("TAX", "tax_amendment", EnforcementMode::Permissive, &bounds);
        assert_eq!(exact.source, PolicySource::EventType);
        assert_eq!(exact.rule.mode, EnforcementMode::AuditOnly);

        let category = t.resolve("TAX", "TAX_FILING", EnforcementMode::Permissive, &bounds);
        assert_eq!(category.source, PolicySource::Category);
        assert_eq!(category.rule.max_drift_score, 5);

        let fallback = t.resolve("GENERAL", "NOTE", EnforcementMode::Permissive, &bounds);
        assert_eq!(fallback.source, PolicySource::Default);
        assert_eq!(fallback.rule.mode, EnforcementMode::Permissive);
        assert!(!fallback.is_configured());
    }

    #[test]
    fn empty_table_still_resolves() {
        let bounds = DriftBounds::new(1, 8).unwrap();
        let resolved =
            PolicyTable::default().resolve("X", "Y", EnforcementMode::Strict, &bounds);
        assert_eq!(resolved.rule.max_drift_score, 8);
        assert_eq!(resolved.rule.category, "X");
    }

    #[test]
    fn event_type_under_two_categories_is_rejected() {
        assert!(table().ensure_unambiguous().is_ok());

        let clash = table().with_rules(&[PolicyRule::new(
            "AUDIT",
            "TAX_AMENDMENT",
            EnforcementMode::Strict,
            5,
        )]);
        let err = clash.ensure_unambiguous().unwrap_err();
        assert!(err.to_string().contains("TAX_AMENDMENT"));
    }

    #[test]
    fn with_rules_replaces_by_key() {
        let t = table();
        let mut tuned = t.category_rule("TAX").unwrap().clone();
        tuned.max_drift_score = 7;
        let next = t.with_rules(&[tuned]);

        assert_eq!(next.len(), 2);
        assert_eq!(next.category_rule("tax").unwrap().max_drift_score, 7);
        assert_eq!(t.category_rule("TAX").unwrap().max_drift_score, 5);
    }
}
