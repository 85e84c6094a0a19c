//! Regex-backed rules and match aggregation.

use std::collections::BTreeMap;

use covenant_types::{Violation, ViolationKind};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DetectorError;

/// Match counts are capped at this value for reporting.
pub const MAX_REPORTED_MATCHES: u32 = 10;

/// Snippets kept per violation.
pub const MAX_EVIDENCE: usize = 3;

const MAX_SNIPPET_CHARS: usize = 60;

/// Operator-supplied rule, as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub id: String,
    pub kind: ViolationKind,
    pub pattern: String,
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    id: String,
    kind: ViolationKind,
    message: String,
    regex: Regex,
}

impl PatternRule {
    pub fn new(
        id: impl Into<String>,
        kind: ViolationKind,
        message: impl Into<String>,
        pattern: &str,
    ) -> Result<Self, DetectorError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DetectorError::EmptyId);
        }
        let regex = Regex::new(pattern).map_err(|source| DetectorError::InvalidPattern {
            id: id.clone(),
            source,
        })?;
        Ok(Self {
            id,
            kind,
            message: message.into(),
            regex,
        })
    }

    pub fn from_spec(spec: &RuleSpec) -> Result<Self, DetectorError> {
        let message = format!("matched custom rule '{}'", spec.id);
        Self::new(spec.id.clone(), spec.kind, message, &spec.pattern)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    /// Number of non-overlapping matches in `text`.
    pub fn count(&self, text: &str) -> usize {
        self.regex.find_iter(text).count()
    }

    fn collect(&self, text: &str, into: &mut Hit) {
        for found in self.regex.find_iter(text) {
            into.count += 1;
            if into.evidence.len() < MAX_EVIDENCE {
                into.evidence.push(snippet(found.as_str()));
            }
        }
        if into.message.is_empty() {
            into.message = self.message.clone();
        }
    }
}

#[derive(Debug, Default)]
struct Hit {
    count: usize,
    evidence: Vec<String>,
    message: String,
}

/// Run `rules` over `text`, emitting one violation per kind that matched.
pub(crate) fn scan(rules: &[PatternRule], text: &str) -> Vec<Violation> {
    let mut hits: BTreeMap<ViolationKind, Hit> = BTreeMap::new();
    for rule in rules {
        let hit = hits.entry(rule.kind).or_default();
        rule.collect(text, hit);
    }

    hits.into_iter()
        .filter(|(_, hit)| hit.count > 0)
        .map(|(kind, hit)| {
            Violation::new(kind, hit.message).with_matches(cap(hit.count), hit.evidence)
        })
        .collect()
}

pub(crate) fn cap(count: usize) -> u32 {
    (count.min(MAX_REPORTED_MATCHES as usize)) as u32
}

fn snippet(matched: &str) -> String {
    let trimmed = matched.trim();
    if trimmed.chars().count() <= MAX_SNIPPET_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX_SNIPPET_CHARS).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_capped_and_evidence_trimmed() {
        let rule = PatternRule::new("r", ViolationKind::Hedging, "hedge", r"(?i)\bmaybe\b").unwrap();
        let text = "maybe ".repeat(25);
        let out = scan(&[rule], &text);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].count, MAX_REPORTED_MATCHES);
        assert_eq!(out[0].evidence.len(), MAX_EVIDENCE);
    }

    #[test]
    fn rules_of_one_kind_aggregate() {
        let a = PatternRule::new("a", ViolationKind::Hedging, "hedge", r"\bmaybe\b").unwrap();
        let b = PatternRule::new("b", ViolationKind::Hedging, "hedge", r"\bperhaps\b").unwrap();
        let out = scan(&[a, b], "maybe, perhaps, maybe");

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].count, 3);
    }

    #[test]
    fn invalid_pattern_names_the_rule() {
        let err = PatternRule::new("broken", ViolationKind::Jailbreak, "x", "(").unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn no_match_no_violation() {
        let rule = PatternRule::new("r", ViolationKind::Fabrication, "f", r"studies show").unwrap();
        assert!(scan(&[rule], "nothing to see").is_empty());
    }
}
