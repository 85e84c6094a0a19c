//! Violation types emitted by the pattern detectors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseEnumError;

/// Severity of a rule match. Fixed per [`ViolationKind`], never per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detector family a violation kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectorFamily {
    /// Hedging and overconfidence language.
    Drift,
    /// Fabrication and self-correction markers.
    Hallucination,
    /// Jailbreak and injection phrasing. Prompt side only.
    Adversarial,
    /// Claim / justification / confidence section presence.
    Schema,
    /// Citation claims and unsupported authority claims.
    Citation,
    /// Declared confidence against detected tone.
    ConfidenceConsistency,
    /// Pre-registered confidence declaration checks. Prompt side only.
    Declaration,
}

/// Every rule the pipeline can fire.
///
/// The set is closed so that scoring, blocking and tuning can match on it
/// exhaustively. Pattern overrides in the policy registry are keyed by these
/// variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    Hedging,
    Overconfidence,
    Fabrication,
    SelfCorrection,
    Jailbreak,
    PromptInjection,
    MissingClaim,
    MissingJustification,
    MissingConfidenceSection,
    CitationClaim,
    MissingCitation,
    ConfidenceMismatch,
    MissingConfidenceDeclaration,
    InsufficientConfidence,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 14] = [
        Self::Hedging,
        Self::Overconfidence,
        Self::Fabrication,
        Self::SelfCorrection,
        Self::Jailbreak,
        Self::PromptInjection,
        Self::MissingClaim,
        Self::MissingJustification,
        Self::MissingConfidenceSection,
        Self::CitationClaim,
        Self::MissingCitation,
        Self::ConfidenceMismatch,
        Self::MissingConfidenceDeclaration,
        Self::InsufficientConfidence,
    ];

    /// The rule-defined severity.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Hedging | Self::CitationClaim => Severity::Info,
            Self::Overconfidence
            | Self::SelfCorrection
            | Self::MissingClaim
            | Self::MissingJustification
            | Self::MissingConfidenceSection
            | Self::ConfidenceMismatch => Severity::Warning,
            Self::Fabrication
            | Self::Jailbreak
            | Self::PromptInjection
            | Self::MissingCitation
            | Self::MissingConfidenceDeclaration
            | Self::InsufficientConfidence => Severity::Critical,
        }
    }

    pub fn family(&self) -> DetectorFamily {
        match self {
            Self::Hedging | Self::Overconfidence => DetectorFamily::Drift,
            Self::Fabrication | Self::SelfCorrection => DetectorFamily::Hallucination,
            Self::Jailbreak | Self::PromptInjection => DetectorFamily::Adversarial,
            Self::MissingClaim | Self::MissingJustification | Self::MissingConfidenceSection => {
                DetectorFamily::Schema
            }
            Self::CitationClaim | Self::MissingCitation => DetectorFamily::Citation,
            Self::ConfidenceMismatch => DetectorFamily::ConfidenceConsistency,
            Self::MissingConfidenceDeclaration | Self::InsufficientConfidence => {
                DetectorFamily::Declaration
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hedging => "HEDGING",
            Self::Overconfidence => "OVERCONFIDENCE",
            Self::Fabrication => "FABRICATION",
            Self::SelfCorrection => "SELF_CORRECTION",
            Self::Jailbreak => "JAILBREAK",
            Self::PromptInjection => "PROMPT_INJECTION",
            Self::MissingClaim => "MISSING_CLAIM",
            Self::MissingJustification => "MISSING_JUSTIFICATION",
            Self::MissingConfidenceSection => "MISSING_CONFIDENCE_SECTION",
            Self::CitationClaim => "CITATION_CLAIM",
            Self::MissingCitation => "MISSING_CITATION",
            Self::ConfidenceMismatch => "CONFIDENCE_MISMATCH",
            Self::MissingConfidenceDeclaration => "MISSING_CONFIDENCE_DECLARATION",
            Self::InsufficientConfidence => "INSUFFICIENT_CONFIDENCE",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViolationKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ParseEnumError::new("violation kind", s))
    }
}

/// One rule match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub message: String,
    /// Number of matches, capped by the detector for reporting.
    #[serde(default = "default_count")]
    pub count: u32,
    /// A few matched snippets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
}

fn default_count() -> u32 {
    1
}

impl Violation {
    /// Create a single-match violation. Severity comes from the rule.
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: message.into(),
            count: 1,
            evidence: Vec::new(),
        }
    }

    pub fn with_matches(mut self, count: u32, evidence: Vec<String>) -> Self {
        self.count = count.max(1);
        self.evidence = evidence;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_fixed_by_kind() {
        let v = Violation::new(ViolationKind::MissingCitation, "no source");
        assert_eq!(v.severity, Severity::Critical);
        assert!(v.is_critical());

        let v = Violation::new(ViolationKind::Overconfidence, "certain");
        assert_eq!(v.severity, Severity::Warning);
    }

    #[test]
    fn kind_round_trips_through_wire_form() {
        for kind in ViolationKind::ALL {
            let parsed: ViolationKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);

            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!("NOT_A_RULE".parse::<ViolationKind>().is_err());
    }

    #[test]
    fn match_count_never_drops_below_one() {
        let v = Violation::new(ViolationKind::Hedging, "hedge").with_matches(0, vec![]);
        assert_eq!(v.count, 1);
    }
}
