//! Enforcement modes, pipeline phases, confidence levels and outcome labels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseEnumError;

/// How the pipeline acts on qualifying violations.
///
/// `WARN` is accepted on input as the historical name of `PERMISSIVE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnforcementMode {
    /// Block on any CRITICAL violation or an exceeded drift ceiling.
    #[default]
    Strict,
    /// Allow through, record everything.
    #[serde(alias = "WARN")]
    Permissive,
    /// Never block, record only.
    AuditOnly,
}

impl EnforcementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "STRICT",
            Self::Permissive => "PERMISSIVE",
            Self::AuditOnly => "AUDIT_ONLY",
        }
    }

    pub fn blocks(&self) -> bool {
        matches!(self, Self::Strict)
    }

    /// One step towards fewer blocks. AUDIT_ONLY is left alone.
    pub fn loosened(self) -> Self {
        match self {
            Self::Strict => Self::Permissive,
            other => other,
        }
    }

    /// One step towards more blocks. AUDIT_ONLY is left alone.
    pub fn tightened(self) -> Self {
        match self {
            Self::Permissive => Self::Strict,
            other => other,
        }
    }
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnforcementMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRICT" => Ok(Self::Strict),
            "PERMISSIVE" | "WARN" => Ok(Self::Permissive),
            "AUDIT_ONLY" => Ok(Self::AuditOnly),
            _ => Err(ParseEnumError::new("enforcement mode", s)),
        }
    }
}

/// Pipeline phase of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Pre,
    Post,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pre => "PRE",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Epistemic confidence a caller declares before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    KnownKnown,
    KnownUnknown,
    UnknownUnknown,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KnownKnown => "KNOWN_KNOWN",
            Self::KnownUnknown => "KNOWN_UNKNOWN",
            Self::UnknownUnknown => "UNKNOWN_UNKNOWN",
        }
    }

    /// Higher is more certain.
    pub fn rank(&self) -> u8 {
        match self {
            Self::KnownKnown => 2,
            Self::KnownUnknown => 1,
            Self::UnknownUnknown => 0,
        }
    }

    /// Whether this level meets a policy's required level.
    pub fn satisfies(&self, required: ConfidenceLevel) -> bool {
        self.rank() >= required.rank()
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfidenceLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KNOWN_KNOWN" => Ok(Self::KnownKnown),
            "KNOWN_UNKNOWN" => Ok(Self::KnownUnknown),
            "UNKNOWN_UNKNOWN" => Ok(Self::UnknownUnknown),
            _ => Err(ParseEnumError::new("confidence level", s)),
        }
    }
}

/// What the pipeline did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    /// No violations.
    Allowed,
    /// Violations recorded, request let through.
    Warned,
    Blocked,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "ALLOWED",
            Self::Warned => "WARNED",
            Self::Blocked => "BLOCKED",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALLOWED" => Ok(Self::Allowed),
            "WARNED" => Ok(Self::Warned),
            "BLOCKED" => Ok(Self::Blocked),
            _ => Err(ParseEnumError::new("decision", s)),
        }
    }
}

/// Ground-truth label applied to a recorded decision after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    #[default]
    Pending,
    /// The decision was right: the flag was real signal.
    Correct,
    /// The decision was wrong: the flag was noise.
    Wrong,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Correct => "CORRECT",
            Self::Wrong => "WRONG",
        }
    }

    pub fn is_labeled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "CORRECT" => Ok(Self::Correct),
            "WRONG" => Ok(Self::Wrong),
            _ => Err(ParseEnumError::new("outcome", s)),
        }
    }
}

/// Who wrote a ledger entry. The set is fixed; ingest rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    Human,
    Ai,
    System,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "HUMAN",
            Self::Ai => "AI",
            Self::System => "SYSTEM",
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Actor {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HUMAN" => Ok(Self::Human),
            "AI" => Ok(Self::Ai),
            "SYSTEM" => Ok(Self::System),
            _ => Err(ParseEnumError::new("actor", s)),
        }
    }
}
