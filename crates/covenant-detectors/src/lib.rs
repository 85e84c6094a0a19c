//! Pattern detectors.
//!
//! Each detector is a pure function of its input text (plus, for the
//! consistency family, the caller's declared confidence). Severity is fixed by
//! [`ViolationKind`](covenant_types::ViolationKind); detectors only decide
//! whether a rule fired and how often.

#![deny(unsafe_code)]

mod error;
mod families;
mod patterns;
mod rule;
mod set;

pub use error::DetectorError;
pub use families::{CitationDetector, ConsistencyDetector, PatternDetector, SchemaDetector};
pub use rule::{PatternRule, RuleSpec, MAX_EVIDENCE, MAX_REPORTED_MATCHES};
pub use set::{DetectorSet, ResponseScan};

use covenant_types::{ConfidenceLevel, DetectorFamily, Violation};

/// Inputs beyond the text that some detectors read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanContext {
    pub declared_confidence: Option<ConfidenceLevel>,
}

/// A stateless rule evaluator.
pub trait Detector: Send + Sync {
    fn family(&self) -> DetectorFamily;

    fn detect(&self, text: &str, ctx: &ScanContext) -> Vec<Violation>;
}
