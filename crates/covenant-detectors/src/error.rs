use covenant_types::ViolationKind;
use thiserror::Error;

/// Detector construction errors. Scanning itself cannot fail.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("rule '{id}' has an invalid pattern: {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule '{id}': {kind} is computed, not pattern-matched")]
    UnsupportedKind { id: String, kind: ViolationKind },

    #[error("rule id must not be empty")]
    EmptyId,
}
