use covenant_detectors::DetectorError;
use covenant_ledger::LedgerError;
use covenant_learning::LearningError;
use thiserror::Error;

pub type GateResult<T> = Result<T, GateError>;

/// Errors from the gatekeeper pipeline and the gated client.
///
/// A policy block is not an error; it is a decision with `allowed = false`.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("external service error: {0}")]
    External(#[from] CompletionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Learning(#[from] LearningError),

    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Failures of the external completion call. Never retried by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("{provider} did not answer within {after_ms}ms")]
    Timeout { provider: String, after_ms: u64 },

    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider} error {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("invalid {provider} response: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("unknown completion provider: {0}")]
    UnknownProvider(String),
}

impl CompletionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
