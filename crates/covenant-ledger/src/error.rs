use thiserror::Error;

use crate::entry::EntryStatus;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Missing or malformed input. Surfaced to the caller, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("ledger entry not found: {0}")]
    NotFound(String),

    #[error("invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: EntryStatus,
        to: EntryStatus,
    },

    /// The chain is broken at `sequence`. Fatal: the store refuses further
    /// appends until repaired out of band.
    #[error("chain integrity fault at sequence {sequence}: {reason}")]
    ChainIntegrity { sequence: u64, reason: String },

    /// A concurrent writer moved the head between build and insert.
    #[error("append conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
