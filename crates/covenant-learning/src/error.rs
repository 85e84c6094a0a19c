use covenant_ledger::LedgerError;
use covenant_policy::PolicyError;
use thiserror::Error;

pub type LearningResult<T> = Result<T, LearningError>;

#[derive(Debug, Error)]
pub enum LearningError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("no learning record for entry {0}")]
    NotFound(String),

    #[error("learning record for entry {0} is already labeled")]
    AlreadyLabeled(String),

    #[error("learning record for entry {0} already exists")]
    Duplicate(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for LearningError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for LearningError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
