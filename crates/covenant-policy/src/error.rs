use thiserror::Error;

pub type PolicyResult<T> = Result<T, PolicyError>;

/// Policy registry errors.
///
/// Resolution always falls back to a compiled-in default, so a missing rule
/// is not an error.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid policy rule: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for PolicyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for PolicyError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
