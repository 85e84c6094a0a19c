//! Service and HTTP error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use covenant_detectors::DetectorError;
use covenant_gate::{CompletionError, GateError};
use covenant_ledger::LedgerError;
use covenant_learning::LearningError;
use covenant_policy::PolicyError;
use thiserror::Error;

/// Start-up failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("learning error: {0}")]
    Learning(#[from] LearningError),

    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("provider error: {0}")]
    Provider(#[from] CompletionError),

    #[error("server error: {0}")]
    Server(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ServiceError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Request failures, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Learning(#[from] LearningError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::Http {
            status: StatusCode::UNAUTHORIZED,
            message: "invalid or missing ingest key".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Http { status, .. } => *status,
            ApiError::Ledger(err) => ledger_status(err),
            ApiError::Learning(err) => learning_status(err),
            ApiError::Gate(err) => gate_status(err),
            ApiError::Policy(err) => policy_status(err),
        }
    }
}

fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::InvalidTransition { .. } | LedgerError::Conflict(_) => StatusCode::CONFLICT,
        LedgerError::ChainIntegrity { .. } => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::Serialization(_) | LedgerError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn learning_status(err: &LearningError) -> StatusCode {
    match err {
        LearningError::Validation(_) => StatusCode::BAD_REQUEST,
        LearningError::NotFound(_) => StatusCode::NOT_FOUND,
        LearningError::AlreadyLabeled(_) | LearningError::Duplicate(_) => StatusCode::CONFLICT,
        LearningError::Policy(err) => policy_status(err),
        LearningError::Ledger(err) => ledger_status(err),
        LearningError::Serialization(_) | LearningError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn gate_status(err: &GateError) -> StatusCode {
    match err {
        GateError::Validation(_) => StatusCode::BAD_REQUEST,
        GateError::External(CompletionError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
        GateError::External(CompletionError::UnknownProvider(_)) => StatusCode::BAD_REQUEST,
        GateError::External(_) => StatusCode::BAD_GATEWAY,
        GateError::Ledger(err) => ledger_status(err),
        GateError::Learning(err) => learning_status(err),
        GateError::Detector(_) | GateError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn policy_status(err: &PolicyError) -> StatusCode {
    match err {
        PolicyError::Validation(_) => StatusCode::BAD_REQUEST,
        PolicyError::Serialization(_) | PolicyError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (
                LedgerError::Validation("text is required".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::unauthorized(), StatusCode::UNAUTHORIZED),
            (
                LedgerError::ChainIntegrity {
                    sequence: 3,
                    reason: "hash mismatch".into(),
                }
                .into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                LearningError::AlreadyLabeled("e1".into()).into(),
                StatusCode::CONFLICT,
            ),
            (
                GateError::External(CompletionError::Timeout {
                    provider: "p".into(),
                    after_ms: 10,
                })
                .into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                GateError::External(CompletionError::Status {
                    provider: "p".into(),
                    status: 500,
                    body: String::new(),
                })
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                GateError::Ledger(LedgerError::ChainIntegrity {
                    sequence: 1,
                    reason: "halted".into(),
                })
                .into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }
}
