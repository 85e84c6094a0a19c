//! Health handler

use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: &'static str,
    pub version: String,
    pub uptime: String,
    pub ledger_backend: &'static str,
    pub policy_store: &'static str,
    /// Sequence of the chain break that halted appends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_halted_at: Option<u64>,
}

/// Health check endpoint. Reports `degraded` while the ledger is halted.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    let halted_at = state.ledger.halted_at();
    Json(HealthCheckResponse {
        status: if halted_at.is_some() { "degraded" } else { "healthy" },
        version: state.version.clone(),
        uptime: state.uptime(),
        ledger_backend: state.ledger.backend_label(),
        policy_store: state.policies.store_label(),
        ledger_halted_at: halted_at,
    })
}
