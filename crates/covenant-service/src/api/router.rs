//! API Router configuration

use super::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Create the main API router
///
/// Requests running past `state.request_timeout` get a 408.
pub fn create_router(state: AppState) -> Router {
    let request_timeout = state.request_timeout;
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        // Ledger
        .route("/ledger/ingest", post(handlers::ingest))
        .route("/ledger/entries", get(handlers::list_entries))
        .route("/ledger/entries/:id", get(handlers::get_entry))
        .route("/ledger/entries/:id/status", post(handlers::update_entry_status))
        .route("/ledger/verify", get(handlers::verify_ledger))
        // Gate
        .route("/confidence", post(handlers::declare_confidence))
        .route("/gated", post(handlers::gated_call))
        // Learning loop
        .route("/learning", get(handlers::list_learning))
        .route("/learning/:entry_id/label", post(handlers::label_decision))
        .route("/policies", get(handlers::list_policies))
        .route("/tuner/run", post(handlers::run_tuner));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
