//! Shared-secret check for keyed writes

use axum::http::HeaderMap;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const INGEST_KEY_HEADER: &str = "x-ingest-key";

/// Reject the request unless `x-ingest-key` matches the configured secret.
pub fn require_key(state: &AppState, headers: &HeaderMap, operation: &str) -> ApiResult<()> {
    let presented = headers
        .get(INGEST_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if state.key_matches(presented) {
        return Ok(());
    }

    tracing::warn!(
        target: "covenant::security",
        operation,
        key_present = presented.is_some(),
        "Rejected keyed write"
    );
    Err(ApiError::unauthorized())
}
