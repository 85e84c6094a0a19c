//! Learning loop handlers: labelling, policy view, tuning

use crate::api::require_key;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use covenant_learning::{LearningRecord, TuneReport};
use covenant_policy::{DriftBounds, PolicyRule};
use covenant_types::{Outcome, QueryWindow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LabelRequest {
    pub outcome: Outcome,
}

/// Label a recorded decision CORRECT or WRONG, once
pub async fn label_decision(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<LabelRequest>,
) -> ApiResult<Json<LearningRecord>> {
    require_key(&state, &headers, "learning.label")?;
    Ok(Json(state.recorder.label(&entry_id, request.outcome).await?))
}

pub async fn list_learning(
    State(state): State<AppState>,
    Query(window): Query<QueryWindow>,
) -> ApiResult<Json<Vec<LearningRecord>>> {
    Ok(Json(state.recorder.list(window).await?))
}

#[derive(Debug, Serialize)]
pub struct PolicyView {
    pub rules: Vec<PolicyRule>,
    pub bounds: DriftBounds,
    pub store: &'static str,
}

/// Current policy snapshot
pub async fn list_policies(State(state): State<AppState>) -> Json<PolicyView> {
    let snapshot = state.policies.snapshot();
    Json(PolicyView {
        rules: snapshot.rules().cloned().collect(),
        bounds: state.policies.bounds(),
        store: state.policies.store_label(),
    })
}

/// Run one tuning cycle now. Skips are reported in the body, not as errors.
pub async fn run_tuner(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<TuneReport>> {
    require_key(&state, &headers, "tuner.run")?;
    Ok(Json(state.tuner.run().await?))
}
