//! Confidence declaration and gated call handlers

use crate::api::require_key;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use covenant_gate::{ConfidenceDeclaration, GateOptions, GatedRequest, GatedResponse};
use covenant_types::{Actor, ConfidenceLevel, EnforcementMode};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DeclareRequest {
    pub level: ConfidenceLevel,
    pub claim: String,
    #[serde(default = "default_actor")]
    pub actor: Actor,
}

fn default_actor() -> Actor {
    Actor::Ai
}

/// Record a confidence declaration for a later gated call
pub async fn declare_confidence(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<DeclareRequest>,
) -> ApiResult<(StatusCode, Json<ConfidenceDeclaration>)> {
    require_key(&state, &headers, "confidence.declare")?;

    let declaration = state
        .gatekeeper
        .confidence()
        .declare(request.level, request.claim, request.actor)
        .await?;
    Ok((StatusCode::CREATED, Json(declaration)))
}

/// Gated call body. `mode` falls back to the configured default.
#[derive(Debug, Deserialize)]
pub struct GatedCallRequest {
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub event_type: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub mode: Option<EnforcementMode>,
    #[serde(default)]
    pub confidence_ref: Option<String>,
    #[serde(default)]
    pub waive_confidence: bool,
    #[serde(default)]
    pub check_schema: bool,
    #[serde(default)]
    pub check_citations: bool,
    #[serde(default)]
    pub sanitize: bool,
}

impl GatedCallRequest {
    fn into_gated(self, default_mode: EnforcementMode) -> GatedRequest {
        GatedRequest {
            provider: self.provider,
            model: self.model,
            prompt: self.prompt,
            system_prompt: self.system_prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            options: GateOptions {
                mode: self.mode.unwrap_or(default_mode),
                event_type: self.event_type,
                confidence_ref: self.confidence_ref,
                waive_confidence: self.waive_confidence,
                check_schema: self.check_schema,
                check_citations: self.check_citations,
                sanitize: self.sanitize,
            },
        }
    }
}

/// Run one completion through precheck and postcheck.
///
/// A block is a 200 with `blocked: true`; a provider failure is an error
/// status.
pub async fn gated_call(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GatedCallRequest>,
) -> ApiResult<Json<GatedResponse>> {
    require_key(&state, &headers, "gated")?;

    let request = request.into_gated(state.default_mode);
    Ok(Json(state.client.gated_request(request).await?))
}
