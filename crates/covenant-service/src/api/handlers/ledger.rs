//! Ledger handlers

use crate::api::require_key;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use covenant_ledger::{ChainVerification, EntryStatus, LedgerEntry, NewEntry};
use covenant_types::{Actor, QueryWindow};
use serde::{Deserialize, Serialize};

/// Ingest request. Every field defaults so that a missing field is reported
/// as a validation error rather than a body rejection.
#[derive(Debug, Default, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub actor: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub citation: Option<String>,
    #[serde(default)]
    pub citation_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl IngestRequest {
    fn into_entry(self) -> ApiResult<NewEntry> {
        if self.actor.trim().is_empty() {
            return Err(ApiError::bad_request("actor is required"));
        }
        let actor: Actor = self
            .actor
            .parse()
            .map_err(|e: covenant_types::ParseEnumError| ApiError::bad_request(e.to_string()))?;

        let mut entry = NewEntry::new(actor, self.event_type, self.text);
        if let Some(citation) = self.citation {
            entry = entry.with_citation(citation, self.citation_url);
        } else {
            entry.citation_url = self.citation_url;
        }
        if let Some(status) = self.status {
            let status: EntryStatus = status
                .parse()
                .map_err(|e: covenant_types::ParseEnumError| ApiError::bad_request(e.to_string()))?;
            entry = entry.with_status(status);
        }
        for tag in self.tags {
            entry = entry.with_tag(tag);
        }
        Ok(entry)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub id: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub record_hash: String,
}

/// Append one entry
pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IngestRequest>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    require_key(&state, &headers, "ledger.ingest")?;

    let entry = state.ledger.append(request.into_entry()?).await?;
    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            id: entry.id,
            sequence: entry.sequence,
            timestamp: entry.timestamp,
            record_hash: entry.record_hash,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct EntryList {
    pub items: Vec<LedgerEntry>,
    pub total: u64,
}

/// List entries, newest first
pub async fn list_entries(
    State(state): State<AppState>,
    Query(window): Query<QueryWindow>,
) -> ApiResult<Json<EntryList>> {
    let items = state.ledger.list(window).await?;
    let total = state.ledger.len().await?;
    Ok(Json(EntryList { items, total }))
}

pub async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<LedgerEntry>> {
    let entry = state
        .ledger
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("ledger entry '{id}' not found")))?;
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: EntryStatus,
}

/// Move an entry along DRAFT -> VERIFIED -> FINAL (or ERROR)
pub async fn update_entry_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Json<LedgerEntry>> {
    require_key(&state, &headers, "ledger.status")?;
    Ok(Json(state.ledger.update_status(&id, update.status).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    pub from: Option<u64>,
    pub to: Option<u64>,
}

/// Recompute the chain. A break is reported in the body with `intact: false`.
pub async fn verify_ledger(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> ApiResult<Json<ChainVerification>> {
    let result = match (query.from, query.to) {
        (None, None) => state.ledger.verify().await?,
        (from, to) => state.ledger.verify_range(from.unwrap_or(1), to).await?,
    };
    Ok(Json(result))
}
