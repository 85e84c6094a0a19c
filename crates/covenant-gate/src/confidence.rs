//! Confidence declarations a caller registers before a gated request.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use covenant_ledger::{LedgerStore, NewEntry};
use covenant_types::{Actor, ConfidenceLevel};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{GateError, GateResult};

pub const CONFIDENCE_DECLARED_EVENT: &str = "CONFIDENCE_DECLARED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeclarationStatus {
    Declared,
    Linked,
    Expired,
}

impl DeclarationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Declared => "DECLARED",
            Self::Linked => "LINKED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for DeclarationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceDeclaration {
    pub id: String,
    pub level: ConfidenceLevel,
    pub claim: String,
    pub actor: Actor,
    pub status: DeclarationStatus,
    pub declared_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub linked_at: Option<DateTime<Utc>>,
    /// Ledger entry recording the declaration.
    pub ledger_entry_id: String,
}

impl ConfidenceDeclaration {
    fn refresh(&mut self, now: DateTime<Utc>) {
        if self.status == DeclarationStatus::Declared && now >= self.expires_at {
            self.status = DeclarationStatus::Expired;
        }
    }
}

/// Declared, linked and expired declarations, keyed by id.
///
/// A declaration moves DECLARED -> LINKED at most once, when a precheck that
/// references it is allowed. DECLARED -> EXPIRED happens lazily on access.
pub struct ConfidenceRegistry {
    declarations: RwLock<HashMap<String, ConfidenceDeclaration>>,
    ttl: Duration,
    ledger: Arc<LedgerStore>,
}

impl ConfidenceRegistry {
    pub fn new(ledger: Arc<LedgerStore>, ttl: Duration) -> Self {
        Self {
            declarations: RwLock::new(HashMap::new()),
            ttl,
            ledger,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register a declaration and record it in the ledger.
    pub async fn declare(
        &self,
        level: ConfidenceLevel,
        claim: impl Into<String>,
        actor: Actor,
    ) -> GateResult<ConfidenceDeclaration> {
        let claim = claim.into();
        if claim.trim().is_empty() {
            return Err(GateError::Validation("claim is required".to_string()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let body = json!({
            "declaration_id": id,
            "level": level,
            "claim": claim,
        });
        let entry = self
            .ledger
            .append(
                NewEntry::new(actor, CONFIDENCE_DECLARED_EVENT, body.to_string())
                    .with_tag(level.as_str()),
            )
            .await?;

        let declared_at = Utc::now();
        let declaration = ConfidenceDeclaration {
            id: id.clone(),
            level,
            claim,
            actor,
            status: DeclarationStatus::Declared,
            declared_at,
            expires_at: declared_at + self.ttl,
            linked_at: None,
            ledger_entry_id: entry.id,
        };
        self.declarations.write().insert(id, declaration.clone());
        info!(declaration_id = %declaration.id, level = %level, "Confidence declared");
        Ok(declaration)
    }

    /// Current state of a declaration, with expiry applied.
    pub fn get(&self, id: &str, now: DateTime<Utc>) -> Option<ConfidenceDeclaration> {
        let mut guard = self.declarations.write();
        let declaration = guard.get_mut(id)?;
        declaration.refresh(now);
        Some(declaration.clone())
    }

    /// Move a DECLARED declaration to LINKED.
    ///
    /// Returns the status that prevented the transition when it is no longer
    /// DECLARED, so that two prechecks racing on one reference cannot both
    /// consume it.
    pub fn consume(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> GateResult<Result<ConfidenceDeclaration, DeclarationStatus>> {
        let mut guard = self.declarations.write();
        let declaration = guard
            .get_mut(id)
            .ok_or_else(|| GateError::Validation(format!("unknown confidence reference {id}")))?;
        declaration.refresh(now);
        if declaration.status != DeclarationStatus::Declared {
            return Ok(Err(declaration.status));
        }
        declaration.status = DeclarationStatus::Linked;
        declaration.linked_at = Some(now);
        debug!(declaration_id = id, "Confidence declaration linked");
        Ok(Ok(declaration.clone()))
    }

    /// Return a LINKED declaration to DECLARED so it can back a retry.
    ///
    /// Only unexpired declarations come back; returns whether one did.
    pub fn release(&self, id: &str, now: DateTime<Utc>) -> bool {
        let mut guard = self.declarations.write();
        let Some(declaration) = guard.get_mut(id) else {
            return false;
        };
        if declaration.status != DeclarationStatus::Linked || now >= declaration.expires_at {
            return false;
        }
        declaration.status = DeclarationStatus::Declared;
        declaration.linked_at = None;
        debug!(declaration_id = id, "Confidence declaration released");
        true
    }

    /// Drop every declaration whose TTL has passed, linked or not.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut guard = self.declarations.write();
        let before = guard.len();
        guard.retain(|_, d| now < d.expires_at);
        before - guard.len()
    }

    pub fn len(&self) -> usize {
        self.declarations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.read().is_empty()
    }

    /// Purge on a fixed period until `shutdown` flips to true or its sender
    /// is dropped.
    pub async fn run_purge(
        self: Arc<Self>,
        period: std::time::Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = self.purge_expired(Utc::now());
                    if purged > 0 {
                        debug!(purged, remaining = self.len(), "Expired declarations purged");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Declaration purge stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_types::QueryWindow;

    fn registry(ttl_secs: i64) -> (ConfidenceRegistry, Arc<LedgerStore>) {
        let ledger = Arc::new(LedgerStore::in_memory());
        (
            ConfidenceRegistry::new(ledger.clone(), Duration::seconds(ttl_secs)),
            ledger,
        )
    }

    #[tokio::test]
    async fn declaration_is_recorded_and_consumed_once() {
        let (registry, ledger) = registry(60);
        let declared = registry
            .declare(ConfidenceLevel::KnownKnown, "rates are published", Actor::Ai)
            .await
            .unwrap();
        assert_eq!(declared.status, DeclarationStatus::Declared);

        let entries = ledger.list(QueryWindow::default()).await.unwrap();
        assert_eq!(entries[0].event_type, CONFIDENCE_DECLARED_EVENT);
        assert_eq!(entries[0].id, declared.ledger_entry_id);

        let now = Utc::now();
        let linked = registry.consume(&declared.id, now).unwrap().unwrap();
        assert_eq!(linked.status, DeclarationStatus::Linked);

        let again = registry.consume(&declared.id, now).unwrap().unwrap_err();
        assert_eq!(again, DeclarationStatus::Linked);
    }

    #[tokio::test]
    async fn declarations_expire_after_ttl() {
        let (registry, _) = registry(10);
        let declared = registry
            .declare(ConfidenceLevel::KnownUnknown, "estimate", Actor::Human)
            .await
            .unwrap();

        let later = declared.declared_at + Duration::seconds(11);
        assert_eq!(
            registry.get(&declared.id, later).unwrap().status,
            DeclarationStatus::Expired
        );
        assert_eq!(
            registry.consume(&declared.id, later).unwrap().unwrap_err(),
            DeclarationStatus::Expired
        );
        assert_eq!(registry.purge_expired(later), 1);
        assert!(registry.get(&declared.id, later).is_none());
    }

    #[tokio::test]
    async fn linked_declarations_are_purged_after_ttl() {
        let (registry, _) = registry(10);
        let linked = registry
            .declare(ConfidenceLevel::KnownKnown, "filed on time", Actor::Ai)
            .await
            .unwrap();
        registry.consume(&linked.id, linked.declared_at).unwrap().unwrap();

        let before = linked.expires_at - Duration::seconds(1);
        assert_eq!(registry.purge_expired(before), 0);
        assert_eq!(
            registry.get(&linked.id, before).unwrap().status,
            DeclarationStatus::Linked
        );

        assert_eq!(registry.purge_expired(linked.expires_at), 1);
        assert!(registry.get(&linked.id, linked.expires_at).is_none());
    }

    #[tokio::test]
    async fn released_declaration_can_be_linked_again() {
        let (registry, _) = registry(10);
        let declared = registry
            .declare(ConfidenceLevel::KnownKnown, "rates are published", Actor::Ai)
            .await
            .unwrap();
        let now = declared.declared_at;

        assert!(!registry.release(&declared.id, now));
        registry.consume(&declared.id, now).unwrap().unwrap();
        assert!(registry.release(&declared.id, now));
        assert!(registry.get(&declared.id, now).unwrap().linked_at.is_none());
        registry.consume(&declared.id, now).unwrap().unwrap();

        assert!(!registry.release(&declared.id, declared.expires_at));
        assert!(!registry.release("missing", now));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_task_sweeps_until_shut_down() {
        let (registry, _) = registry(0);
        let registry = Arc::new(registry);
        registry
            .declare(ConfidenceLevel::UnknownUnknown, "already stale", Actor::Human)
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(
            registry
                .clone()
                .run_purge(std::time::Duration::from_secs(60), shutdown_rx),
        );

        tokio::task::yield_now().await;
        assert_eq!(registry.len(), 1);

        tokio::time::advance(std::time::Duration::from_secs(61)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(registry.is_empty());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_reference_is_a_validation_error() {
        let (registry, _) = registry(10);
        let err = registry.consume("missing", Utc::now()).unwrap_err();
        assert!(matches!(err, GateError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_claim_is_rejected() {
        let (registry, ledger) = registry(10);
        let err = registry
            .declare(ConfidenceLevel::KnownKnown, "  ", Actor::Ai)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Validation(_)));
        assert!(ledger.is_empty().await.unwrap());
    }
}
