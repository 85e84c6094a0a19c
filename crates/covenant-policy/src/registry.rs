//! The live policy registry.

use std::sync::Arc;
use std::time::Duration;

use covenant_types::EnforcementMode;
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::category::CategoryResolver;
use crate::error::PolicyResult;
use crate::rule::{DriftBounds, PolicyRule};
use crate::store::{MemoryPolicyStore, PolicyStore};
use crate::table::{PolicyTable, ResolvedPolicy};

/// Held by the tuner for its whole read-aggregate-write cycle.
pub struct TuningGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// Durable policy rows plus the in-memory snapshot the pipeline reads.
///
/// Readers take the current `Arc<PolicyTable>` and release the lock at once;
/// writers build a new table and swap it in after the store commits. Every
/// snapshot is therefore a complete, bounded policy.
pub struct PolicyRegistry {
    store: Arc<dyn PolicyStore>,
    snapshot: RwLock<Arc<PolicyTable>>,
    resolver: CategoryResolver,
    bounds: DriftBounds,
    tune_lock: Mutex<()>,
}

impl PolicyRegistry {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        resolver: CategoryResolver,
        bounds: DriftBounds,
    ) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Arc::new(PolicyTable::default())),
            resolver,
            bounds,
            tune_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryPolicyStore::new()),
            CategoryResolver::default(),
            DriftBounds::default(),
        )
    }

    pub fn bounds(&self) -> DriftBounds {
        self.bounds
    }

    pub fn resolver(&self) -> &CategoryResolver {
        &self.resolver
    }

    pub fn category_for(&self, event_type: &str) -> String {
        self.resolver.category_for(event_type)
    }

    pub fn snapshot(&self) -> Arc<PolicyTable> {
        self.snapshot.read().clone()
    }

    /// Resolve the rule governing `event_type`. Never fails.
    pub fn resolve(&self, event_type: &str, default_mode: EnforcementMode) -> ResolvedPolicy {
        let category = self.resolver.category_for(event_type);
        let resolved = self
            .snapshot()
            .resolve(&category, event_type, default_mode, &self.bounds);
        debug!(
            event_type,
            category = %category,
            source = ?resolved.source,
            mode = %resolved.rule.mode,
            "Policy resolved"
        );
        resolved
    }

    /// Insert seed rows that are not yet stored, then reload the snapshot.
    pub async fn seed(&self, rules: &[PolicyRule]) -> PolicyResult<usize> {
        for rule in rules {
            rule.validate(&self.bounds)?;
        }
        let _guard = self.tune_lock.lock().await;
        PolicyTable::new(self.store.load_rules().await?)
            .with_rules(rules)
            .ensure_unambiguous()?;
        let inserted = self.store.seed_rules(rules).await?;
        self.reload_locked().await?;
        info!(inserted, "Policy seed rows applied");
        Ok(inserted)
    }

    /// Reload the snapshot from the store.
    pub async fn reload(&self) -> PolicyResult<usize> {
        let _guard = self.tune_lock.lock().await;
        self.reload_locked().await
    }

    async fn reload_locked(&self) -> PolicyResult<usize> {
        let rules = self.store.load_rules().await?;
        let count = rules.len();
        *self.snapshot.write() = Arc::new(PolicyTable::new(rules));
        Ok(count)
    }

    /// Take the exclusive tuning lock, waiting at most `wait`.
    pub async fn lock_for_tuning(&self, wait: Duration) -> Option<TuningGuard<'_>> {
        tokio::time::timeout(wait, self.tune_lock.lock())
            .await
            .ok()
            .map(|guard| TuningGuard { _guard: guard })
    }

    /// Persist `rules` in one transaction, then publish them.
    ///
    /// Requires the tuning lock so that no other writer interleaves.
    pub async fn apply(&self, _lock: &TuningGuard<'_>, rules: &[PolicyRule]) -> PolicyResult<()> {
        for rule in rules {
            rule.validate(&self.bounds)?;
        }
        let next = self.snapshot().with_rules(rules);
        next.ensure_unambiguous()?;
        self.store.replace_rules(rules).await?;
        *self.snapshot.write() = Arc::new(next);
        Ok(())
    }

    pub fn store_label(&self) -> &'static str {
        self.store.label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyError;
    use crate::seed::default_seeds;
    use crate::table::PolicySource;

    #[tokio::test]
    async fn seeded_registry_resolves_categories() {
        let registry = PolicyRegistry::in_memory();
        let inserted = registry.seed(&default_seeds()).await.unwrap();
        assert!(inserted > 0);

        let tax = registry.resolve("QUARTERLY_TAX_FILING", EnforcementMode::Permissive);
        assert_eq!(tax.source, PolicySource::Category);
        assert_eq!(tax.rule.category, "TAX");
        assert_eq!(tax.rule.mode, EnforcementMode::Strict);
    }

    #[tokio::test]
    async fn unseeded_registry_falls_back_to_injected_mode() {
        let registry = PolicyRegistry::in_memory();
        let resolved = registry.resolve("ANYTHING", EnforcementMode::AuditOnly);
        assert_eq!(resolved.source, PolicySource::Default);
        assert_eq!(resolved.rule.mode, EnforcementMode::AuditOnly);
        assert_eq!(resolved.rule.category, "GENERAL");
    }

    #[tokio::test]
    async fn seeded_registry_leaves_unknown_types_to_the_default_mode() {
        let registry = PolicyRegistry::in_memory();
        registry.seed(&default_seeds()).await.unwrap();

        let memo = registry.resolve("MEMO_REVIEW", EnforcementMode::Strict);
        assert_eq!(memo.source, PolicySource::Default);
        assert_eq!(memo.rule.mode, EnforcementMode::Strict);
        assert!(!memo.is_configured());
    }

    #[tokio::test]
    async fn seed_refuses_an_event_type_owned_by_two_categories() {
        let registry = PolicyRegistry::in_memory();
        registry
            .seed(&[PolicyRule::new("TAX", "LEDGER_CLOSE", EnforcementMode::Strict, 5)])
            .await
            .unwrap();

        let err = registry
            .seed(&[PolicyRule::new("AUDIT", "LEDGER_CLOSE", EnforcementMode::Permissive, 9)])
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::Validation(_)));
        assert_eq!(registry.snapshot().len(), 1);

        let guard = registry
            .lock_for_tuning(Duration::from_millis(10))
            .await
            .unwrap();
        let clash = PolicyRule::new("CREDIT", "LEDGER_CLOSE", EnforcementMode::AuditOnly, 9);
        assert!(registry.apply(&guard, &[clash]).await.is_err());
        let resolved = registry.resolve("LEDGER_CLOSE", EnforcementMode::Permissive);
        assert_eq!(resolved.rule.category, "TAX");
    }

    #[tokio::test]
    async fn tuning_lock_is_exclusive_with_bounded_wait() {
        let registry = PolicyRegistry::in_memory();
        let held = registry
            .lock_for_tuning(Duration::from_millis(10))
            .await
            .unwrap();
        assert!(registry
            .lock_for_tuning(Duration::from_millis(10))
            .await
            .is_none());
        drop(held);
        assert!(registry
            .lock_for_tuning(Duration::from_millis(10))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn apply_publishes_and_persists() {
        let store = Arc::new(MemoryPolicyStore::new());
        let registry = PolicyRegistry::new(
            store.clone(),
            CategoryResolver::default(),
            DriftBounds::default(),
        );
        registry.seed(&default_seeds()).await.unwrap();

        let mut tuned = registry.snapshot().category_rule("TAX").unwrap().clone();
        tuned.mode = EnforcementMode::Permissive;
        tuned.auto_tuned = true;

        let guard = registry
            .lock_for_tuning(Duration::from_millis(10))
            .await
            .unwrap();
        registry.apply(&guard, &[tuned]).await.unwrap();
        drop(guard);

        let live = registry.resolve("TAX_FILING", EnforcementMode::Strict);
        assert_eq!(live.rule.mode, EnforcementMode::Permissive);

        let stored = store.load_rules().await.unwrap();
        assert!(stored.iter().any(|r| r.category == "TAX" && r.auto_tuned));
    }

    #[tokio::test]
    async fn out_of_bounds_rows_are_rejected() {
        let registry = PolicyRegistry::in_memory();
        let err = registry
            .seed(&[PolicyRule::category("TAX", EnforcementMode::Strict, 99)])
            .await;
        assert!(err.is_err());
        assert!(registry.snapshot().is_empty());
    }
}
