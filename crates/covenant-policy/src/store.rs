//! Policy persistence contract and the in-memory store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::PolicyResult;
use crate::rule::PolicyRule;

#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Every row, ordered by `(category, event_type)`.
    async fn load_rules(&self) -> PolicyResult<Vec<PolicyRule>>;

    /// Upsert `rules` atomically: either every row is written or none.
    async fn replace_rules(&self, rules: &[PolicyRule]) -> PolicyResult<()>;

    /// Insert rows whose key is absent; existing rows are left untouched.
    /// Returns the number inserted.
    async fn seed_rules(&self, rules: &[PolicyRule]) -> PolicyResult<usize>;

    fn label(&self) -> &'static str;
}

#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    rows: RwLock<BTreeMap<(String, String), PolicyRule>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn load_rules(&self) -> PolicyResult<Vec<PolicyRule>> {
        Ok(self.rows.read().values().cloned().collect())
    }

    async fn replace_rules(&self, rules: &[PolicyRule]) -> PolicyResult<()> {
        let mut guard = self.rows.write();
        for rule in rules {
            guard.insert(rule.key(), rule.clone());
        }
        Ok(())
    }

    async fn seed_rules(&self, rules: &[PolicyRule]) -> PolicyResult<usize> {
        let mut guard = self.rows.write();
        let mut inserted = 0;
        for rule in rules {
            if !guard.contains_key(&rule.key()) {
                guard.insert(rule.key(), rule.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn label(&self) -> &'static str {
        "memory"
    }
}
