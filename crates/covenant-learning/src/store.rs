//! Learning persistence contract and the in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use covenant_types::{Outcome, QueryWindow};
use parking_lot::RwLock;

use crate::error::{LearningError, LearningResult};
use crate::record::LearningRecord;

#[async_trait]
pub trait LearningStore: Send + Sync {
    /// Append a PENDING row. A second row for the same entry is an error.
    async fn insert(&self, record: &LearningRecord) -> LearningResult<()>;

    async fn get(&self, entry_id: &str) -> LearningResult<Option<LearningRecord>>;

    /// Set outcome and timestamp on a PENDING row, exactly once.
    async fn label(
        &self,
        entry_id: &str,
        outcome: Outcome,
        at: DateTime<Utc>,
    ) -> LearningResult<LearningRecord>;

    /// Rows newest-first.
    async fn list(&self, window: QueryWindow) -> LearningResult<Vec<LearningRecord>>;

    /// Every non-PENDING row.
    async fn labeled(&self) -> LearningResult<Vec<LearningRecord>>;

    fn backend_label(&self) -> &'static str;
}

#[derive(Debug, Default)]
pub struct MemoryLearningStore {
    rows: RwLock<Vec<LearningRecord>>,
}

impl MemoryLearningStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LearningStore for MemoryLearningStore {
    async fn insert(&self, record: &LearningRecord) -> LearningResult<()> {
        let mut guard = self.rows.write();
        if guard.iter().any(|r| r.entry_id == record.entry_id) {
            return Err(LearningError::Duplicate(record.entry_id.clone()));
        }
        guard.push(record.clone());
        Ok(())
    }

    async fn get(&self, entry_id: &str) -> LearningResult<Option<LearningRecord>> {
        Ok(self
            .rows
            .read()
            .iter()
            .find(|r| r.entry_id == entry_id)
            .cloned())
    }

    async fn label(
        &self,
        entry_id: &str,
        outcome: Outcome,
        at: DateTime<Utc>,
    ) -> LearningResult<LearningRecord> {
        let mut guard = self.rows.write();
        let row = guard
            .iter_mut()
            .find(|r| r.entry_id == entry_id)
            .ok_or_else(|| LearningError::NotFound(entry_id.to_string()))?;
        if row.is_labeled() {
            return Err(LearningError::AlreadyLabeled(entry_id.to_string()));
        }
        row.outcome = outcome;
        row.outcome_at = Some(at);
        Ok(row.clone())
    }

    async fn list(&self, window: QueryWindow) -> LearningResult<Vec<LearningRecord>> {
        let newest_first: Vec<LearningRecord> = self.rows.read().iter().rev().cloned().collect();
        Ok(window.apply(newest_first))
    }

    async fn labeled(&self) -> LearningResult<Vec<LearningRecord>> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|r| r.is_labeled())
            .cloned()
            .collect())
    }

    fn backend_label(&self) -> &'static str {
        "memory"
    }
}
