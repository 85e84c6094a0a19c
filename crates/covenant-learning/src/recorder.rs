//! The learning recorder.

use std::sync::Arc;

use chrono::Utc;
use covenant_types::{Outcome, QueryWindow};
use tracing::{debug, info};

use crate::error::{LearningError, LearningResult};
use crate::record::{LearningRecord, NewRecord};
use crate::store::{LearningStore, MemoryLearningStore};

/// Appends pipeline decisions and applies ground-truth labels.
#[derive(Clone)]
pub struct LearningRecorder {
    store: Arc<dyn LearningStore>,
}

impl LearningRecorder {
    pub fn new(store: Arc<dyn LearningStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLearningStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn LearningStore> {
        &self.store
    }

    /// Append a PENDING row for a recorded decision.
    pub async fn record(&self, new: NewRecord) -> LearningResult<LearningRecord> {
        if new.entry_id.trim().is_empty() {
            return Err(LearningError::Validation("entry_id is required".to_string()));
        }
        if new.event_type.trim().is_empty() {
            return Err(LearningError::Validation("event_type is required".to_string()));
        }

        let record = new.into_pending(Utc::now());
        self.store.insert(&record).await?;
        debug!(
            entry_id = %record.entry_id,
            category = %record.category,
            decision = %record.decision,
            drift_score = record.drift_score,
            "Learning record appended"
        );
        Ok(record)
    }

    /// Label a row exactly once. Unknown or already-labelled rows are errors.
    pub async fn label(&self, entry_id: &str, outcome: Outcome) -> LearningResult<LearningRecord> {
        if !outcome.is_labeled() {
            return Err(LearningError::Validation(
                "outcome must be CORRECT or WRONG".to_string(),
            ));
        }
        let record = self.store.label(entry_id, outcome, Utc::now()).await?;
        info!(entry_id, outcome = %outcome, category = %record.category, "Decision labelled");
        Ok(record)
    }

    pub async fn get(&self, entry_id: &str) -> LearningResult<Option<LearningRecord>> {
        self.store.get(entry_id).await
    }

    pub async fn list(&self, window: QueryWindow) -> LearningResult<Vec<LearningRecord>> {
        self.store.list(window).await
    }

    pub async fn labeled(&self) -> LearningResult<Vec<LearningRecord>> {
        self.store.labeled().await
    }
}
