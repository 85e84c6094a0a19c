//! Learning record shape.

use chrono::{DateTime, Utc};
use covenant_types::{ConfidenceLevel, DecisionKind, Outcome, ViolationKind};
use serde::{Deserialize, Serialize};

/// One pipeline decision awaiting, or carrying, a ground-truth label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRecord {
    /// Ledger entry the decision was persisted as.
    pub entry_id: String,
    pub event_type: String,
    pub category: String,
    pub decision: DecisionKind,
    /// Distinct kinds that fired.
    pub violation_kinds: Vec<ViolationKind>,
    pub drift_score: u32,
    pub confidence_level: Option<ConfidenceLevel>,
    pub outcome: Outcome,
    pub outcome_at: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}

impl LearningRecord {
    pub fn is_labeled(&self) -> bool {
        self.outcome.is_labeled()
    }

    pub fn fired(&self, kind: ViolationKind) -> bool {
        self.violation_kinds.contains(&kind)
    }
}

/// Fields supplied by the pipeline when it records a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub entry_id: String,
    pub event_type: String,
    pub category: String,
    pub decision: DecisionKind,
    pub violation_kinds: Vec<ViolationKind>,
    pub drift_score: u32,
    pub confidence_level: Option<ConfidenceLevel>,
}

impl NewRecord {
    pub(crate) fn into_pending(self, recorded_at: DateTime<Utc>) -> LearningRecord {
        let mut kinds = self.violation_kinds;
        kinds.sort();
        kinds.dedup();
        LearningRecord {
            entry_id: self.entry_id,
            event_type: self.event_type,
            category: self.category,
            decision: self.decision,
            violation_kinds: kinds,
            drift_score: self.drift_score,
            confidence_level: self.confidence_level,
            outcome: Outcome::Pending,
            outcome_at: None,
            recorded_at,
        }
    }
}
