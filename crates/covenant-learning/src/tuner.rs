//! The auto-tuner: one locked read-plan-apply-audit cycle per run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use covenant_ledger::{LedgerStore, NewEntry};
use covenant_policy::PolicyRegistry;
use covenant_types::{Actor, EnforcementMode};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::error::LearningResult;
use crate::plan::{plan_tuning, CategorySkip, TunerConfig, TuningChange};
use crate::recorder::LearningRecorder;

/// Ledger event type of the per-run audit entry.
pub const POLICY_TUNED_EVENT: &str = "POLICY_TUNED";

/// Result of one tuning run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuneReport {
    pub tuned: bool,
    pub changes: Vec<TuningChange>,
    /// Set when the whole run was skipped.
    pub skipped: Option<String>,
    pub categories_skipped: Vec<CategorySkip>,
    pub audit_entry_id: Option<String>,
    pub ran_at: DateTime<Utc>,
}

impl TuneReport {
    fn skipped(reason: impl Into<String>, categories: Vec<CategorySkip>) -> Self {
        Self {
            tuned: false,
            changes: Vec::new(),
            skipped: Some(reason.into()),
            categories_skipped: categories,
            audit_entry_id: None,
            ran_at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct AutoTuner {
    recorder: LearningRecorder,
    registry: Arc<PolicyRegistry>,
    ledger: Arc<LedgerStore>,
    config: TunerConfig,
    default_mode: EnforcementMode,
}

impl AutoTuner {
    pub fn new(
        recorder: LearningRecorder,
        registry: Arc<PolicyRegistry>,
        ledger: Arc<LedgerStore>,
        config: TunerConfig,
        default_mode: EnforcementMode,
    ) -> Self {
        Self {
            recorder,
            registry,
            ledger,
            config,
            default_mode,
        }
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    /// Run one cycle.
    ///
    /// A run that cannot take the registry lock within `lock_wait_ms` is
    /// skipped, not queued. Policy rows are committed before the audit entry
    /// is appended; a failed audit append is logged and reported as a missing
    /// `audit_entry_id`.
    pub async fn run(&self) -> LearningResult<TuneReport> {
        let wait = Duration::from_millis(self.config.lock_wait_ms);
        let Some(guard) = self.registry.lock_for_tuning(wait).await else {
            info!(wait_ms = self.config.lock_wait_ms, "Tuning run skipped, registry busy");
            return Ok(TuneReport::skipped("tuning already in progress", Vec::new()));
        };

        let records = self.recorder.labeled().await?;
        let table = self.registry.snapshot();
        let bounds = self.registry.bounds();
        let now = Utc::now();
        let plan = plan_tuning(
            &records,
            &table,
            &self.config,
            &bounds,
            self.default_mode,
            now,
        );

        if plan.is_empty() {
            info!(
                labeled = records.len(),
                categories_skipped = plan.skipped.len(),
                "Tuning run made no changes"
            );
            return Ok(TuneReport::skipped("no changes", plan.skipped));
        }

        self.registry.apply(&guard, &plan.updated_rules).await?;
        drop(guard);

        for change in &plan.changes {
            info!(category = change.category(), change = ?change, "Policy tuned");
        }

        let body = json!({
            "labeled_samples": records.len(),
            "changes": plan.changes,
            "rules": plan.updated_rules.iter().map(|r| json!({
                "category": r.category,
                "event_type": r.event_type,
                "mode": r.mode,
                "max_drift_score": r.max_drift_score,
                "sample_count": r.sample_count,
            })).collect::<Vec<_>>(),
        });
        let mut entry = NewEntry::new(Actor::System, POLICY_TUNED_EVENT, body.to_string());
        for rule in &plan.updated_rules {
            entry = entry.with_tag(rule.category.clone());
        }

        let audit_entry_id = match self.ledger.append(entry).await {
            Ok(appended) => Some(appended.id),
            Err(e) => {
                error!(
                    error = %e,
                    rules = plan.updated_rules.len(),
                    "Policy committed but audit append failed"
                );
                None
            }
        };

        Ok(TuneReport {
            tuned: true,
            changes: plan.changes,
            skipped: None,
            categories_skipped: plan.skipped,
            audit_entry_id,
            ran_at: now,
        })
    }
}
