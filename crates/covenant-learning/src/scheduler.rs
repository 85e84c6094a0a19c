//! Periodic and on-demand tuning runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::tuner::{AutoTuner, TuneReport};

/// Drives [`AutoTuner::run`] on a fixed interval, plus whenever triggered.
pub struct TuningScheduler {
    tuner: AutoTuner,
    period: Duration,
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: watch::Sender<bool>,
    running: Arc<RwLock<bool>>,
    last_report: RwLock<Option<TuneReport>>,
}

impl TuningScheduler {
    pub fn new(tuner: AutoTuner, period: Duration) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (trigger_tx, trigger_rx) = mpsc::channel(4);
        let (shutdown_tx, _) = watch::channel(false);
        let scheduler = Arc::new(Self {
            tuner,
            period,
            trigger_tx,
            shutdown_tx,
            running: Arc::new(RwLock::new(false)),
            last_report: RwLock::new(None),
        });
        (scheduler, trigger_rx)
    }

    /// Request an immediate run. Dropped if several are already queued.
    pub fn trigger(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub async fn last_report(&self) -> Option<TuneReport> {
        self.last_report.read().await.clone()
    }

    /// Run until [`stop`](Self::stop) is called or every trigger sender is gone.
    pub async fn start(self: Arc<Self>, mut trigger_rx: mpsc::Receiver<()>) {
        *self.running.write().await = true;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tracing::info!(period_secs = self.period.as_secs(), "Tuning scheduler started");

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_once("interval").await,
                Some(_) = trigger_rx.recv() => self.run_once("trigger").await,
                _ = shutdown_rx.changed() => break,
                else => break,
            }
        }

        *self.running.write().await = false;
        tracing::info!("Tuning scheduler stopped");
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn run_once(&self, cause: &'static str) {
        match self.tuner.run().await {
            Ok(report) => {
                tracing::debug!(cause, tuned = report.tuned, "Tuning run finished");
                *self.last_report.write().await = Some(report);
            }
            Err(e) => tracing::error!(error = %e, cause, "Tuning run failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::TunerConfig;
    use crate::record::NewRecord;
    use crate::recorder::LearningRecorder;
    use covenant_ledger::LedgerStore;
    use covenant_policy::{PolicyRegistry, PolicyRule};
    use covenant_types::{DecisionKind, EnforcementMode, Outcome};

    async fn tuner_with_noise() -> (AutoTuner, Arc<PolicyRegistry>) {
        let recorder = LearningRecorder::in_memory();
        let registry = Arc::new(PolicyRegistry::in_memory());
        registry
            .seed(&[PolicyRule::category("CREDIT", EnforcementMode::Strict, 8)])
            .await
            .unwrap();
        for i in 0..10 {
            let id = format!("c{i}");
            recorder
                .record(NewRecord {
                    entry_id: id.clone(),
                    event_type: "CREDIT_CHECK".to_string(),
                    category: "CREDIT".to_string(),
                    decision: DecisionKind::Blocked,
                    violation_kinds: Vec::new(),
                    drift_score: 30,
                    confidence_level: None,
                })
                .await
                .unwrap();
            recorder.label(&id, Outcome::Wrong).await.unwrap();
        }
        let tuner = AutoTuner::new(
            recorder,
            registry.clone(),
            Arc::new(LedgerStore::in_memory()),
            TunerConfig::default(),
            EnforcementMode::Strict,
        );
        (tuner, registry)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn interval_tick_runs_the_tuner() {
        let (tuner, registry) = tuner_with_noise().await;
        let (scheduler, rx) = TuningScheduler::new(tuner, Duration::from_secs(60));
        let handle = tokio::spawn(scheduler.clone().start(rx));

        settle().await;
        assert!(scheduler.is_running().await);
        assert!(scheduler.last_report().await.is_none());

        tokio::time::advance(Duration::from_secs(61)).await;
        settle().await;

        let report = scheduler.last_report().await.unwrap();
        assert!(report.tuned);
        let rule = registry.resolve("CREDIT_CHECK", EnforcementMode::Strict).rule;
        assert_eq!(rule.mode, EnforcementMode::Permissive);

        scheduler.stop();
        handle.await.unwrap();
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_runs_before_the_interval() {
        let (tuner, _registry) = tuner_with_noise().await;
        let (scheduler, rx) = TuningScheduler::new(tuner, Duration::from_secs(3600));
        let handle = tokio::spawn(scheduler.clone().start(rx));

        settle().await;
        scheduler.trigger();
        settle().await;

        assert!(scheduler.last_report().await.unwrap().tuned);
        scheduler.stop();
        handle.await.unwrap();
    }
}
