//! Covenant learning loop.
//!
//! The [`LearningRecorder`] stores one row per recorded pipeline decision and
//! accepts a single ground-truth label for it later. The [`AutoTuner`]
//! aggregates labelled rows per category and rewrites the category's policy
//! row when noise or signal rates cross their thresholds, auditing each run
//! in the ledger. [`TuningScheduler`] runs the tuner periodically.

#![deny(unsafe_code)]

mod error;
mod plan;
mod record;
mod recorder;
mod scheduler;
pub mod sqlite;
mod store;
mod tuner;

pub use error::{LearningError, LearningResult};
pub use plan::{plan_tuning, CategorySkip, SkipReason, TunerConfig, TuningChange, TuningPlan};
pub use record::{LearningRecord, NewRecord};
pub use recorder::LearningRecorder;
pub use scheduler::TuningScheduler;
pub use sqlite::{SqliteLearningStore, LEARNING_COLUMNS};
pub use store::{LearningStore, MemoryLearningStore};
pub use tuner::{AutoTuner, TuneReport, POLICY_TUNED_EVENT};
