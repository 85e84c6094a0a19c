//! Pure tuning step: (labelled records, current policy) -> (new rows, change log).
//!
//! Per category, over labelled rows only:
//!
//! 1. skip below `min_samples`, or when the labelled count equals the count
//!    stamped by the previous tuning of that row;
//! 2. `noise_rate = wrong / total`, `signal_rate = correct / total`;
//! 3. noise above `noise_threshold` loosens (STRICT to PERMISSIVE, ceiling
//!    up by `loosen_step`, capped at the global max);
//! 4. signal above `signal_threshold` with blocks above `block_ratio_threshold`
//!    of the total tightens (PERMISSIVE to STRICT, ceiling down by
//!    `tighten_step`, floored at the global min);
//! 5. each pattern with at least `pattern_min_fires` fires is disabled when
//!    its own noise rate exceeds `pattern_noise_threshold`, or has its weight
//!    doubled when its signal rate exceeds `pattern_signal_threshold`.
//!
//! A row is only rewritten when one of its values actually changes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use covenant_policy::{compiled_default, DriftBounds, PatternOverride, PolicyRule, PolicyTable};
use covenant_types::{DecisionKind, EnforcementMode, Outcome, ViolationKind};
use serde::{Deserialize, Serialize};

use crate::record::LearningRecord;

/// Thresholds and steps of the control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub min_samples: usize,
    pub noise_threshold: f64,
    pub signal_threshold: f64,
    pub block_ratio_threshold: f64,
    pub loosen_step: u32,
    pub tighten_step: u32,
    pub pattern_min_fires: usize,
    pub pattern_noise_threshold: f64,
    pub pattern_signal_threshold: f64,
    pub max_pattern_weight: f64,
    /// Bounded wait for the registry lock before a run is skipped.
    pub lock_wait_ms: u64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            noise_threshold: 0.7,
            signal_threshold: 0.3,
            block_ratio_threshold: 0.10,
            loosen_step: 2,
            tighten_step: 1,
            pattern_min_fires: 5,
            pattern_noise_threshold: 0.8,
            pattern_signal_threshold: 0.8,
            max_pattern_weight: 8.0,
            lock_wait_ms: 500,
        }
    }
}

/// One applied adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TuningChange {
    Loosened {
        category: String,
        from_mode: EnforcementMode,
        to_mode: EnforcementMode,
        from_max_drift: u32,
        to_max_drift: u32,
        noise_rate: f64,
    },
    Tightened {
        category: String,
        from_mode: EnforcementMode,
        to_mode: EnforcementMode,
        from_max_drift: u32,
        to_max_drift: u32,
        signal_rate: f64,
        block_ratio: f64,
    },
    PatternDisabled {
        category: String,
        pattern: ViolationKind,
        fires: usize,
        noise_rate: f64,
    },
    PatternBoosted {
        category: String,
        pattern: ViolationKind,
        fires: usize,
        signal_rate: f64,
        from_weight: f64,
        to_weight: f64,
    },
}

impl TuningChange {
    pub fn category(&self) -> &str {
        match self {
            Self::Loosened { category, .. }
            | Self::Tightened { category, .. }
            | Self::PatternDisabled { category, .. }
            | Self::PatternBoosted { category, .. } => category,
        }
    }
}

/// Why a category was left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    InsufficientSamples { have: usize, need: usize },
    NoNewSamples { samples: usize },
    NoThresholdCrossed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySkip {
    pub category: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Output of [`plan_tuning`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TuningPlan {
    pub updated_rules: Vec<PolicyRule>,
    pub changes: Vec<TuningChange>,
    pub skipped: Vec<CategorySkip>,
}

impl TuningPlan {
    pub fn is_empty(&self) -> bool {
        self.updated_rules.is_empty()
    }
}

#[derive(Debug, Default)]
struct PatternStats {
    fires: usize,
    correct: usize,
    wrong: usize,
}

#[derive(Debug, Default)]
struct CategoryStats {
    total: usize,
    blocked: usize,
    warned: usize,
    correct: usize,
    wrong: usize,
    patterns: BTreeMap<ViolationKind, PatternStats>,
}

fn aggregate(records: &[LearningRecord]) -> BTreeMap<String, CategoryStats> {
    let mut by_category: BTreeMap<String, CategoryStats> = BTreeMap::new();
    for record in records.iter().filter(|r| r.is_labeled()) {
        let stats = by_category.entry(record.category.clone()).or_default();
        stats.total += 1;
        match record.decision {
            DecisionKind::Blocked => stats.blocked += 1,
            DecisionKind::Warned => stats.warned += 1,
            DecisionKind::Allowed => {}
        }
        let correct = record.outcome == Outcome::Correct;
        if correct {
            stats.correct += 1;
        } else {
            stats.wrong += 1;
        }
        for kind in &record.violation_kinds {
            let pattern = stats.patterns.entry(*kind).or_default();
            pattern.fires += 1;
            if correct {
                pattern.correct += 1;
            } else {
                pattern.wrong += 1;
            }
        }
    }
    by_category
}

/// Compute the next policy rows. Touches nothing outside its arguments.
pub fn plan_tuning(
    records: &[LearningRecord],
    table: &PolicyTable,
    config: &TunerConfig,
    bounds: &DriftBounds,
    default_mode: EnforcementMode,
    now: DateTime<Utc>,
) -> TuningPlan {
    let mut plan = TuningPlan::default();

    for (category, stats) in aggregate(records) {
        if stats.total < config.min_samples {
            plan.skipped.push(CategorySkip {
                category,
                reason: SkipReason::InsufficientSamples {
                    have: stats.total,
                    need: config.min_samples,
                },
            });
            continue;
        }

        let current = table
            .category_rule(&category)
            .cloned()
            .unwrap_or_else(|| compiled_default(&category, default_mode, bounds));

        if current.auto_tuned && current.sample_count == stats.total as u64 {
            plan.skipped.push(CategorySkip {
                category,
                reason: SkipReason::NoNewSamples {
                    samples: stats.total,
                },
            });
            continue;
        }

        let total = stats.total as f64;
        let noise_rate = stats.wrong as f64 / total;
        let signal_rate = stats.correct as f64 / total;
        let block_ratio = stats.blocked as f64 / total;

        let mut next = current.clone();
        let mut changes = Vec::new();

        // Bring a row that predates a bounds change back inside.
        next.max_drift_score = bounds.clamp(next.max_drift_score);

        if noise_rate > config.noise_threshold {
            let to_mode = next.mode.loosened();
            let to_max = next
                .max_drift_score
                .saturating_add(config.loosen_step)
                .min(bounds.max);
            if to_mode != next.mode || to_max != next.max_drift_score {
                changes.push(TuningChange::Loosened {
                    category: category.clone(),
                    from_mode: next.mode,
                    to_mode,
                    from_max_drift: next.max_drift_score,
                    to_max_drift: to_max,
                    noise_rate,
                });
                next.mode = to_mode;
                next.max_drift_score = to_max;
            }
        } else if signal_rate > config.signal_threshold
            && block_ratio > config.block_ratio_threshold
        {
            let to_mode = next.mode.tightened();
            let to_max = next
                .max_drift_score
                .saturating_sub(config.tighten_step)
                .max(bounds.min);
            if to_mode != next.mode || to_max != next.max_drift_score {
                changes.push(TuningChange::Tightened {
                    category: category.clone(),
                    from_mode: next.mode,
                    to_mode,
                    from_max_drift: next.max_drift_score,
                    to_max_drift: to_max,
                    signal_rate,
                    block_ratio,
                });
                next.mode = to_mode;
                next.max_drift_score = to_max;
            }
        }

        for (kind, pattern) in &stats.patterns {
            if pattern.fires < config.pattern_min_fires {
                continue;
            }
            let fires = pattern.fires as f64;
            let p_noise = pattern.wrong as f64 / fires;
            let p_signal = pattern.correct as f64 / fires;
            let current_override = next.pattern_overrides.get(kind).copied().unwrap_or_default();

            if p_noise > config.pattern_noise_threshold && current_override.enabled {
                next.pattern_overrides.insert(
                    *kind,
                    PatternOverride {
                        enabled: false,
                        ..current_override
                    },
                );
                changes.push(TuningChange::PatternDisabled {
                    category: category.clone(),
                    pattern: *kind,
                    fires: pattern.fires,
                    noise_rate: p_noise,
                });
            } else if p_signal > config.pattern_signal_threshold && current_override.enabled {
                let to_weight = (current_override.weight.max(1.0) * 2.0)
                    .min(config.max_pattern_weight.max(1.0));
                if to_weight != current_override.weight {
                    next.pattern_overrides.insert(
                        *kind,
                        PatternOverride {
                            enabled: true,
                            weight: to_weight,
                        },
                    );
                    changes.push(TuningChange::PatternBoosted {
                        category: category.clone(),
                        pattern: *kind,
                        fires: pattern.fires,
                        signal_rate: p_signal,
                        from_weight: current_override.weight,
                        to_weight,
                    });
                }
            }
        }

        if changes.is_empty() {
            plan.skipped.push(CategorySkip {
                category,
                reason: SkipReason::NoThresholdCrossed,
            });
            continue;
        }

        next.sample_count = stats.total as u64;
        next.signal_rate = signal_rate;
        next.noise_rate = noise_rate;
        next.auto_tuned = true;
        next.updated_at = now;

        plan.updated_rules.push(next);
        plan.changes.extend(changes);
    }

    plan
}
