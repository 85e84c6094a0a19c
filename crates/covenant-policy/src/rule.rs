//! Policy rows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use covenant_types::{ConfidenceLevel, EnforcementMode, ViolationKind};
use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};

/// Event-type scope meaning "every event type in the category".
pub const WILDCARD: &str = "*";

/// Global bounds every `max_drift_score` stays within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftBounds {
    pub min: u32,
    pub max: u32,
}

impl DriftBounds {
    pub fn new(min: u32, max: u32) -> PolicyResult<Self> {
        if min > max {
            return Err(PolicyError::Validation(format!(
                "drift bounds are inverted: min {min} > max {max}"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn clamp(&self, value: u32) -> u32 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl Default for DriftBounds {
    fn default() -> Self {
        Self { min: 1, max: 20 }
    }
}

/// Per-pattern adjustment carried by a policy row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternOverride {
    pub enabled: bool,
    /// Multiplier on the pattern's drift contribution.
    pub weight: f64,
}

impl Default for PatternOverride {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 1.0,
        }
    }
}

/// One effective policy row, keyed by `(category, event_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub category: String,
    /// A concrete event type, or [`WILDCARD`] for the whole category.
    pub event_type: String,
    pub mode: EnforcementMode,
    pub max_drift_score: u32,
    #[serde(default)]
    pub required_confidence: Option<ConfidenceLevel>,
    #[serde(default)]
    pub pattern_overrides: BTreeMap<ViolationKind, PatternOverride>,
    /// Labelled samples seen by the last tuning run.
    #[serde(default)]
    pub sample_count: u64,
    #[serde(default)]
    pub signal_rate: f64,
    #[serde(default)]
    pub noise_rate: f64,
    #[serde(default)]
    pub auto_tuned: bool,
    pub updated_at: DateTime<Utc>,
}

impl PolicyRule {
    pub fn new(
        category: impl Into<String>,
        event_type: impl Into<String>,
        mode: EnforcementMode,
        max_drift_score: u32,
    ) -> Self {
        Self {
            category: normalize(&category.into()),
            event_type: normalize(&event_type.into()),
            mode,
            max_drift_score,
            required_confidence: None,
            pattern_overrides: BTreeMap::new(),
            sample_count: 0,
            signal_rate: 0.0,
            noise_rate: 0.0,
            auto_tuned: false,
            updated_at: Utc::now(),
        }
    }

    /// Category-wide row.
    pub fn category(category: impl Into<String>, mode: EnforcementMode, max_drift: u32) -> Self {
        Self::new(category, WILDCARD, mode, max_drift)
    }

    pub fn with_required_confidence(mut self, level: ConfidenceLevel) -> Self {
        self.required_confidence = Some(level);
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.event_type == WILDCARD
    }

    pub fn key(&self) -> (String, String) {
        (self.category.clone(), self.event_type.clone())
    }

    pub fn is_enabled(&self, kind: ViolationKind) -> bool {
        self.pattern_overrides
            .get(&kind)
            .map_or(true, |o| o.enabled)
    }

    pub fn weight(&self, kind: ViolationKind) -> f64 {
        self.pattern_overrides
            .get(&kind)
            .map_or(1.0, |o| o.weight)
    }

    pub fn validate(&self, bounds: &DriftBounds) -> PolicyResult<()> {
        if self.category.is_empty() {
            return Err(PolicyError::Validation("category is required".to_string()));
        }
        if self.event_type.is_empty() {
            return Err(PolicyError::Validation(
                "event_type is required (use \"*\" for the whole category)".to_string(),
            ));
        }
        if !bounds.contains(self.max_drift_score) {
            return Err(PolicyError::Validation(format!(
                "{}/{}: max_drift_score {} outside [{}, {}]",
                self.category, self.event_type, self.max_drift_score, bounds.min, bounds.max
            )));
        }
        for (kind, o) in &self.pattern_overrides {
            if !o.weight.is_finite() || o.weight < 0.0 {
                return Err(PolicyError::Validation(format!(
                    "{}/{}: weight for {kind} must be a non-negative number",
                    self.category, self.event_type
                )));
            }
        }
        Ok(())
    }
}

/// Categories and event types are matched upper-case.
pub fn normalize(value: &str) -> String {
    value.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_default_to_enabled_unit_weight() {
        let mut rule = PolicyRule::category("tax", EnforcementMode::Strict, 5);
        assert_eq!(rule.category, "TAX");
        assert!(rule.is_enabled(ViolationKind::Hedging));
        assert_eq!(rule.weight(ViolationKind::Hedging), 1.0);

        rule.pattern_overrides.insert(
            ViolationKind::Hedging,
            PatternOverride {
                enabled: false,
                weight: 2.0,
            },
        );
        assert!(!rule.is_enabled(ViolationKind::Hedging));
        assert_eq!(rule.weight(ViolationKind::Hedging), 2.0);
    }

    #[test]
    fn validate_enforces_bounds() {
        let bounds = DriftBounds::default();
        assert!(PolicyRule::category("TAX", EnforcementMode::Strict, 5)
            .validate(&bounds)
            .is_ok());
        assert!(PolicyRule::category("TAX", EnforcementMode::Strict, 21)
            .validate(&bounds)
            .is_err());
        assert!(PolicyRule::category("TAX", EnforcementMode::Strict, 0)
            .validate(&bounds)
            .is_err());
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        assert!(DriftBounds::new(10, 2).is_err());
        assert_eq!(DriftBounds::new(1, 20).unwrap().clamp(25), 20);
    }

    #[test]
    fn overrides_serialize_keyed_by_kind() {
        let mut rule = PolicyRule::category("TAX", EnforcementMode::Strict, 5);
        rule.pattern_overrides
            .insert(ViolationKind::Hedging, PatternOverride::default());
        let json = serde_json::to_value(&rule.pattern_overrides).unwrap();
        assert!(json.get("HEDGING").is_some());
    }
}
