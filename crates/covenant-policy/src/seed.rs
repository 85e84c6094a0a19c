//! Rows written at setup when no configuration overrides them.
//!
//! The fallback category has no row of its own, so event types outside the
//! seeded categories resolve to the configured default mode.

use covenant_types::EnforcementMode;

use crate::rule::PolicyRule;

pub fn default_seeds() -> Vec<PolicyRule> {
    vec![
        PolicyRule::category("TAX", EnforcementMode::Strict, 5),
        PolicyRule::category("CREDIT", EnforcementMode::Strict, 8),
        PolicyRule::category("AUDIT", EnforcementMode::Strict, 5),
    ]
}
