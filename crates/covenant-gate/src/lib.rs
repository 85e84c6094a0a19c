//! Covenant gatekeeper.
//!
//! [`Gatekeeper::precheck`] runs before an external completion call and
//! [`Gatekeeper::postcheck`] after it. Each phase resolves the policy for the
//! event type, runs its detector families, applies pattern overrides, scores
//! drift and decides allow or block for the effective enforcement mode.
//! Decisions that fired anything are appended to the ledger and recorded for
//! the learning loop.
//!
//! [`GatedClient`] strings both phases around a [`CompletionProvider`] call
//! bounded by a timeout.

#![deny(unsafe_code)]

mod client;
mod confidence;
mod error;
mod gatekeeper;
pub mod providers;
mod sanitize;
mod scoring;

pub use client::{GatedClient, GatedRequest, GatedResponse};
pub use confidence::{
    ConfidenceDeclaration, ConfidenceRegistry, DeclarationStatus, CONFIDENCE_DECLARED_EVENT,
};
pub use error::{CompletionError, GateError, GateResult};
pub use gatekeeper::{
    blocks, GateDecision, GateOptions, Gatekeeper, GatekeeperConfig, PostcheckResult,
    PrecheckResult, POSTCHECK_EVENT, PRECHECK_EVENT,
};
pub use providers::{
    Completion, CompletionProvider, CompletionRequest, HttpCompletionProvider,
    MockCompletionProvider, ProviderKind, ProviderRegistry, TokenUsage,
};
pub use sanitize::sanitize;
pub use scoring::{
    apply_overrides, drift_score, severity_points, CRITICAL_POINTS, INFO_POINTS, MAX_DRIFT_SCORE,
    WARNING_POINTS,
};

#[cfg(test)]
mod mode_tests {
    use super::*;
    use covenant_policy::{PolicyRule, PolicySource, ResolvedPolicy};
    use covenant_types::{EnforcementMode, Violation, ViolationKind};
    use proptest::prelude::*;

    fn violations() -> impl Strategy<Value = Vec<Violation>> {
        proptest::collection::vec(
            (0..ViolationKind::ALL.len()).prop_map(|i| Violation::new(ViolationKind::ALL[i], "x")),
            0..6,
        )
    }

    proptest! {
        #[test]
        fn strict_blocks_whenever_looser_modes_would(
            found in violations(),
            max in 1u32..=20,
            configured in any::<bool>(),
        ) {
            let policy = ResolvedPolicy {
                rule: PolicyRule::category("TAX", EnforcementMode::Strict, max),
                source: if configured { PolicySource::Category } else { PolicySource::Default },
            };
            let score = drift_score(&found, &policy.rule);

            prop_assert!(!blocks(EnforcementMode::AuditOnly, &found, score, &policy));
            prop_assert!(!blocks(EnforcementMode::Permissive, &found, score, &policy));
            if found.iter().any(Violation::is_critical) {
                prop_assert!(blocks(EnforcementMode::Strict, &found, score, &policy));
            }
        }
    }
}
