//! Drift scoring.

use covenant_policy::PolicyRule;
use covenant_types::{Severity, Violation};

pub const CRITICAL_POINTS: f64 = 30.0;
pub const WARNING_POINTS: f64 = 10.0;
pub const INFO_POINTS: f64 = 2.0;
pub const MAX_DRIFT_SCORE: u32 = 100;

/// Unweighted points for one violation.
///
/// CRITICAL counts once regardless of matches; WARNING and INFO scale with
/// the match count.
pub fn severity_points(violation: &Violation) -> f64 {
    match violation.severity {
        Severity::Critical => CRITICAL_POINTS,
        Severity::Warning => WARNING_POINTS * f64::from(violation.count),
        Severity::Info => INFO_POINTS * f64::from(violation.count),
    }
}

/// Drop violations whose pattern the rule disables.
pub fn apply_overrides(violations: Vec<Violation>, rule: &PolicyRule) -> Vec<Violation> {
    violations
        .into_iter()
        .filter(|v| rule.is_enabled(v.kind))
        .collect()
}

/// Weighted, capped drift score in `0..=100`.
pub fn drift_score(violations: &[Violation], rule: &PolicyRule) -> u32 {
    let total: f64 = violations
        .iter()
        .filter(|v| rule.is_enabled(v.kind))
        .map(|v| severity_points(v) * rule.weight(v.kind))
        .sum();
    if total.is_nan() || total <= 0.0 {
        return 0;
    }
    (total.round() as u32).min(MAX_DRIFT_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_policy::PatternOverride;
    use covenant_types::{EnforcementMode, ViolationKind};
    use proptest::prelude::*;

    fn rule() -> PolicyRule {
        PolicyRule::category("TAX", EnforcementMode::Strict, 5)
    }

    #[test]
    fn warning_plus_critical_scores_forty() {
        let violations = vec![
            Violation::new(ViolationKind::Overconfidence, "certain"),
            Violation::new(ViolationKind::MissingCitation, "no source"),
        ];
        assert_eq!(drift_score(&violations, &rule()), 40);
    }

    #[test]
    fn counts_scale_warning_and_info_only() {
        let violations = vec![
            Violation::new(ViolationKind::Hedging, "maybe").with_matches(3, Vec::new()),
            Violation::new(ViolationKind::Overconfidence, "sure").with_matches(2, Vec::new()),
            Violation::new(ViolationKind::Fabrication, "made up").with_matches(4, Vec::new()),
        ];
        // 2*3 + 10*2 + 30
        assert_eq!(drift_score(&violations, &rule()), 56);
    }

    #[test]
    fn score_is_capped() {
        let violations: Vec<_> = (0..5)
            .map(|_| Violation::new(ViolationKind::Jailbreak, "x"))
            .collect();
        assert_eq!(drift_score(&violations, &rule()), MAX_DRIFT_SCORE);
    }

    #[test]
    fn overrides_disable_and_weight() {
        let mut rule = rule();
        rule.pattern_overrides.insert(
            ViolationKind::Overconfidence,
            PatternOverride {
                enabled: true,
                weight: 2.0,
            },
        );
        rule.pattern_overrides.insert(
            ViolationKind::Hedging,
            PatternOverride {
                enabled: false,
                weight: 1.0,
            },
        );
        let violations = vec![
            Violation::new(ViolationKind::Overconfidence, "sure"),
            Violation::new(ViolationKind::Hedging, "maybe"),
        ];
        assert_eq!(drift_score(&violations, &rule), 20);
        assert_eq!(apply_overrides(violations, &rule).len(), 1);
    }

    fn violation() -> impl Strategy<Value = Violation> {
        (0..ViolationKind::ALL.len(), 1u32..=10).prop_map(|(i, count)| {
            Violation::new(ViolationKind::ALL[i], "generated").with_matches(count, Vec::new())
        })
    }

    proptest! {
        #[test]
        fn adding_a_violation_never_lowers_the_score(
            base in proptest::collection::vec(violation(), 0..8),
            extra in violation(),
        ) {
            let rule = rule();
            let before = drift_score(&base, &rule);
            let mut more = base.clone();
            more.push(extra.clone());
            let after = drift_score(&more, &rule);
            prop_assert!(after >= before);
            if extra.is_critical() {
                prop_assert!(after >= (before + 30).min(MAX_DRIFT_SCORE));
            }
        }
    }
}
