//! The two-phase gatekeeper.
//!
//! ```text
//! precheck(prompt)  -> resolve policy -> declaration check -> adversarial scan
//!                   -> overrides -> score -> decide -> consume declaration
//!                   -> persist (ledger + learning) when anything fired
//! postcheck(reply)  -> drift / hallucination / schema? / citation? / consistency
//!                   -> overrides -> score -> decide -> sanitise? -> persist
//! ```
//!
//! Nothing here reads process-wide state: the enforcement mode arrives in
//! [`GateOptions`] and is used whenever no policy row is configured for the
//! event type.

use std::sync::Arc;

use chrono::Utc;
use covenant_detectors::{DetectorSet, ResponseScan};
use covenant_ledger::{LedgerStore, NewEntry};
use covenant_learning::{LearningRecorder, NewRecord};
use covenant_policy::{PolicyRegistry, PolicySource, ResolvedPolicy};
use covenant_types::{
    Actor, ConfidenceLevel, DecisionKind, EnforcementMode, Phase, Violation, ViolationKind,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::confidence::{ConfidenceRegistry, DeclarationStatus};
use crate::error::{GateError, GateResult};
use crate::sanitize::sanitize;
use crate::scoring::{apply_overrides, drift_score};

pub const PRECHECK_EVENT: &str = "GATEKEEPER_PRECHECK";
pub const POSTCHECK_EVENT: &str = "GATEKEEPER_POSTCHECK";

/// Per-call options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateOptions {
    /// Mode applied when the event type has no configured policy.
    #[serde(default)]
    pub mode: EnforcementMode,
    pub event_type: String,
    #[serde(default)]
    pub confidence_ref: Option<String>,
    /// Skip the declaration requirement for this call.
    #[serde(default)]
    pub waive_confidence: bool,
    #[serde(default)]
    pub check_schema: bool,
    #[serde(default)]
    pub check_citations: bool,
    #[serde(default)]
    pub sanitize: bool,
}

impl GateOptions {
    pub fn new(event_type: impl Into<String>, mode: EnforcementMode) -> Self {
        Self {
            mode,
            event_type: event_type.into(),
            confidence_ref: None,
            waive_confidence: false,
            check_schema: false,
            check_citations: false,
            sanitize: false,
        }
    }

    pub fn with_confidence(mut self, declaration_id: impl Into<String>) -> Self {
        self.confidence_ref = Some(declaration_id.into());
        self
    }

    pub fn waived(mut self) -> Self {
        self.waive_confidence = true;
        self
    }
}

/// Outcome of one phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateDecision {
    pub phase: Phase,
    pub mode: EnforcementMode,
    pub category: String,
    pub policy_source: PolicySource,
    pub max_drift_score: u32,
    pub violations: Vec<Violation>,
    pub drift_score: u32,
    pub allowed: bool,
    pub decision: DecisionKind,
    /// Ledger entry the decision was persisted as, if it was.
    pub entry_id: Option<String>,
}

impl GateDecision {
    pub fn kinds(&self) -> Vec<ViolationKind> {
        self.violations.iter().map(|v| v.kind).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrecheckResult {
    pub decision: GateDecision,
    pub event_type: String,
    /// Declaration linked by this precheck.
    pub confidence_ref: Option<String>,
    pub confidence_level: Option<ConfidenceLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostcheckResult {
    pub decision: GateDecision,
    /// Response with warning banners, when sanitising was requested.
    pub sanitized_text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Also persist decisions with no violations and zero drift.
    #[serde(default)]
    pub persist_clean_decisions: bool,
}

pub struct Gatekeeper {
    detectors: Arc<DetectorSet>,
    policies: Arc<PolicyRegistry>,
    confidence: Arc<ConfidenceRegistry>,
    ledger: Arc<LedgerStore>,
    recorder: LearningRecorder,
    config: GatekeeperConfig,
}

/// Whether `mode` blocks the given violations and score.
///
/// Drift over the ceiling only counts under a configured policy; the
/// compiled-in default never blocks on score alone.
pub fn blocks(
    mode: EnforcementMode,
    violations: &[Violation],
    score: u32,
    policy: &ResolvedPolicy,
) -> bool {
    if !mode.blocks() {
        return false;
    }
    violations.iter().any(Violation::is_critical)
        || (policy.is_configured() && score > policy.rule.max_drift_score)
}

fn decision_kind(allowed: bool, violations: &[Violation], score: u32) -> DecisionKind {
    if !allowed {
        DecisionKind::Blocked
    } else if !violations.is_empty() || score > 0 {
        DecisionKind::Warned
    } else {
        DecisionKind::Allowed
    }
}

impl Gatekeeper {
    pub fn new(
        detectors: Arc<DetectorSet>,
        policies: Arc<PolicyRegistry>,
        confidence: Arc<ConfidenceRegistry>,
        ledger: Arc<LedgerStore>,
        recorder: LearningRecorder,
        config: GatekeeperConfig,
    ) -> Self {
        Self {
            detectors,
            policies,
            confidence,
            ledger,
            recorder,
            config,
        }
    }

    pub fn confidence(&self) -> &Arc<ConfidenceRegistry> {
        &self.confidence
    }

    pub fn policies(&self) -> &Arc<PolicyRegistry> {
        &self.policies
    }

    pub async fn precheck(
        &self,
        prompt: &str,
        options: &GateOptions,
    ) -> GateResult<PrecheckResult> {
        if options.event_type.trim().is_empty() {
            return Err(GateError::Validation("event_type is required".to_string()));
        }
        let now = Utc::now();
        let policy = self.policies.resolve(&options.event_type, options.mode);
        let mode = policy.rule.mode;
        let category = self.policies.category_for(&options.event_type);

        let mut violations = Vec::new();
        let mut usable = None;
        if !options.waive_confidence {
            match options.confidence_ref.as_deref() {
                None => violations.push(Violation::new(
                    ViolationKind::MissingConfidenceDeclaration,
                    "no confidence declaration referenced",
                )),
                Some(id) => {
                    let declaration = self.confidence.get(id, now).ok_or_else(|| {
                        GateError::Validation(format!("unknown confidence reference {id}"))
                    })?;
                    if declaration.status != DeclarationStatus::Declared {
                        violations.push(Violation::new(
                            ViolationKind::MissingConfidenceDeclaration,
                            format!("confidence declaration is {}", declaration.status),
                        ));
                    } else if let Some(required) = policy
                        .rule
                        .required_confidence
                        .filter(|required| !declaration.level.satisfies(*required))
                    {
                        violations.push(Violation::new(
                            ViolationKind::InsufficientConfidence,
                            format!(
                                "declared {} but policy requires {}",
                                declaration.level, required
                            ),
                        ));
                    } else {
                        usable = Some(declaration);
                    }
                }
            }
        }

        violations.extend(self.detectors.scan_prompt(prompt));
        let mut violations = apply_overrides(violations, &policy.rule);
        let mut score = drift_score(&violations, &policy.rule);
        let mut allowed = !blocks(mode, &violations, score, &policy);

        let mut linked = None;
        if allowed {
            if let Some(declaration) = usable {
                match self.confidence.consume(&declaration.id, now)? {
                    Ok(d) => linked = Some(d),
                    Err(status) => {
                        violations.push(Violation::new(
                            ViolationKind::MissingConfidenceDeclaration,
                            format!("confidence declaration is {status}"),
                        ));
                        violations = apply_overrides(violations, &policy.rule);
                        score = drift_score(&violations, &policy.rule);
                        allowed = !blocks(mode, &violations, score, &policy);
                    }
                }
            }
        }

        let mut decision = GateDecision {
            phase: Phase::Pre,
            mode,
            category,
            policy_source: policy.source,
            max_drift_score: policy.rule.max_drift_score,
            decision: decision_kind(allowed, &violations, score),
            violations,
            drift_score: score,
            allowed,
            entry_id: None,
        };
        let confidence_level = linked.as_ref().map(|d| d.level);
        decision.entry_id = self
            .persist(&decision, &options.event_type, confidence_level)
            .await?;
        self.trace(&decision, &options.event_type);

        Ok(PrecheckResult {
            decision,
            event_type: options.event_type.clone(),
            confidence_ref: linked.map(|d| d.id),
            confidence_level,
        })
    }

    pub async fn postcheck(
        &self,
        response: &str,
        precheck: &PrecheckResult,
        options: &GateOptions,
    ) -> GateResult<PostcheckResult> {
        if !precheck.decision.allowed {
            return Err(GateError::Validation(
                "postcheck requires an allowed precheck".to_string(),
            ));
        }

        let policy = self.policies.resolve(&precheck.event_type, options.mode);
        let mode = policy.rule.mode;
        let scan = ResponseScan {
            schema: options.check_schema,
            citations: options.check_citations,
            declared_confidence: precheck.confidence_level,
        };
        let violations =
            apply_overrides(self.detectors.scan_response(response, &scan), &policy.rule);
        let score = drift_score(&violations, &policy.rule);
        let allowed = !blocks(mode, &violations, score, &policy);

        let sanitized_text = options.sanitize.then(|| sanitize(response, &violations));
        let mut decision = GateDecision {
            phase: Phase::Post,
            mode,
            category: self.policies.category_for(&precheck.event_type),
            policy_source: policy.source,
            max_drift_score: policy.rule.max_drift_score,
            decision: decision_kind(allowed, &violations, score),
            violations,
            drift_score: score,
            allowed,
            entry_id: None,
        };
        decision.entry_id = self
            .persist(&decision, &precheck.event_type, precheck.confidence_level)
            .await?;
        self.trace(&decision, &precheck.event_type);

        Ok(PostcheckResult {
            decision,
            sanitized_text,
        })
    }

    async fn persist(
        &self,
        decision: &GateDecision,
        event_type: &str,
        confidence_level: Option<ConfidenceLevel>,
    ) -> GateResult<Option<String>> {
        let fired = !decision.violations.is_empty() || decision.drift_score > 0;
        if !fired && !self.config.persist_clean_decisions {
            return Ok(None);
        }

        let (ledger_event, phase) = match decision.phase {
            Phase::Pre => (PRECHECK_EVENT, "PRE"),
            Phase::Post => (POSTCHECK_EVENT, "POST"),
        };
        let body = json!({
            "event_type": event_type,
            "phase": decision.phase,
            "mode": decision.mode,
            "category": decision.category,
            "policy_source": decision.policy_source,
            "allowed": decision.allowed,
            "decision": decision.decision,
            "drift_score": decision.drift_score,
            "max_drift_score": decision.max_drift_score,
            "violations": decision.violations,
        });
        let entry = self
            .ledger
            .append(
                NewEntry::new(Actor::System, ledger_event, body.to_string())
                    .with_tag(decision.category.clone())
                    .with_tag(phase),
            )
            .await?;

        self.recorder
            .record(NewRecord {
                entry_id: entry.id.clone(),
                event_type: event_type.to_string(),
                category: decision.category.clone(),
                decision: decision.decision,
                violation_kinds: decision.kinds(),
                drift_score: decision.drift_score,
                confidence_level,
            })
            .await?;
        Ok(Some(entry.id))
    }

    fn trace(&self, decision: &GateDecision, event_type: &str) {
        if decision.allowed {
            debug!(
                phase = %decision.phase,
                event_type,
                category = %decision.category,
                mode = %decision.mode,
                drift_score = decision.drift_score,
                violations = decision.violations.len(),
                "Gate passed"
            );
        } else {
            info!(
                phase = %decision.phase,
                event_type,
                category = %decision.category,
                mode = %decision.mode,
                drift_score = decision.drift_score,
                kinds = ?decision.kinds(),
                "Gate blocked"
            );
        }
        if decision.allowed
            && decision.mode == EnforcementMode::Strict
            && decision.drift_score > decision.max_drift_score
        {
            warn!(
                event_type,
                drift_score = decision.drift_score,
                max_drift_score = decision.max_drift_score,
                "Drift over ceiling under the compiled-in default"
            );
        }
    }
}
