//! The assembled detector set used by the gate.

use covenant_types::{ConfidenceLevel, DetectorFamily, Violation, ViolationKind};
use tracing::debug;

use crate::error::DetectorError;
use crate::families::{CitationDetector, ConsistencyDetector, PatternDetector, SchemaDetector};
use crate::rule::{PatternRule, RuleSpec};
use crate::{Detector, ScanContext};

/// Which optional families a response scan runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseScan {
    pub schema: bool,
    pub citations: bool,
    pub declared_confidence: Option<ConfidenceLevel>,
}

/// Every detector family, compiled once and shared read-only.
#[derive(Debug, Clone)]
pub struct DetectorSet {
    drift: PatternDetector,
    hallucination: PatternDetector,
    adversarial: PatternDetector,
    schema: SchemaDetector,
    citation: CitationDetector,
    consistency: ConsistencyDetector,
}

impl DetectorSet {
    /// The compiled-in rule set.
    pub fn standard() -> Result<Self, DetectorError> {
        Ok(Self {
            drift: PatternDetector::drift()?,
            hallucination: PatternDetector::hallucination()?,
            adversarial: PatternDetector::adversarial()?,
            schema: SchemaDetector::new()?,
            citation: CitationDetector::new()?,
            consistency: ConsistencyDetector::new()?,
        })
    }

    /// The compiled-in set plus operator rules.
    ///
    /// Extra rules join the family of their kind. Kinds the pipeline computes
    /// rather than matches (schema gaps, mismatches, declaration checks,
    /// missing citations) are rejected.
    pub fn with_rules(extra: &[RuleSpec]) -> Result<Self, DetectorError> {
        let mut set = Self::standard()?;
        for spec in extra {
            set.add_rule(PatternRule::from_spec(spec)?)?;
        }
        Ok(set)
    }

    pub fn add_rule(&mut self, rule: PatternRule) -> Result<(), DetectorError> {
        let kind = rule.kind();
        debug!(rule = rule.id(), kind = %kind, "Registering detector rule");
        match kind.family() {
            DetectorFamily::Drift => self.drift.push(rule),
            DetectorFamily::Hallucination => self.hallucination.push(rule),
            DetectorFamily::Adversarial => self.adversarial.push(rule),
            DetectorFamily::Citation if kind == ViolationKind::CitationClaim => {
                self.citation.push(rule)
            }
            _ => {
                return Err(DetectorError::UnsupportedKind {
                    id: rule.id().to_string(),
                    kind,
                })
            }
        }
        Ok(())
    }

    /// Prompt-side scan: adversarial families only.
    pub fn scan_prompt(&self, prompt: &str) -> Vec<Violation> {
        self.adversarial.detect(prompt, &ScanContext::default())
    }

    /// Response-side scan.
    pub fn scan_response(&self, response: &str, scan: &ResponseScan) -> Vec<Violation> {
        let ctx = ScanContext {
            declared_confidence: scan.declared_confidence,
        };

        let mut detectors: Vec<&dyn Detector> = vec![&self.drift, &self.hallucination];
        if scan.schema {
            detectors.push(&self.schema);
        }
        if scan.citations {
            detectors.push(&self.citation);
        }
        detectors.push(&self.consistency);

        let mut out = Vec::new();
        for detector in detectors {
            let found = detector.detect(response, &ctx);
            if !found.is_empty() {
                debug!(family = ?detector.family(), violations = found.len(), "Detector fired");
            }
            out.extend(found);
        }
        out
    }
}
