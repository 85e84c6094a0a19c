//! Covenant shared data model.
//!
//! Every crate in the control plane speaks these types: the detectors emit
//! [`Violation`]s, the gate decides under an [`EnforcementMode`], the ledger
//! records an [`Actor`], and the learning loop labels decisions with an
//! [`Outcome`].
//!
//! All enums are closed. Their wire form is SCREAMING_SNAKE_CASE, which is also
//! the form stored in the policy and learning tables.

#![deny(unsafe_code)]

pub mod enforcement;
pub mod violation;

pub use enforcement::{Actor, ConfidenceLevel, DecisionKind, EnforcementMode, Outcome, Phase};
pub use violation::{DetectorFamily, Severity, Violation, ViolationKind};

use thiserror::Error;

/// Failure to parse one of the closed enums from its wire form.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Paged read window. A `limit` of zero means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
pub struct QueryWindow {
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl QueryWindow {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// Apply the window to an already ordered collection.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        if self.limit == 0 {
            iter.collect()
        } else {
            iter.take(self.limit).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_skips_then_takes() {
        let items: Vec<u32> = (1..=10).collect();
        assert_eq!(QueryWindow::new(3, 2).apply(items.clone()), vec![3, 4, 5]);
        assert_eq!(QueryWindow::new(0, 8).apply(items), vec![9, 10]);
    }
}
