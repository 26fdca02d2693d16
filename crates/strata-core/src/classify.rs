//! Classification of uniqueness violations into store outcomes.
//!
//! The configured constraint names are the only coupling between the stores
//! and the engine's error reporting: a violation is recognised when the
//! engine names the constraint, or when it only supplies a message that
//! contains the name.

use crate::error::{BackendFault, FaultKind};

/// Maps a constraint name to the outcome its violation stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViolationRule<'a, O> {
    /// Constraint name as reported by the engine.
    pub constraint: &'a str,
    /// Outcome to report when the constraint is violated.
    pub outcome: O,
}

impl<'a, O> ViolationRule<'a, O> {
    /// Creates a rule.
    #[must_use]
    pub const fn new(constraint: &'a str, outcome: O) -> Self {
        Self {
            constraint,
            outcome,
        }
    }

    fn matches(&self, fault: &BackendFault) -> bool {
        match fault.constraint.as_deref() {
            Some(reported) => reported == self.constraint,
            None => fault.message.contains(self.constraint),
        }
    }
}

/// Returns the outcome of the first rule matching `fault`, or `None` when the
/// fault is not a recognised uniqueness violation.
#[must_use]
pub fn classify_violation<O: Copy>(fault: &BackendFault, rules: &[ViolationRule<'_, O>]) -> Option<O> {
    if fault.kind != FaultKind::UniqueViolation {
        return None;
    }
    rules
        .iter()
        .find(|rule| rule.matches(fault))
        .map(|rule| rule.outcome)
}
