//! Fault injection for the in-memory stores.

use std::sync::Mutex;

use strata_core::error::{BackendFault, FaultKind};

#[derive(Debug)]
struct PlannedFault {
    after_rows: usize,
    fault: BackendFault,
}

/// A one-shot fault waiting to be raised by the next write of a store.
///
/// `fail_after_rows(n, ..)` lets the first `n` rows of the next write be
/// staged before the fault fires, which is how partial batch application is
/// simulated.
#[derive(Debug, Default)]
pub struct FaultPlan {
    planned: Mutex<Option<PlannedFault>>,
}

impl FaultPlan {
    /// Fails the next operation before it writes anything.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_next(&self, fault: BackendFault) {
        self.fail_after_rows(0, fault);
    }

    /// Fails the next write after `rows` rows have been staged.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_after_rows(&self, rows: usize, fault: BackendFault) {
        *self.planned.lock().unwrap() = Some(PlannedFault {
            after_rows: rows,
            fault,
        });
    }

    /// Fails the next operation with a lost connection.
    pub fn disconnect_next(&self) {
        self.fail_next(BackendFault::new(FaultKind::Connectivity, "connection refused"));
    }

    /// Called before staging row `staged` (0-based); consumes and returns
    /// the planned fault once its threshold is reached.
    pub(crate) fn check(&self, staged: usize) -> Result<(), BackendFault> {
        let mut planned = self.planned.lock().unwrap();
        if planned.as_ref().is_some_and(|plan| staged >= plan.after_rows) {
            if let Some(plan) = planned.take() {
                return Err(plan.fault);
            }
        }
        Ok(())
    }
}
