//! Translation of `sqlx` errors into engine-neutral faults.

use strata_core::error::{BackendFault, FaultKind, StoreError};

/// SQLSTATE raised when `statement_timeout` cancels a statement.
const QUERY_CANCELED: &str = "57014";

/// Describes `err` as a [`BackendFault`].
pub(crate) fn backend_fault(err: &sqlx::Error) -> BackendFault {
    match err {
        sqlx::Error::Database(db) => {
            let kind = if db.is_unique_violation() {
                FaultKind::UniqueViolation
            } else if db.code().as_deref() == Some(QUERY_CANCELED) {
                FaultKind::Timeout
            } else {
                FaultKind::Database
            };
            BackendFault::new(kind, db.message()).with_constraint(db.constraint())
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => BackendFault::new(FaultKind::Connectivity, err.to_string()),
        sqlx::Error::PoolTimedOut => BackendFault::new(FaultKind::Timeout, err.to_string()),
        _ => BackendFault::new(FaultKind::Other, err.to_string()),
    }
}

/// Classifies `err` as an I/O or unknown store failure.
pub(crate) fn store_error(operation: &'static str, err: &sqlx::Error) -> StoreError {
    StoreError::from_fault(operation, backend_fault(err))
}
