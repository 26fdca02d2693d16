//! Failure taxonomy shared by every store.
//!
//! Storage engines translate their native errors into a [`BackendFault`].
//! Uniqueness violations that name a configured constraint are turned into
//! outcomes by [`crate::classify`]; everything else becomes a [`StoreError`].

use std::fmt;

use thiserror::Error;

/// Coarse category of a fault reported by the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A unique index or primary key rejected the write.
    UniqueViolation,
    /// The connection could not be opened, was lost, or the pool is closed.
    Connectivity,
    /// A statement or pool acquisition timed out.
    Timeout,
    /// Any other error reported by the database engine itself.
    Database,
    /// Faults outside the engine: decoding, protocol, configuration.
    Other,
}

/// Engine-neutral description of a backing-store failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFault {
    /// Fault category.
    pub kind: FaultKind,
    /// Name of the violated constraint, when the engine reports one.
    pub constraint: Option<String>,
    /// Engine message.
    pub message: String,
}

impl BackendFault {
    /// Creates a fault without a constraint name.
    #[must_use]
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            constraint: None,
            message: message.into(),
        }
    }

    /// Creates a uniqueness violation naming `constraint`.
    #[must_use]
    pub fn unique_violation(constraint: impl Into<String>) -> Self {
        let constraint = constraint.into();
        Self {
            kind: FaultKind::UniqueViolation,
            message: format!("duplicate key value violates unique constraint \"{constraint}\""),
            constraint: Some(constraint),
        }
    }

    /// Attaches the constraint name reported by the engine.
    #[must_use]
    pub fn with_constraint(mut self, constraint: Option<&str>) -> Self {
        self.constraint = constraint.map(str::to_owned);
        self
    }
}

impl fmt::Display for BackendFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some(constraint) => write!(f, "{:?} on {constraint}: {}", self.kind, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for BackendFault {}

/// Error returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient I/O or engine failure; the caller may retry.
    #[error("{operation} failed with an I/O error: {source}")]
    Io {
        /// Store operation that failed.
        operation: &'static str,
        /// Underlying fault.
        source: BackendFault,
    },

    /// Unexpected failure; retrying will not help.
    #[error("{operation} failed unexpectedly: {source}")]
    Unknown {
        /// Store operation that failed.
        operation: &'static str,
        /// Underlying fault.
        source: BackendFault,
    },

    /// A batch append was rejected before touching the backing store.
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// An event stream or checkpoint version below 1 was supplied.
    #[error("invalid version: {0}, versions start at 1")]
    InvalidVersion(i64),

    /// `with_lock` was called for a key that has no registration row.
    #[error("lock key not registered: {0}")]
    LockKeyNotRegistered(String),
}

impl StoreError {
    /// Classifies an unhandled fault as I/O or unknown.
    ///
    /// Engine-reported errors count as I/O, matching what callers can
    /// reasonably retry. Unclassified uniqueness violations and non-engine
    /// faults are unknown.
    #[must_use]
    pub fn from_fault(operation: &'static str, source: BackendFault) -> Self {
        match source.kind {
            FaultKind::Connectivity | FaultKind::Timeout | FaultKind::Database => {
                Self::Io { operation, source }
            }
            FaultKind::UniqueViolation | FaultKind::Other => Self::Unknown { operation, source },
        }
    }

    /// Returns `true` when the caller may retry the operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Error returned by `LockService::with_lock`.
#[derive(Debug, Error)]
pub enum LockError<E> {
    /// Acquiring, committing, or releasing the lock failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The guarded action failed; its changes were rolled back.
    #[error("locked action failed: {0}")]
    Action(E),
}
