//! Published-version checkpoints of downstream processors.

use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Highest event version a processor has finished for one aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedVersion {
    /// Processor (consumer) name.
    pub processor_name: String,
    /// Aggregate type name; recorded, not part of the key.
    pub aggregate_root_type_name: String,
    /// Aggregate identifier.
    pub aggregate_root_id: String,
    /// Published version, at least 1.
    pub version: i64,
    /// When the checkpoint was last written.
    pub created_on: DateTime<Utc>,
}

/// Write required to advance a checkpoint to a new version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointWrite {
    /// Insert the first checkpoint row at version 1. A uniqueness violation
    /// means another delivery already did so.
    Insert,
    /// Move the row from `from` to `to`, only if it currently holds `from`.
    /// A row in any other state is left untouched.
    Advance {
        /// Required stored version.
        from: i64,
        /// Version written.
        to: i64,
    },
}

impl CheckpointWrite {
    /// Plans the write for `new_version`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidVersion` if `new_version < 1`.
    pub fn plan(new_version: i64) -> Result<Self, StoreError> {
        match new_version {
            1 => Ok(Self::Insert),
            v if v > 1 => Ok(Self::Advance { from: v - 1, to: v }),
            v => Err(StoreError::InvalidVersion(v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_version_is_an_insert() {
        assert_eq!(CheckpointWrite::plan(1).unwrap(), CheckpointWrite::Insert);
    }

    #[test]
    fn test_later_versions_require_predecessor() {
        assert_eq!(
            CheckpointWrite::plan(6).unwrap(),
            CheckpointWrite::Advance { from: 5, to: 6 }
        );
    }

    #[test]
    fn test_non_positive_versions_are_rejected() {
        assert!(matches!(
            CheckpointWrite::plan(0),
            Err(StoreError::InvalidVersion(0))
        ));
        assert!(matches!(
            CheckpointWrite::plan(-3),
            Err(StoreError::InvalidVersion(-3))
        ));
    }
}
