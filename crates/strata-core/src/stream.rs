//! Event stream entries: the unit persisted by the event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// One serialized domain event. The payload is opaque to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Type name for deserialization routing.
    pub event_type: String,
    /// Serialized event body.
    pub payload: serde_json::Value,
}

/// The events produced by one command for one aggregate, stored as a single
/// versioned row.
#[derive(Debug, Clone, PartialEq)]
pub struct EventStream {
    /// Aggregate this stream belongs to; also selects the partition.
    pub aggregate_root_id: String,
    /// Aggregate type name.
    pub aggregate_root_type_name: String,
    /// Version within the aggregate, starting at 1.
    pub version: i64,
    /// Command that produced the events.
    pub command_id: String,
    /// Timestamp of the command handling.
    pub created_on: DateTime<Utc>,
    /// Events in the order they were raised.
    pub events: Vec<SerializedEvent>,
}

/// Result of appending event streams.
///
/// Both duplicate variants are idempotent outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The row was written.
    Success,
    /// Another writer already committed this version of the aggregate.
    /// Re-read the aggregate and re-apply the command.
    DuplicateEvent,
    /// This command already produced a stream for the aggregate.
    /// Skip it; `find_by_command` returns the stored events.
    DuplicateCommand,
}

/// Rejects a stream whose version is below 1.
///
/// # Errors
///
/// Returns `StoreError::InvalidVersion` with the offending version.
pub fn check_version(stream: &EventStream) -> Result<(), StoreError> {
    if stream.version < 1 {
        return Err(StoreError::InvalidVersion(stream.version));
    }
    Ok(())
}

/// Checks the preconditions of a batch append and returns the single
/// aggregate it targets.
///
/// # Errors
///
/// Returns `StoreError::InvalidBatch` if `streams` is empty or spans more
/// than one aggregate, and `StoreError::InvalidVersion` if any stream has a
/// version below 1.
pub fn single_aggregate(streams: &[EventStream]) -> Result<&str, StoreError> {
    let (first, rest) = streams
        .split_first()
        .ok_or_else(|| StoreError::InvalidBatch("event streams cannot be empty".into()))?;
    streams.iter().try_for_each(check_version)?;

    if let Some(other) = rest
        .iter()
        .find(|stream| stream.aggregate_root_id != first.aggregate_root_id)
    {
        return Err(StoreError::InvalidBatch(format!(
            "batch append supports one aggregate only, got {} and {}",
            first.aggregate_root_id, other.aggregate_root_id
        )));
    }

    Ok(&first.aggregate_root_id)
}
