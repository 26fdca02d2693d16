//! Store abstractions, one implementation per backing engine.

use std::future::Future;

use async_trait::async_trait;

use crate::command::{CommandAddOutcome, CommandMarker, HandledCommand};
use crate::error::{LockError, StoreError};
use crate::stream::{AppendOutcome, EventStream};

/// Append-only, sharded log of event streams with optimistic concurrency.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Whether `batch_append` is supported by this engine.
    fn supports_batch_append(&self) -> bool;

    /// Appends one event stream.
    ///
    /// A stream whose version or command is already stored for the aggregate
    /// resolves to `DuplicateEvent` or `DuplicateCommand`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidVersion` without touching the backing
    /// store if the stream's version is below 1.
    async fn append(&self, stream: &EventStream) -> Result<AppendOutcome, StoreError>;

    /// Appends several streams of one aggregate as a single unit.
    ///
    /// Either every stream is stored or none is.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidBatch` without touching the backing store
    /// if `streams` is empty or spans several aggregates, and
    /// `StoreError::InvalidVersion` if any stream's version is below 1.
    async fn batch_append(&self, streams: &[EventStream]) -> Result<AppendOutcome, StoreError>;

    /// Finds the stream stored at `version`.
    async fn find_by_version(
        &self,
        aggregate_root_id: &str,
        version: i64,
    ) -> Result<Option<EventStream>, StoreError>;

    /// Finds the stream produced by `command_id`.
    async fn find_by_command(
        &self,
        aggregate_root_id: &str,
        command_id: &str,
    ) -> Result<Option<EventStream>, StoreError>;

    /// Loads streams with `min_version <= version <= max_version`, ordered by
    /// version.
    async fn query_range(
        &self,
        aggregate_root_id: &str,
        aggregate_root_type_name: &str,
        min_version: i64,
        max_version: i64,
    ) -> Result<Vec<EventStream>, StoreError>;
}

/// Records which commands have been handled.
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// Records `command`; an already-recorded command is `DuplicateCommand`.
    async fn record(&self, command: &HandledCommand) -> Result<CommandAddOutcome, StoreError>;

    /// Looks up the marker of `command_id`.
    async fn lookup(&self, command_id: &str) -> Result<Option<CommandMarker>, StoreError>;
}

/// Per-processor, per-aggregate checkpoint of the last published version.
///
/// Advancing never reports a conflict. An attempt that does not directly
/// follow the stored version (a duplicate or out-of-order delivery) is
/// absorbed as a no-op and the stored version never decreases.
#[async_trait]
pub trait PublishedVersionStore: Send + Sync {
    /// Advances the checkpoint to `new_version`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidVersion` if `new_version < 1`, and I/O or
    /// unknown failures from the backing store.
    async fn advance(
        &self,
        processor_name: &str,
        aggregate_root_type_name: &str,
        aggregate_root_id: &str,
        new_version: i64,
    ) -> Result<(), StoreError>;

    /// Returns the published version, or `0` when none is stored.
    async fn get(
        &self,
        processor_name: &str,
        aggregate_root_type_name: &str,
        aggregate_root_id: &str,
    ) -> Result<i64, StoreError>;
}

/// Pessimistic mutual exclusion on named keys.
///
/// Locks are not re-entrant: nesting `with_lock` on the same key from one
/// execution context deadlocks.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Ensures a registration row exists for `key`.
    async fn ensure_registered(&self, key: &str) -> Result<(), StoreError>;

    /// Runs `action` while holding the lock on `key`.
    ///
    /// The action's `Ok` commits the enclosing transaction; its `Err` rolls it
    /// back. The lock is released on every exit path, including when the
    /// returned future is dropped.
    ///
    /// # Errors
    ///
    /// Returns `LockError::Store` if `key` is not registered or the lock
    /// cannot be taken or released, and `LockError::Action` with the
    /// action's own error.
    async fn with_lock<F, Fut, T, E>(&self, key: &str, action: F) -> Result<T, LockError<E>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Send;
}
