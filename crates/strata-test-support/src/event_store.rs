//! In-memory `EventStore` with the same constraint and sharding behavior as
//! the PostgreSQL store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use strata_core::classify::{ViolationRule, classify_violation};
use strata_core::error::{BackendFault, StoreError};
use strata_core::repository::EventStore;
use strata_core::settings::EventTableSettings;
use strata_core::shard::ShardedTable;
use strata_core::stream::{AppendOutcome, EventStream, check_version, single_aggregate};

use crate::fault::FaultPlan;

/// An event store that keeps each partition as a `Vec` of rows.
///
/// Writes are staged on a copy of the partition and swapped in only when
/// every row was accepted, mirroring a committed transaction.
#[derive(Debug)]
pub struct InMemoryEventStore {
    settings: EventTableSettings,
    sharding: ShardedTable,
    tables: Mutex<HashMap<String, Vec<EventStream>>>,
    faults: FaultPlan,
}

impl InMemoryEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(settings: EventTableSettings) -> Self {
        let sharding = settings.sharding();
        Self {
            settings,
            sharding,
            tables: Mutex::new(HashMap::new()),
            faults: FaultPlan::default(),
        }
    }

    /// Fault plan consulted by every operation.
    #[must_use]
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Returns a snapshot of every stored row, keyed by physical table.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn tables(&self) -> HashMap<String, Vec<EventStream>> {
        self.tables.lock().unwrap().clone()
    }

    /// Number of stored rows across all partitions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.tables.lock().unwrap().values().map(Vec::len).sum()
    }

    fn constraint_names(&self, aggregate_root_id: &str) -> (String, String) {
        (
            self.sharding
                .constraint_for(&self.settings.command_unique_index_name, aggregate_root_id),
            self.sharding
                .constraint_for(&self.settings.version_unique_index_name, aggregate_root_id),
        )
    }

    /// Inserts `streams` into the aggregate's partition as one unit.
    fn insert(&self, aggregate_root_id: &str, streams: &[EventStream]) -> Result<(), BackendFault> {
        let table = self.sharding.table_for(aggregate_root_id);
        let (command_uq, version_uq) = self.constraint_names(aggregate_root_id);

        let mut tables = self.tables.lock().unwrap();
        let mut staged = tables.get(&table).cloned().unwrap_or_default();

        for (index, stream) in streams.iter().enumerate() {
            self.faults.check(index)?;
            let existing = || {
                staged
                    .iter()
                    .filter(|row| row.aggregate_root_id == stream.aggregate_root_id)
            };
            if existing().any(|row| row.command_id == stream.command_id) {
                return Err(BackendFault::unique_violation(command_uq));
            }
            if existing().any(|row| row.version == stream.version) {
                return Err(BackendFault::unique_violation(version_uq));
            }
            staged.push(stream.clone());
        }

        tables.insert(table, staged);
        Ok(())
    }

    fn resolve(
        &self,
        operation: &'static str,
        aggregate_root_id: &str,
        fault: BackendFault,
    ) -> Result<AppendOutcome, StoreError> {
        let (command_uq, version_uq) = self.constraint_names(aggregate_root_id);
        let rules = [
            ViolationRule::new(version_uq.as_str(), AppendOutcome::DuplicateEvent),
            ViolationRule::new(command_uq.as_str(), AppendOutcome::DuplicateCommand),
        ];
        classify_violation(&fault, &rules).ok_or_else(|| StoreError::from_fault(operation, fault))
    }

    fn read(
        &self,
        operation: &'static str,
        aggregate_root_id: &str,
        predicate: impl Fn(&EventStream) -> bool,
    ) -> Result<Vec<EventStream>, StoreError> {
        self.faults
            .check(0)
            .map_err(|fault| StoreError::from_fault(operation, fault))?;

        let table = self.sharding.table_for(aggregate_root_id);
        let mut rows: Vec<EventStream> = self
            .tables
            .lock()
            .unwrap()
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.aggregate_root_id == aggregate_root_id && predicate(*row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|row| row.version);
        Ok(rows)
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new(EventTableSettings::default())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    fn supports_batch_append(&self) -> bool {
        true
    }

    async fn append(&self, stream: &EventStream) -> Result<AppendOutcome, StoreError> {
        check_version(stream)?;
        match self.insert(&stream.aggregate_root_id, std::slice::from_ref(stream)) {
            Ok(()) => Ok(AppendOutcome::Success),
            Err(fault) => self.resolve("append", &stream.aggregate_root_id, fault),
        }
    }

    async fn batch_append(&self, streams: &[EventStream]) -> Result<AppendOutcome, StoreError> {
        let aggregate_root_id = single_aggregate(streams)?;
        match self.insert(aggregate_root_id, streams) {
            Ok(()) => Ok(AppendOutcome::Success),
            Err(fault) => self.resolve("batch_append", aggregate_root_id, fault),
        }
    }

    async fn find_by_version(
        &self,
        aggregate_root_id: &str,
        version: i64,
    ) -> Result<Option<EventStream>, StoreError> {
        let rows = self.read("find_by_version", aggregate_root_id, |row| {
            row.version == version
        })?;
        Ok(rows.into_iter().next())
    }

    async fn find_by_command(
        &self,
        aggregate_root_id: &str,
        command_id: &str,
    ) -> Result<Option<EventStream>, StoreError> {
        let rows = self.read("find_by_command", aggregate_root_id, |row| {
            row.command_id == command_id
        })?;
        Ok(rows.into_iter().next())
    }

    async fn query_range(
        &self,
        aggregate_root_id: &str,
        _aggregate_root_type_name: &str,
        min_version: i64,
        max_version: i64,
    ) -> Result<Vec<EventStream>, StoreError> {
        self.read("query_range", aggregate_root_id, |row| {
            (min_version..=max_version).contains(&row.version)
        })
    }
}
