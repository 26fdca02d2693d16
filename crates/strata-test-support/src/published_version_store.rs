//! In-memory `PublishedVersionStore`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use strata_core::checkpoint::{CheckpointWrite, PublishedVersion};
use strata_core::classify::{ViolationRule, classify_violation};
use strata_core::clock::Clock;
use strata_core::error::{BackendFault, StoreError};
use strata_core::repository::PublishedVersionStore;
use strata_core::settings::TableSettings;
use tracing::debug;

use crate::fault::FaultPlan;

type CheckpointKey = (String, String);

/// Checkpoints keyed by `(processor_name, aggregate_root_id)`.
#[derive(Debug)]
pub struct InMemoryPublishedVersionStore {
    settings: TableSettings,
    clock: Arc<dyn Clock>,
    checkpoints: Mutex<HashMap<CheckpointKey, PublishedVersion>>,
    faults: FaultPlan,
}

impl InMemoryPublishedVersionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(settings: TableSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            checkpoints: Mutex::new(HashMap::new()),
            faults: FaultPlan::default(),
        }
    }

    /// Fault plan consulted by every operation.
    #[must_use]
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Returns the stored checkpoint row, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn checkpoint(&self, processor_name: &str, aggregate_root_id: &str) -> Option<PublishedVersion> {
        self.checkpoints
            .lock()
            .unwrap()
            .get(&(processor_name.to_owned(), aggregate_root_id.to_owned()))
            .cloned()
    }

    fn apply(
        &self,
        write: CheckpointWrite,
        processor_name: &str,
        aggregate_root_type_name: &str,
        aggregate_root_id: &str,
    ) -> Result<(), BackendFault> {
        self.faults.check(0)?;
        let key = (processor_name.to_owned(), aggregate_root_id.to_owned());
        let mut checkpoints = self.checkpoints.lock().unwrap();

        match write {
            CheckpointWrite::Insert => {
                if checkpoints.contains_key(&key) {
                    return Err(BackendFault::unique_violation(
                        self.settings.unique_index_name.clone(),
                    ));
                }
                checkpoints.insert(
                    key,
                    PublishedVersion {
                        processor_name: processor_name.to_owned(),
                        aggregate_root_type_name: aggregate_root_type_name.to_owned(),
                        aggregate_root_id: aggregate_root_id.to_owned(),
                        version: 1,
                        created_on: self.clock.now(),
                    },
                );
            }
            CheckpointWrite::Advance { from, to } => {
                match checkpoints.get_mut(&key) {
                    Some(row) if row.version == from => {
                        row.version = to;
                        row.created_on = self.clock.now();
                    }
                    _ => debug!(from, to, "published version not at expected predecessor; left unchanged"),
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PublishedVersionStore for InMemoryPublishedVersionStore {
    async fn advance(
        &self,
        processor_name: &str,
        aggregate_root_type_name: &str,
        aggregate_root_id: &str,
        new_version: i64,
    ) -> Result<(), StoreError> {
        let write = CheckpointWrite::plan(new_version)?;
        let Err(fault) = self.apply(write, processor_name, aggregate_root_type_name, aggregate_root_id)
        else {
            return Ok(());
        };
        let rules = [ViolationRule::new(self.settings.unique_index_name.as_str(), ())];
        classify_violation(&fault, &rules)
            .ok_or_else(|| StoreError::from_fault("advance_published_version", fault))
    }

    async fn get(
        &self,
        processor_name: &str,
        _aggregate_root_type_name: &str,
        aggregate_root_id: &str,
    ) -> Result<i64, StoreError> {
        self.faults
            .check(0)
            .map_err(|fault| StoreError::from_fault("get_published_version", fault))?;
        Ok(self
            .checkpoint(processor_name, aggregate_root_id)
            .map_or(0, |row| row.version))
    }
}
