//! In-memory `CommandStore`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use strata_core::classify::{ViolationRule, classify_violation};
use strata_core::clock::Clock;
use strata_core::command::{CommandAddOutcome, CommandMarker, HandledCommand};
use strata_core::error::{BackendFault, StoreError};
use strata_core::repository::CommandStore;
use strata_core::settings::TableSettings;

use crate::fault::FaultPlan;

/// Command markers keyed by command id.
#[derive(Debug)]
pub struct InMemoryCommandStore {
    settings: TableSettings,
    clock: Arc<dyn Clock>,
    markers: Mutex<HashMap<String, CommandMarker>>,
    faults: FaultPlan,
}

impl InMemoryCommandStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(settings: TableSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            markers: Mutex::new(HashMap::new()),
            faults: FaultPlan::default(),
        }
    }

    /// Fault plan consulted by every operation.
    #[must_use]
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    fn insert(&self, command: &HandledCommand) -> Result<(), BackendFault> {
        self.faults.check(0)?;
        let mut markers = self.markers.lock().unwrap();
        if markers.contains_key(&command.command_id) {
            return Err(BackendFault::unique_violation(
                self.settings.unique_index_name.clone(),
            ));
        }
        markers.insert(
            command.command_id.clone(),
            CommandMarker {
                command: command.clone(),
                created_on: self.clock.now(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl CommandStore for InMemoryCommandStore {
    async fn record(&self, command: &HandledCommand) -> Result<CommandAddOutcome, StoreError> {
        let Err(fault) = self.insert(command) else {
            return Ok(CommandAddOutcome::Success);
        };
        let rules = [ViolationRule::new(
            self.settings.unique_index_name.as_str(),
            CommandAddOutcome::DuplicateCommand,
        )];
        classify_violation(&fault, &rules)
            .ok_or_else(|| StoreError::from_fault("record_command", fault))
    }

    async fn lookup(&self, command_id: &str) -> Result<Option<CommandMarker>, StoreError> {
        self.faults
            .check(0)
            .map_err(|fault| StoreError::from_fault("lookup_command", fault))?;
        Ok(self.markers.lock().unwrap().get(command_id).cloned())
    }
}
