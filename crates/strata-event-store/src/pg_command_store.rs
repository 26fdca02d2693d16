//! `PostgreSQL` implementation of the `CommandStore` trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{debug, error, instrument};

use strata_core::classify::{ViolationRule, classify_violation};
use strata_core::clock::Clock;
use strata_core::command::{CommandAddOutcome, CommandMarker, CommandMessage, HandledCommand};
use strata_core::error::StoreError;
use strata_core::repository::CommandStore;
use strata_core::settings::TableSettings;

use crate::fault::{backend_fault, store_error};

#[derive(Debug, sqlx::FromRow)]
struct CommandRow {
    command_id: String,
    aggregate_root_id: String,
    message_payload: Option<Json<serde_json::Value>>,
    message_type_name: Option<String>,
    created_on: DateTime<Utc>,
}

impl From<CommandRow> for CommandMarker {
    fn from(row: CommandRow) -> Self {
        let message = row
            .message_type_name
            .filter(|type_name| !type_name.is_empty())
            .map(|type_name| CommandMessage {
                type_name,
                payload: row
                    .message_payload
                    .map_or(serde_json::Value::Null, |payload| payload.0),
            });
        Self {
            command: HandledCommand {
                command_id: row.command_id,
                aggregate_root_id: row.aggregate_root_id,
                message,
            },
            created_on: row.created_on,
        }
    }
}

/// PostgreSQL-backed command dedup store.
#[derive(Debug, Clone)]
pub struct PgCommandStore {
    pool: PgPool,
    settings: TableSettings,
    clock: Arc<dyn Clock>,
}

impl PgCommandStore {
    /// Creates a new `PgCommandStore`.
    ///
    /// `settings` must already have passed `StoreSettings::validate`.
    #[must_use]
    pub fn new(pool: PgPool, settings: TableSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            settings,
            clock,
        }
    }
}

#[async_trait]
impl CommandStore for PgCommandStore {
    #[instrument(skip(self, command), fields(command_id = %command.command_id, aggregate_root_id = %command.aggregate_root_id))]
    async fn record(&self, command: &HandledCommand) -> Result<CommandAddOutcome, StoreError> {
        let sql = format!(
            "INSERT INTO {} (command_id, aggregate_root_id, message_payload, message_type_name, created_on) \
             VALUES ($1, $2, $3, $4, $5)",
            self.settings.table_name
        );

        let result = sqlx::query(&sql)
            .bind(&command.command_id)
            .bind(&command.aggregate_root_id)
            .bind(command.message.as_ref().map(|message| Json(&message.payload)))
            .bind(command.message.as_ref().map(|message| message.type_name.as_str()))
            .bind(self.clock.now())
            .execute(&self.pool)
            .await;

        let Err(err) = result else {
            return Ok(CommandAddOutcome::Success);
        };

        let fault = backend_fault(&err);
        let rules = [ViolationRule::new(
            self.settings.unique_index_name.as_str(),
            CommandAddOutcome::DuplicateCommand,
        )];
        if let Some(outcome) = classify_violation(&fault, &rules) {
            debug!("command already recorded");
            return Ok(outcome);
        }

        let err = StoreError::from_fault("record_command", fault);
        error!(
            operation = "record_command",
            command_id = %command.command_id,
            aggregate_root_id = %command.aggregate_root_id,
            retryable = err.is_retryable(),
            error = %err,
            "failed to record handled command"
        );
        Err(err)
    }

    #[instrument(skip(self))]
    async fn lookup(&self, command_id: &str) -> Result<Option<CommandMarker>, StoreError> {
        let sql = format!(
            "SELECT command_id, aggregate_root_id, message_payload, message_type_name, created_on \
             FROM {} WHERE command_id = $1",
            self.settings.table_name
        );

        sqlx::query_as::<_, CommandRow>(&sql)
            .bind(command_id)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.map(CommandMarker::from))
            .map_err(|err| {
                let err = store_error("lookup_command", &err);
                error!(
                    operation = "lookup_command",
                    command_id,
                    retryable = err.is_retryable(),
                    error = %err,
                    "failed to look up handled command"
                );
                err
            })
    }
}
