//! Store settings.
//!
//! A `StoreSettings` value is built once (from defaults, the environment, or
//! by hand) and passed to each store constructor. Constraint names must match
//! what the engine reports on a uniqueness violation, otherwise duplicates
//! degrade to unknown failures.

use std::time::Duration;

use thiserror::Error;

use crate::shard::ShardedTable;

/// Longest identifier PostgreSQL stores without truncation.
pub const MAX_IDENTIFIER_BYTES: usize = 63;

/// Upper bound of `statement_timeout`, in milliseconds (`i32::MAX`).
pub const MAX_STATEMENT_TIMEOUT_MS: u128 = 2_147_483_647;

/// Largest batch chunk: six bind parameters per row must stay below the
/// protocol limit of 65535.
pub const MAX_BATCH_CHUNK_ROWS: usize = 10_000;

/// Errors raised while building or validating settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// A required variable is absent.
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    /// A variable could not be parsed.
    #[error("{name} is invalid: {reason}")]
    Invalid {
        /// Variable or field name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Settings of the sharded event stream relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTableSettings {
    /// Base table name; partitions are named `{table_name}_{index}`.
    pub table_name: String,
    /// Number of partitions. `0` or `1` keeps a single table.
    pub table_count: u32,
    /// Constraint over `(aggregate_root_id, version)`.
    pub version_unique_index_name: String,
    /// Constraint over `(aggregate_root_id, command_id)`.
    pub command_unique_index_name: String,
    /// Statement timeout applied to batch appends.
    pub batch_timeout: Duration,
    /// Rows per `INSERT` statement of a batch append.
    pub batch_chunk_rows: usize,
}

impl EventTableSettings {
    /// Partition naming scheme for these settings.
    #[must_use]
    pub fn sharding(&self) -> ShardedTable {
        ShardedTable::new(self.table_name.clone(), self.table_count)
    }
}

impl Default for EventTableSettings {
    fn default() -> Self {
        Self {
            table_name: "event_stream".to_owned(),
            table_count: 1,
            version_unique_index_name: "event_stream_uq_version".to_owned(),
            command_unique_index_name: "event_stream_uq_command".to_owned(),
            batch_timeout: Duration::from_secs(60),
            batch_chunk_rows: 1000,
        }
    }
}

/// Settings of a relation guarded by one uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSettings {
    /// Table name.
    pub table_name: String,
    /// Constraint whose violation is an expected outcome.
    pub unique_index_name: String,
}

/// Settings of the lock-key relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTableSettings {
    /// Table name.
    pub table_name: String,
}

/// Settings for all four stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Connection string of the backing database.
    pub connection_string: String,
    /// Event stream relation.
    pub event: EventTableSettings,
    /// Command dedup relation.
    pub command: TableSettings,
    /// Published-version checkpoint relation.
    pub published_version: TableSettings,
    /// Lock-key relation.
    pub lock: LockTableSettings,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            event: EventTableSettings::default(),
            command: TableSettings {
                table_name: "command".to_owned(),
                unique_index_name: "command_uq_id".to_owned(),
            },
            published_version: TableSettings {
                table_name: "published_version".to_owned(),
                unique_index_name: "published_version_uq".to_owned(),
            },
            lock: LockTableSettings {
                table_name: "lock_key".to_owned(),
            },
        }
    }
}

impl StoreSettings {
    /// Reads settings from the process environment.
    ///
    /// `DATABASE_URL` is required. `STRATA_EVENT_TABLE`,
    /// `STRATA_EVENT_TABLE_COUNT`, `STRATA_BATCH_TIMEOUT_SECS` and
    /// `STRATA_BATCH_CHUNK_ROWS` override the defaults.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if a variable is missing or malformed, or the
    /// resulting settings fail [`StoreSettings::validate`].
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`StoreSettings::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let mut settings = Self {
            connection_string: lookup("DATABASE_URL").ok_or(SettingsError::Missing("DATABASE_URL"))?,
            ..Self::default()
        };

        if let Some(table_name) = lookup("STRATA_EVENT_TABLE") {
            settings.event.version_unique_index_name = format!("{table_name}_uq_version");
            settings.event.command_unique_index_name = format!("{table_name}_uq_command");
            settings.event.table_name = table_name;
        }
        if let Some(count) = lookup("STRATA_EVENT_TABLE_COUNT") {
            settings.event.table_count = count.parse().map_err(|e| SettingsError::Invalid {
                name: "STRATA_EVENT_TABLE_COUNT",
                reason: format!("must be a valid u32: {e}"),
            })?;
        }
        if let Some(secs) = lookup("STRATA_BATCH_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|e| SettingsError::Invalid {
                name: "STRATA_BATCH_TIMEOUT_SECS",
                reason: format!("must be a valid u64: {e}"),
            })?;
            settings.event.batch_timeout = Duration::from_secs(secs);
        }
        if let Some(rows) = lookup("STRATA_BATCH_CHUNK_ROWS") {
            settings.event.batch_chunk_rows = rows.parse().map_err(|e| SettingsError::Invalid {
                name: "STRATA_BATCH_CHUNK_ROWS",
                reason: format!("must be a valid usize: {e}"),
            })?;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Checks every name and the batch limits.
    ///
    /// Names are interpolated into SQL text, so anything beyond
    /// `[A-Za-z_][A-Za-z0-9_]*` is rejected. PostgreSQL truncates identifiers
    /// longer than 63 bytes; the longest partition-suffixed form of each event
    /// relation name must fit within that. The batch
    /// timeout must be a whole, positive number of milliseconds that fits
    /// `statement_timeout`, and the chunk size must keep one statement below
    /// the bind parameter limit.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let sharding = self.event.sharding();
        let names: [(&'static str, &str, bool); 8] = [
            ("event.table_name", &self.event.table_name, true),
            ("event.version_unique_index_name", &self.event.version_unique_index_name, true),
            ("event.command_unique_index_name", &self.event.command_unique_index_name, true),
            ("command.table_name", &self.command.table_name, false),
            ("command.unique_index_name", &self.command.unique_index_name, false),
            ("published_version.table_name", &self.published_version.table_name, false),
            ("published_version.unique_index_name", &self.published_version.unique_index_name, false),
            ("lock.table_name", &self.lock.table_name, false),
        ];
        for (name, value, sharded) in names {
            if !is_identifier(value) {
                return Err(SettingsError::Invalid {
                    name,
                    reason: format!("{value:?} is not a plain SQL identifier"),
                });
            }
            let physical = if sharded {
                sharding.longest_suffixed(value)
            } else {
                value.to_owned()
            };
            if physical.len() > MAX_IDENTIFIER_BYTES {
                return Err(SettingsError::Invalid {
                    name,
                    reason: format!(
                        "{physical:?} is longer than {MAX_IDENTIFIER_BYTES} bytes"
                    ),
                });
            }
        }

        let timeout_ms = self.event.batch_timeout.as_millis();
        if timeout_ms == 0 || timeout_ms > MAX_STATEMENT_TIMEOUT_MS {
            return Err(SettingsError::Invalid {
                name: "event.batch_timeout",
                reason: format!(
                    "must be between 1 and {MAX_STATEMENT_TIMEOUT_MS} milliseconds, got {timeout_ms}"
                ),
            });
        }
        if !(1..=MAX_BATCH_CHUNK_ROWS).contains(&self.event.batch_chunk_rows) {
            return Err(SettingsError::Invalid {
                name: "event.batch_chunk_rows",
                reason: format!(
                    "must be between 1 and {MAX_BATCH_CHUNK_ROWS}, got {}",
                    self.event.batch_chunk_rows
                ),
            });
        }
        Ok(())
    }
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
