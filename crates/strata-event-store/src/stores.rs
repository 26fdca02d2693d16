//! Wiring of all four stores over one connection pool.

use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use strata_core::clock::{Clock, SystemClock};
use strata_core::settings::{SettingsError, StoreSettings};
use thiserror::Error;

use crate::pg_command_store::PgCommandStore;
use crate::pg_event_store::PgEventStore;
use crate::pg_lock_service::PgLockService;
use crate::pg_published_version_store::PgPublishedVersionStore;

/// Errors raised while connecting the stores.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The settings are invalid.
    #[error("configuration error: {0}")]
    Settings(#[from] SettingsError),

    /// The pool could not be created.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The four PostgreSQL-backed stores, sharing one pool.
#[derive(Debug, Clone)]
pub struct PgStores {
    /// Sharded event log.
    pub events: PgEventStore,
    /// Command dedup store.
    pub commands: PgCommandStore,
    /// Published-version checkpoint store.
    pub published_versions: PgPublishedVersionStore,
    /// Key lock service.
    pub locks: PgLockService,
}

impl PgStores {
    /// Validates `settings` and builds every store over `pool`.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Invalid` if a table name, constraint name, or
    /// batch limit is rejected by `StoreSettings::validate`.
    pub fn new(
        pool: &PgPool,
        settings: &StoreSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self {
            events: PgEventStore::new(pool.clone(), settings.event.clone()),
            commands: PgCommandStore::new(pool.clone(), settings.command.clone(), clock.clone()),
            published_versions: PgPublishedVersionStore::new(
                pool.clone(),
                settings.published_version.clone(),
                clock,
            ),
            locks: PgLockService::new(pool.clone(), settings.lock.clone()),
        })
    }

    /// Validates `settings`, opens a pool on its connection string, and builds
    /// every store with the system clock.
    ///
    /// # Errors
    ///
    /// Returns `ConnectError` if the settings are invalid or the database is
    /// unreachable.
    pub async fn connect(settings: &StoreSettings, max_connections: u32) -> Result<Self, ConnectError> {
        settings.validate()?;

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(&settings.connection_string)
            .await?;

        tracing::info!(
            event_table = %settings.event.table_name,
            table_count = settings.event.table_count,
            "connected event stores"
        );

        Ok(Self::new(&pool, settings, Arc::new(SystemClock))?)
    }
}
