//! `PostgreSQL` implementation of the `PublishedVersionStore` trait.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, instrument};

use strata_core::checkpoint::CheckpointWrite;
use strata_core::classify::{ViolationRule, classify_violation};
use strata_core::clock::Clock;
use strata_core::error::StoreError;
use strata_core::repository::PublishedVersionStore;
use strata_core::settings::TableSettings;

use crate::fault::{backend_fault, store_error};

/// PostgreSQL-backed published-version checkpoint store.
#[derive(Debug, Clone)]
pub struct PgPublishedVersionStore {
    pool: PgPool,
    settings: TableSettings,
    clock: Arc<dyn Clock>,
}

impl PgPublishedVersionStore {
    /// Creates a new `PgPublishedVersionStore`.
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

    async fn insert_first(
        &self,
        processor_name: &str,
        aggregate_root_type_name: &str,
        aggregate_root_id: &str,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (processor_name, aggregate_root_type_name, aggregate_root_id, version, created_on) \
             VALUES ($1, $2, $3, 1, $4)",
            self.settings.table_name
        );

        let Err(err) = sqlx::query(&sql)
            .bind(processor_name)
            .bind(aggregate_root_type_name)
            .bind(aggregate_root_id)
            .bind(self.clock.now())
            .execute(&self.pool)
            .await
        else {
            return Ok(());
        };

        let fault = backend_fault(&err);
        let rules = [ViolationRule::new(self.settings.unique_index_name.as_str(), ())];
        if classify_violation(&fault, &rules).is_some() {
            debug!("published version already initialised");
            return Ok(());
        }

        Err(StoreError::from_fault("advance_published_version", fault))
    }

    async fn advance_from(
        &self,
        processor_name: &str,
        aggregate_root_id: &str,
        from: i64,
        to: i64,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET version = $1, created_on = $2 \
             WHERE processor_name = $3 AND aggregate_root_id = $4 AND version = $5",
            self.settings.table_name
        );

        let result = sqlx::query(&sql)
            .bind(to)
            .bind(self.clock.now())
            .bind(processor_name)
            .bind(aggregate_root_id)
            .bind(from)
            .execute(&self.pool)
            .await
            .map_err(|err| store_error("advance_published_version", &err))?;

        if result.rows_affected() == 0 {
            debug!(from, to, "published version not at expected predecessor; left unchanged");
        }
        Ok(())
    }
}

#[async_trait]
impl PublishedVersionStore for PgPublishedVersionStore {
    #[instrument(skip(self))]
    async fn advance(
        &self,
        processor_name: &str,
        aggregate_root_type_name: &str,
        aggregate_root_id: &str,
        new_version: i64,
    ) -> Result<(), StoreError> {
        let result = match CheckpointWrite::plan(new_version)? {
            CheckpointWrite::Insert => {
                self.insert_first(processor_name, aggregate_root_type_name, aggregate_root_id)
                    .await
            }
            CheckpointWrite::Advance { from, to } => {
                self.advance_from(processor_name, aggregate_root_id, from, to)
                    .await
            }
        };

        if let Err(err) = &result {
            error!(
                operation = "advance_published_version",
                processor_name,
                aggregate_root_id,
                aggregate_root_type_name,
                new_version,
                retryable = err.is_retryable(),
                error = %err,
                "failed to advance published version"
            );
        }
        result
    }

    #[instrument(skip(self))]
    async fn get(
        &self,
        processor_name: &str,
        aggregate_root_type_name: &str,
        aggregate_root_id: &str,
    ) -> Result<i64, StoreError> {
        let sql = format!(
            "SELECT version FROM {} WHERE processor_name = $1 AND aggregate_root_id = $2",
            self.settings.table_name
        );

        sqlx::query_scalar::<_, i64>(&sql)
            .bind(processor_name)
            .bind(aggregate_root_id)
            .fetch_optional(&self.pool)
            .await
            .map(|version| version.unwrap_or(0))
            .map_err(|err| {
                let err = store_error("get_published_version", &err);
                error!(
                    operation = "get_published_version",
                    processor_name,
                    aggregate_root_id,
                    aggregate_root_type_name,
                    retryable = err.is_retryable(),
                    error = %err,
                    "failed to read published version"
                );
                err
            })
    }
}
