//! `PostgreSQL` implementation of the `LockService` trait.
//!
//! A lock is a `SELECT ... FOR UPDATE` on the key's registration row, held
//! for the lifetime of a transaction. `sqlx` rolls back a transaction that is
//! dropped without commit, so an early return, a panic in the action, or a
//! cancelled future all release the row lock.

use std::future::Future;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};

use strata_core::error::{LockError, StoreError};
use strata_core::repository::LockService;
use strata_core::settings::LockTableSettings;

use crate::fault::store_error;

/// PostgreSQL-backed pessimistic key lock.
#[derive(Debug, Clone)]
pub struct PgLockService {
    pool: PgPool,
    settings: LockTableSettings,
}

impl PgLockService {
    /// Creates a new `PgLockService`.
    ///
    /// `settings` must already have passed `StoreSettings::validate`.
    #[must_use]
    pub fn new(pool: PgPool, settings: LockTableSettings) -> Self {
        Self { pool, settings }
    }

    fn failed(operation: &'static str, key: &str, err: &sqlx::Error) -> StoreError {
        let err = store_error(operation, err);
        error!(
            operation,
            key,
            retryable = err.is_retryable(),
            error = %err,
            "lock service operation failed"
        );
        err
    }
}

#[async_trait]
impl LockService for PgLockService {
    #[instrument(skip(self))]
    async fn ensure_registered(&self, key: &str) -> Result<(), StoreError> {
        let table = &self.settings.table_name;

        let select = format!("SELECT name FROM {table} WHERE name = $1");
        let existing: Option<String> = sqlx::query_scalar(&select)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| Self::failed("ensure_lock_key", key, &err))?;
        if existing.is_some() {
            return Ok(());
        }

        // A concurrent registration may win between the read and the insert.
        let insert = format!("INSERT INTO {table} (name) VALUES ($1) ON CONFLICT (name) DO NOTHING");
        sqlx::query(&insert)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|err| Self::failed("ensure_lock_key", key, &err))?;

        debug!("lock key registered");
        Ok(())
    }

    #[instrument(skip(self, action))]
    async fn with_lock<F, Fut, T, E>(&self, key: &str, action: F) -> Result<T, LockError<E>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Send,
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| Self::failed("with_lock", key, &err))?;

        let select = format!("SELECT name FROM {} WHERE name = $1 FOR UPDATE", self.settings.table_name);
        let locked: Option<String> = sqlx::query_scalar(&select)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|err| Self::failed("with_lock", key, &err))?;
        if locked.is_none() {
            return Err(StoreError::LockKeyNotRegistered(key.to_owned()).into());
        }

        match action().await {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|err| Self::failed("with_lock", key, &err))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    // The connection is discarded and the lock dies with it.
                    warn!(key, error = %rollback_err, "rollback after failed locked action failed");
                }
                Err(LockError::Action(err))
            }
        }
    }
}
