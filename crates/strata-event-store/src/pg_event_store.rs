//! `PostgreSQL` implementation of the `EventStore` trait.
//!
//! Streams are spread over `table_count` identically shaped tables. Duplicate
//! detection relies entirely on the two unique constraints of each table: the
//! insert is attempted and a violation is classified by constraint name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, error, instrument};

use strata_core::classify::{ViolationRule, classify_violation};
use strata_core::error::StoreError;
use strata_core::repository::EventStore;
use strata_core::settings::EventTableSettings;
use strata_core::shard::ShardedTable;
use strata_core::stream::{
    AppendOutcome, EventStream, SerializedEvent, check_version, single_aggregate,
};

use crate::fault::{backend_fault, store_error};

const COLUMNS: &str =
    "aggregate_root_id, aggregate_root_type_name, version, command_id, created_on, events";

#[derive(Debug, sqlx::FromRow)]
struct StreamRow {
    aggregate_root_id: String,
    aggregate_root_type_name: String,
    version: i64,
    command_id: String,
    created_on: DateTime<Utc>,
    events: Json<Vec<SerializedEvent>>,
}

impl From<StreamRow> for EventStream {
    fn from(row: StreamRow) -> Self {
        Self {
            aggregate_root_id: row.aggregate_root_id,
            aggregate_root_type_name: row.aggregate_root_type_name,
            version: row.version,
            command_id: row.command_id,
            created_on: row.created_on,
            events: row.events.0,
        }
    }
}

/// PostgreSQL-backed, sharded event store.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
    settings: EventTableSettings,
    sharding: ShardedTable,
}

impl PgEventStore {
    /// Creates a new `PgEventStore`.
    ///
    /// Table and constraint names are interpolated into SQL, so `settings`
    /// must already have passed `StoreSettings::validate`.
    #[must_use]
    pub fn new(pool: PgPool, settings: EventTableSettings) -> Self {
        let sharding = settings.sharding();
        Self {
            pool,
            settings,
            sharding,
        }
    }

    /// Physical table holding `aggregate_root_id`.
    #[must_use]
    pub fn table_for(&self, aggregate_root_id: &str) -> String {
        self.sharding.table_for(aggregate_root_id)
    }

    /// Turns a failed insert into an outcome, or logs and returns the error.
    fn resolve_insert_error(
        &self,
        operation: &'static str,
        aggregate_root_id: &str,
        aggregate_root_type_name: &str,
        err: &sqlx::Error,
    ) -> Result<AppendOutcome, StoreError> {
        let fault = backend_fault(err);
        let version_uq = self
            .sharding
            .constraint_for(&self.settings.version_unique_index_name, aggregate_root_id);
        let command_uq = self
            .sharding
            .constraint_for(&self.settings.command_unique_index_name, aggregate_root_id);
        let rules = [
            ViolationRule::new(version_uq.as_str(), AppendOutcome::DuplicateEvent),
            ViolationRule::new(command_uq.as_str(), AppendOutcome::DuplicateCommand),
        ];

        if let Some(outcome) = classify_violation(&fault, &rules) {
            debug!(operation, aggregate_root_id, ?outcome, "duplicate event stream");
            return Ok(outcome);
        }

        let err = StoreError::from_fault(operation, fault);
        error!(
            operation,
            aggregate_root_id,
            aggregate_root_type_name,
            retryable = err.is_retryable(),
            error = %err,
            "failed to append event streams"
        );
        Err(err)
    }

    /// Logs and classifies a failed read. The enclosing span carries the
    /// remaining arguments.
    fn query_failed(operation: &'static str, aggregate_root_id: &str, err: &sqlx::Error) -> StoreError {
        let err = store_error(operation, err);
        error!(
            operation,
            aggregate_root_id,
            retryable = err.is_retryable(),
            error = %err,
            "failed to query event streams"
        );
        err
    }

    async fn insert_batch(
        &self,
        aggregate_root_id: &str,
        streams: &[EventStream],
    ) -> Result<(), sqlx::Error> {
        let table = self.table_for(aggregate_root_id);
        let mut tx = self.pool.begin().await?;

        // SET does not accept bind parameters.
        let timeout_ms = self.settings.batch_timeout.as_millis();
        sqlx::query(&format!("SET LOCAL statement_timeout = {timeout_ms}"))
            .execute(&mut *tx)
            .await?;

        for chunk in streams.chunks(self.settings.batch_chunk_rows) {
            let mut qb = QueryBuilder::<Postgres>::new(format!("INSERT INTO {table} ({COLUMNS}) "));
            qb.push_values(chunk, |mut b, stream| {
                b.push_bind(&stream.aggregate_root_id);
                b.push_bind(&stream.aggregate_root_type_name);
                b.push_bind(stream.version);
                b.push_bind(&stream.command_id);
                b.push_bind(stream.created_on);
                b.push_bind(Json(&stream.events));
            });
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    fn supports_batch_append(&self) -> bool {
        true
    }

    #[instrument(skip(self, stream), fields(aggregate_root_id = %stream.aggregate_root_id, version = stream.version))]
    async fn append(&self, stream: &EventStream) -> Result<AppendOutcome, StoreError> {
        check_version(stream)?;
        let table = self.table_for(&stream.aggregate_root_id);
        let sql = format!("INSERT INTO {table} ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)");

        let result = sqlx::query(&sql)
            .bind(&stream.aggregate_root_id)
            .bind(&stream.aggregate_root_type_name)
            .bind(stream.version)
            .bind(&stream.command_id)
            .bind(stream.created_on)
            .bind(Json(&stream.events))
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(AppendOutcome::Success),
            Err(err) => self.resolve_insert_error(
                "append",
                &stream.aggregate_root_id,
                &stream.aggregate_root_type_name,
                &err,
            ),
        }
    }

    #[instrument(skip(self, streams), fields(count = streams.len()))]
    async fn batch_append(&self, streams: &[EventStream]) -> Result<AppendOutcome, StoreError> {
        let aggregate_root_id = single_aggregate(streams)?;

        match self.insert_batch(aggregate_root_id, streams).await {
            Ok(()) => Ok(AppendOutcome::Success),
            Err(err) => self.resolve_insert_error(
                "batch_append",
                aggregate_root_id,
                &streams[0].aggregate_root_type_name,
                &err,
            ),
        }
    }

    #[instrument(skip(self))]
    async fn find_by_version(
        &self,
        aggregate_root_id: &str,
        version: i64,
    ) -> Result<Option<EventStream>, StoreError> {
        let table = self.table_for(aggregate_root_id);
        let sql =
            format!("SELECT {COLUMNS} FROM {table} WHERE aggregate_root_id = $1 AND version = $2");

        sqlx::query_as::<_, StreamRow>(&sql)
            .bind(aggregate_root_id)
            .bind(version)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.map(EventStream::from))
            .map_err(|err| Self::query_failed("find_by_version", aggregate_root_id, &err))
    }

    #[instrument(skip(self))]
    async fn find_by_command(
        &self,
        aggregate_root_id: &str,
        command_id: &str,
    ) -> Result<Option<EventStream>, StoreError> {
        let table = self.table_for(aggregate_root_id);
        let sql = format!(
            "SELECT {COLUMNS} FROM {table} WHERE aggregate_root_id = $1 AND command_id = $2"
        );

        sqlx::query_as::<_, StreamRow>(&sql)
            .bind(aggregate_root_id)
            .bind(command_id)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.map(EventStream::from))
            .map_err(|err| Self::query_failed("find_by_command", aggregate_root_id, &err))
    }

    #[instrument(skip(self))]
    async fn query_range(
        &self,
        aggregate_root_id: &str,
        aggregate_root_type_name: &str,
        min_version: i64,
        max_version: i64,
    ) -> Result<Vec<EventStream>, StoreError> {
        let table = self.table_for(aggregate_root_id);
        let sql = format!(
            "SELECT {COLUMNS} FROM {table} \
             WHERE aggregate_root_id = $1 AND version >= $2 AND version <= $3 \
             ORDER BY version"
        );

        sqlx::query_as::<_, StreamRow>(&sql)
            .bind(aggregate_root_id)
            .bind(min_version)
            .bind(max_version)
            .fetch_all(&self.pool)
            .await
            .map(|rows| rows.into_iter().map(EventStream::from).collect())
            .map_err(|err| Self::query_failed("query_range", aggregate_root_id, &err))
    }
}
