//! Integration tests for `PgEventStore`.

use chrono::{TimeZone, Utc};
use sqlx::PgPool;
use strata_core::error::StoreError;
use strata_core::repository::EventStore;
use strata_core::settings::{EventTableSettings, StoreSettings};
use strata_core::stream::{AppendOutcome, EventStream, SerializedEvent};
use strata_event_store::pg_event_store::PgEventStore;
use strata_event_store::schema;
use uuid::Uuid;

/// Helper to build an `EventStream` with two events.
fn make_stream(aggregate_root_id: &str, version: i64, command_id: &str) -> EventStream {
    EventStream {
        aggregate_root_id: aggregate_root_id.to_string(),
        aggregate_root_type_name: "Order".to_string(),
        version,
        command_id: command_id.to_string(),
        created_on: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        events: vec![
            SerializedEvent {
                event_id: Uuid::new_v4(),
                event_type: "OrderPlaced".to_string(),
                payload: serde_json::json!({ "version": version }),
            },
            SerializedEvent {
                event_id: Uuid::new_v4(),
                event_type: "OrderPriced".to_string(),
                payload: serde_json::json!({ "total": 1250 }),
            },
        ],
    }
}

fn default_store(pool: PgPool) -> PgEventStore {
    PgEventStore::new(pool, EventTableSettings::default())
}

fn sharded_settings() -> StoreSettings {
    StoreSettings {
        event: EventTableSettings {
            table_name: "sharded_stream".to_string(),
            table_count: 4,
            version_unique_index_name: "sharded_stream_uq_version".to_string(),
            command_unique_index_name: "sharded_stream_uq_command".to_string(),
            ..EventTableSettings::default()
        },
        ..StoreSettings::default()
    }
}

async fn count_rows(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

// --- append + find round-trip ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_append_and_find_by_version(pool: PgPool) {
    let store = default_store(pool);
    let stream = make_stream("order-1", 1, "cmd-1");

    let outcome = store.append(&stream).await.unwrap();

    assert_eq!(outcome, AppendOutcome::Success);
    let loaded = store.find_by_version("order-1", 1).await.unwrap();
    assert_eq!(loaded, Some(stream));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_by_command_returns_stored_stream(pool: PgPool) {
    let store = default_store(pool);
    let stream = make_stream("order-1", 1, "cmd-1");
    store.append(&stream).await.unwrap();

    let loaded = store.find_by_command("order-1", "cmd-1").await.unwrap();

    assert_eq!(loaded, Some(stream));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_returns_none_for_nonexistent_aggregate(pool: PgPool) {
    let store = default_store(pool);

    assert_eq!(store.find_by_version("missing", 1).await.unwrap(), None);
    assert_eq!(store.find_by_command("missing", "cmd-1").await.unwrap(), None);
}

// --- duplicates ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_same_version_is_duplicate_event(pool: PgPool) {
    let store = default_store(pool.clone());
    store.append(&make_stream("order-1", 1, "cmd-1")).await.unwrap();

    let outcome = store.append(&make_stream("order-1", 1, "cmd-2")).await.unwrap();

    assert_eq!(outcome, AppendOutcome::DuplicateEvent);
    assert_eq!(count_rows(&pool, "event_stream").await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_same_command_is_duplicate_command(pool: PgPool) {
    let store = default_store(pool.clone());
    store.append(&make_stream("order-1", 1, "cmd-1")).await.unwrap();

    let outcome = store.append(&make_stream("order-1", 2, "cmd-1")).await.unwrap();

    assert_eq!(outcome, AppendOutcome::DuplicateCommand);
    assert_eq!(count_rows(&pool, "event_stream").await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_identical_reappend_is_duplicate_command(pool: PgPool) {
    let store = default_store(pool);
    let stream = make_stream("order-1", 1, "cmd-1");
    store.append(&stream).await.unwrap();

    let outcome = store.append(&stream).await.unwrap();

    assert_eq!(outcome, AppendOutcome::DuplicateCommand);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_same_version_on_another_aggregate_succeeds(pool: PgPool) {
    let store = default_store(pool);
    store.append(&make_stream("order-1", 1, "cmd-1")).await.unwrap();

    let outcome = store.append(&make_stream("order-2", 1, "cmd-1")).await.unwrap();

    assert_eq!(outcome, AppendOutcome::Success);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_append_rejects_version_below_one(pool: PgPool) {
    let store = default_store(pool.clone());

    let zero = store.append(&make_stream("order-1", 0, "cmd-1")).await;
    let negative = store.append(&make_stream("order-1", -1, "cmd-2")).await;

    assert!(matches!(zero, Err(StoreError::InvalidVersion(0))));
    assert!(matches!(negative, Err(StoreError::InvalidVersion(-1))));
    assert_eq!(count_rows(&pool, "event_stream").await, 0);
}

// --- batch append ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_store_supports_batch_append(pool: PgPool) {
    assert!(default_store(pool).supports_batch_append());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_batch_append_stores_all_streams(pool: PgPool) {
    let store = default_store(pool);
    let batch = vec![
        make_stream("order-1", 1, "cmd-1"),
        make_stream("order-1", 2, "cmd-2"),
        make_stream("order-1", 3, "cmd-3"),
    ];

    let outcome = store.batch_append(&batch).await.unwrap();

    assert_eq!(outcome, AppendOutcome::Success);
    let loaded = store.query_range("order-1", "Order", 1, 3).await.unwrap();
    assert_eq!(loaded, batch);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_batch_append_with_duplicate_last_row_rolls_back(pool: PgPool) {
    let store = default_store(pool.clone());
    store.append(&make_stream("order-1", 3, "cmd-0")).await.unwrap();
    let batch = vec![
        make_stream("order-1", 1, "cmd-1"),
        make_stream("order-1", 2, "cmd-2"),
        make_stream("order-1", 3, "cmd-3"),
    ];

    let outcome = store.batch_append(&batch).await.unwrap();

    assert_eq!(outcome, AppendOutcome::DuplicateEvent);
    assert_eq!(count_rows(&pool, "event_stream").await, 1);
    assert_eq!(store.find_by_version("order-1", 1).await.unwrap(), None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_batch_append_rejects_mixed_aggregates(pool: PgPool) {
    let store = default_store(pool.clone());
    let batch = vec![
        make_stream("order-1", 1, "cmd-1"),
        make_stream("order-2", 1, "cmd-2"),
    ];

    let result = store.batch_append(&batch).await;

    assert!(matches!(result, Err(StoreError::InvalidBatch(_))));
    assert_eq!(count_rows(&pool, "event_stream").await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_batch_append_rejects_version_below_one(pool: PgPool) {
    let store = default_store(pool.clone());
    let batch = vec![
        make_stream("order-1", 1, "cmd-1"),
        make_stream("order-1", 0, "cmd-2"),
    ];

    let result = store.batch_append(&batch).await;

    assert!(matches!(result, Err(StoreError::InvalidVersion(0))));
    assert_eq!(count_rows(&pool, "event_stream").await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_batch_append_spans_several_insert_chunks(pool: PgPool) {
    let store = PgEventStore::new(
        pool.clone(),
        EventTableSettings {
            batch_chunk_rows: 2,
            ..EventTableSettings::default()
        },
    );
    let batch: Vec<EventStream> = (1..=5)
        .map(|version| make_stream("order-1", version, &format!("cmd-{version}")))
        .collect();

    store.batch_append(&batch).await.unwrap();

    assert_eq!(count_rows(&pool, "event_stream").await, 5);
    assert_eq!(store.query_range("order-1", "Order", 1, 5).await.unwrap(), batch);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_duplicate_in_later_chunk_rolls_back_earlier_chunks(pool: PgPool) {
    let store = PgEventStore::new(
        pool.clone(),
        EventTableSettings {
            batch_chunk_rows: 2,
            ..EventTableSettings::default()
        },
    );
    store.append(&make_stream("order-1", 5, "cmd-0")).await.unwrap();
    let batch: Vec<EventStream> = (1..=5)
        .map(|version| make_stream("order-1", version, &format!("cmd-{version}")))
        .collect();

    let outcome = store.batch_append(&batch).await.unwrap();

    assert_eq!(outcome, AppendOutcome::DuplicateEvent);
    assert_eq!(count_rows(&pool, "event_stream").await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_batch_append_rejects_empty_batch(pool: PgPool) {
    let store = default_store(pool);

    let result = store.batch_append(&[]).await;

    assert!(matches!(result, Err(StoreError::InvalidBatch(_))));
}

// --- range queries ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_query_range_is_inclusive_and_ordered(pool: PgPool) {
    let store = default_store(pool);
    for version in [3, 1, 5, 2, 4] {
        store
            .append(&make_stream("order-1", version, &format!("cmd-{version}")))
            .await
            .unwrap();
    }

    let loaded = store.query_range("order-1", "Order", 2, 4).await.unwrap();

    let versions: Vec<i64> = loaded.iter().map(|stream| stream.version).collect();
    assert_eq!(versions, vec![2, 3, 4]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_query_range_excludes_other_aggregates(pool: PgPool) {
    let store = default_store(pool);
    store.append(&make_stream("order-1", 1, "cmd-1")).await.unwrap();
    store.append(&make_stream("order-2", 1, "cmd-1")).await.unwrap();

    let loaded = store.query_range("order-1", "Order", 1, 10).await.unwrap();

    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].aggregate_root_id, "order-1");
}

// --- sharding ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_sharded_store_writes_to_hashed_partition(pool: PgPool) {
    let settings = sharded_settings();
    schema::install(&pool, &settings).await.unwrap();
    let store = PgEventStore::new(pool.clone(), settings.event.clone());

    store.append(&make_stream("order-1", 1, "cmd-1")).await.unwrap();
    store.append(&make_stream("5f1c2b7e9a", 1, "cmd-1")).await.unwrap();

    assert_eq!(store.table_for("order-1"), "sharded_stream_3");
    assert_eq!(count_rows(&pool, "sharded_stream_3").await, 1);
    assert_eq!(count_rows(&pool, "sharded_stream_0").await, 1);
    assert_eq!(count_rows(&pool, "sharded_stream_1").await, 0);
    assert_eq!(count_rows(&pool, "sharded_stream_2").await, 0);
    assert_eq!(
        store.find_by_version("order-1", 1).await.unwrap().unwrap().command_id,
        "cmd-1"
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_sharded_store_classifies_suffixed_constraints(pool: PgPool) {
    let settings = sharded_settings();
    schema::install(&pool, &settings).await.unwrap();
    let store = PgEventStore::new(pool, settings.event.clone());
    store.append(&make_stream("order-1", 1, "cmd-1")).await.unwrap();

    assert_eq!(
        store.append(&make_stream("order-1", 1, "cmd-2")).await.unwrap(),
        AppendOutcome::DuplicateEvent
    );
    assert_eq!(
        store.append(&make_stream("order-1", 2, "cmd-1")).await.unwrap(),
        AppendOutcome::DuplicateCommand
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_install_is_idempotent(pool: PgPool) {
    let settings = sharded_settings();

    schema::install(&pool, &settings).await.unwrap();
    schema::install(&pool, &settings).await.unwrap();

    assert_eq!(count_rows(&pool, "sharded_stream_2").await, 0);
}

// --- failures ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_missing_table_is_io_error(pool: PgPool) {
    let store = PgEventStore::new(
        pool,
        EventTableSettings {
            table_name: "no_such_stream".to_string(),
            ..EventTableSettings::default()
        },
    );

    let err = store.append(&make_stream("order-1", 1, "cmd-1")).await.unwrap_err();

    assert!(matches!(err, StoreError::Io { operation: "append", .. }));
}
