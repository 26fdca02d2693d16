//! Event store database schema.
//!
//! Table and constraint names come from `StoreSettings`, so the DDL is
//! rendered rather than kept as constants. `migrations/` holds the same
//! schema for the default, unsharded settings.

use sqlx::PgPool;
use strata_core::settings::StoreSettings;

/// Renders `CREATE TABLE` statements for every relation, one per event
/// stream partition.
///
/// The command constraint is declared before the version constraint so that
/// re-appending an identical stream reports `DuplicateCommand`.
#[must_use]
pub fn create_statements(settings: &StoreSettings) -> Vec<String> {
    let event = &settings.event;
    let sharding = event.sharding();

    let mut statements: Vec<String> = sharding
        .partitions()
        .into_iter()
        .map(|(partition, table)| {
            let version_uq = sharding.suffixed(&event.version_unique_index_name, partition);
            let command_uq = sharding.suffixed(&event.command_unique_index_name, partition);
            format!(
                r"
CREATE TABLE IF NOT EXISTS {table} (
    sequence                 BIGSERIAL PRIMARY KEY,
    aggregate_root_id        TEXT NOT NULL,
    aggregate_root_type_name TEXT NOT NULL,
    version                  BIGINT NOT NULL CHECK (version >= 1),
    command_id               TEXT NOT NULL,
    created_on               TIMESTAMPTZ NOT NULL,
    events                   JSONB NOT NULL,
    CONSTRAINT {command_uq} UNIQUE (aggregate_root_id, command_id),
    CONSTRAINT {version_uq} UNIQUE (aggregate_root_id, version)
)"
            )
        })
        .collect();

    let command = &settings.command;
    statements.push(format!(
        r"
CREATE TABLE IF NOT EXISTS {table} (
    command_id        TEXT NOT NULL,
    aggregate_root_id TEXT NOT NULL,
    message_payload   JSONB NULL,
    message_type_name TEXT NULL,
    created_on        TIMESTAMPTZ NOT NULL,
    CONSTRAINT {uq} PRIMARY KEY (command_id)
)",
        table = command.table_name,
        uq = command.unique_index_name,
    ));

    let published = &settings.published_version;
    statements.push(format!(
        r"
CREATE TABLE IF NOT EXISTS {table} (
    processor_name           TEXT NOT NULL,
    aggregate_root_type_name TEXT NOT NULL,
    aggregate_root_id        TEXT NOT NULL,
    version                  BIGINT NOT NULL CHECK (version >= 1),
    created_on               TIMESTAMPTZ NOT NULL,
    CONSTRAINT {uq} PRIMARY KEY (processor_name, aggregate_root_id)
)",
        table = published.table_name,
        uq = published.unique_index_name,
    ));

    statements.push(format!(
        r"
CREATE TABLE IF NOT EXISTS {table} (
    name TEXT PRIMARY KEY
)",
        table = settings.lock.table_name,
    ));

    statements
}

/// Creates every relation described by `settings` that does not exist yet.
///
/// # Errors
///
/// Returns the first `sqlx::Error` raised by a statement.
pub async fn install(pool: &PgPool, settings: &StoreSettings) -> Result<(), sqlx::Error> {
    for statement in create_statements(settings) {
        sqlx::query(&statement).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsharded_schema_has_four_tables() {
        let statements = create_statements(&StoreSettings::default());
        assert_eq!(statements.len(), 4);
        assert!(statements[0].contains("CREATE TABLE IF NOT EXISTS event_stream ("));
        assert!(statements[0].contains("CONSTRAINT event_stream_uq_version UNIQUE"));
        assert!(statements[1].contains("CONSTRAINT command_uq_id PRIMARY KEY (command_id)"));
        assert!(statements[2].contains("CONSTRAINT published_version_uq PRIMARY KEY"));
        assert!(statements[3].contains("lock_key"));
    }

    #[test]
    fn test_sharded_schema_suffixes_tables_and_constraints() {
        let mut settings = StoreSettings::default();
        settings.event.table_count = 3;

        let statements = create_statements(&settings);
        assert_eq!(statements.len(), 6);
        for (index, ddl) in statements.iter().take(3).enumerate() {
            assert!(ddl.contains(&format!("event_stream_{index} (")));
            assert!(ddl.contains(&format!("CONSTRAINT event_stream_uq_version_{index} UNIQUE")));
            assert!(ddl.contains(&format!("CONSTRAINT event_stream_uq_command_{index} UNIQUE")));
        }
    }
}
