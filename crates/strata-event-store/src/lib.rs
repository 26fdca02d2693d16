//! Strata Event Store — `PostgreSQL` implementations of the store traits.

mod fault;
pub mod pg_command_store;
pub mod pg_event_store;
pub mod pg_lock_service;
pub mod pg_published_version_store;
pub mod schema;
pub mod stores;

pub use stores::{ConnectError, PgStores};
