//! Strata Core — persistence abstractions for event-sourced aggregates.
//!
//! This crate defines the data model, store traits, outcome taxonomy and the
//! pure decision logic (sharding, violation classification, checkpoint
//! planning) shared by every storage engine. It contains no I/O.

pub mod checkpoint;
pub mod classify;
pub mod clock;
pub mod command;
pub mod error;
pub mod repository;
pub mod settings;
pub mod shard;
pub mod stream;
