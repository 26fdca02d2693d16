//! In-memory stores, fault injection, and a manual clock for testing code
//! that depends on the Strata store traits.

mod clock;
mod command_store;
mod event_store;
mod fault;
mod lock_service;
mod published_version_store;

pub use clock::ManualClock;
pub use command_store::InMemoryCommandStore;
pub use event_store::InMemoryEventStore;
pub use fault::FaultPlan;
pub use lock_service::InMemoryLockService;
pub use published_version_store::InMemoryPublishedVersionStore;
