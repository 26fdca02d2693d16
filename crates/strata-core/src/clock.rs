//! Source of the `created_on` timestamps written by the stores.

use std::fmt::Debug;

use chrono::{DateTime, Utc};

/// Supplies the time recorded on command markers and checkpoints.
///
/// Event streams carry their own `created_on`, set by the caller.
pub trait Clock: Send + Sync + Debug {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
