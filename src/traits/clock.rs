//! Wall-clock abstraction.
//!
//! Credential age is measured against the clock so tests can age a pair
//! without waiting. Sleeping and intervals use tokio timers directly.

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time in UTC.
    fn now(&self) -> DateTime<Utc>;
}
