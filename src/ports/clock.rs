//! Wall clock port.

use chrono::{DateTime, Utc};

/// Source of the current time for deadlines that must fire without ticks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
