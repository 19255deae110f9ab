//! Wall-clock abstraction.
//!
//! Components that compare against the current minute take a [`Clock`] so
//! tests can drive time explicitly. Production code uses [`SystemClock`].

use chrono::{DateTime, Utc};

use crate::bucket::TimeBucket;

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;

    /// Bucket containing the current instant
    fn current_bucket(&self) -> TimeBucket {
        TimeBucket::from_datetime(self.now())
    }
}

/// Clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
