//! Manually driven clock
//!
//! Scheduler and orchestrator tests move wall-clock time explicitly instead
//! of sleeping.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};

use spotline_core::{Clock, TimeBucket};

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Clock frozen at `at`
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(at.timestamp_millis()),
        }
    }

    /// Clock frozen at the start of `bucket`
    pub fn at_bucket(bucket: TimeBucket) -> Self {
        Self::new(bucket.start())
    }

    /// Jump to `at`
    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    /// Move forward by `by`
    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }

    /// Move forward by whole minutes
    pub fn advance_minutes(&self, minutes: i64) {
        self.advance(Duration::minutes(minutes));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.millis.load(Ordering::SeqCst))
            .single()
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_between_buckets() {
        let start = TimeBucket::from_epoch_minutes(1_000);
        let clock = ManualClock::at_bucket(start);
        assert_eq!(clock.current_bucket(), start);

        clock.advance(Duration::seconds(59));
        assert_eq!(clock.current_bucket(), start);

        clock.advance(Duration::seconds(1));
        assert_eq!(clock.current_bucket(), start.next());

        clock.advance_minutes(5);
        assert_eq!(clock.current_bucket(), start.offset(6));
    }
}
