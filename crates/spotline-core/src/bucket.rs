//! Minute-granular time buckets
//!
//! Every dispatch-plan lookup and mutation keys on a [`TimeBucket`]. Buckets
//! are stored as whole minutes since the Unix epoch, which makes truncation
//! implicit: there is no way to build a bucket that carries seconds.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Zero-based sequence index of an ad within a single ad break
pub type SlotPosition = u32;

/// A wall-clock timestamp truncated to the minute (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeBucket(i64);

impl TimeBucket {
    /// Bucket containing the given instant
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.timestamp().div_euclid(60))
    }

    /// Bucket from whole minutes since the Unix epoch
    pub const fn from_epoch_minutes(minutes: i64) -> Self {
        Self(minutes)
    }

    /// Whole minutes since the Unix epoch
    pub const fn epoch_minutes(self) -> i64 {
        self.0
    }

    /// Neighbouring bucket `minutes` away (negative for the past)
    pub const fn offset(self, minutes: i64) -> Self {
        Self(self.0.saturating_add(minutes))
    }

    /// The bucket immediately before this one
    pub const fn previous(self) -> Self {
        self.offset(-1)
    }

    /// The bucket immediately after this one
    pub const fn next(self) -> Self {
        self.offset(1)
    }

    /// Start of the bucket as a timestamp
    pub fn start(self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.0.saturating_mul(60), 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl From<DateTime<Utc>> for TimeBucket {
    fn from(at: DateTime<Utc>) -> Self {
        Self::from_datetime(at)
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start().format("%Y-%m-%dT%H:%MZ"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_truncates_to_minute() {
        let a = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 59).unwrap();
        let c = Utc.with_ymd_and_hms(2024, 5, 1, 10, 31, 0).unwrap();

        assert_eq!(TimeBucket::from(a), TimeBucket::from(b));
        assert_eq!(TimeBucket::from(a).next(), TimeBucket::from(c));
        assert_eq!(TimeBucket::from(b).start(), a);
    }

    #[test]
    fn test_bucket_before_epoch() {
        let at = Utc.timestamp_opt(-30, 0).unwrap();
        assert_eq!(TimeBucket::from(at).epoch_minutes(), -1);
    }

    #[test]
    fn test_bucket_display() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 12).unwrap();
        assert_eq!(TimeBucket::from(at).to_string(), "2024-05-01T10:30Z");
    }
}
