//! Dispatch plan errors

use spotline_core::{Ad, MediaId, SlotPosition, TimeBucket};
use thiserror::Error;

/// Result type for dispatch plan operations
pub type PlanResult<T> = std::result::Result<T, PlanError>;

/// Errors raised by the dispatch plan store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// `load` was called after the store had already been seeded
    #[error("Dispatch plan already loaded")]
    AlreadyLoaded,

    /// A snapshot row carries a count below the ratio sentinel range
    #[error("Invalid remaining count {count} for {ad} in media {media} at {bucket}")]
    InvalidCount {
        /// Media of the offending row
        media: MediaId,
        /// Bucket of the offending row
        bucket: TimeBucket,
        /// Ad of the offending row
        ad: Ad,
        /// Rejected count
        count: i64,
    },

    /// Two snapshot rows address the same coordinate and cannot be summed
    #[error("Conflicting entries for {ad} in media {media} at {bucket}")]
    DuplicateEntry {
        /// Media of the coordinate
        media: MediaId,
        /// Bucket of the coordinate
        bucket: TimeBucket,
        /// Ad of the coordinate
        ad: Ad,
    },

    /// Summing two counts overflowed
    #[error("Remaining count overflow for {ad} in media {media} at slot {slot}")]
    CountOverflow {
        /// Media of the coordinate
        media: MediaId,
        /// Ad of the coordinate
        ad: Ad,
        /// Slot of the coordinate
        slot: SlotPosition,
    },

    /// `advance_bucket` was asked to move inventory backwards or in place
    #[error("Cannot advance bucket {from} into {to}")]
    InvalidAdvance {
        /// Source bucket
        from: TimeBucket,
        /// Destination bucket
        to: TimeBucket,
    },
}
