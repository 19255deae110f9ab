//! Ratio-sentinel consumption strategies
//!
//! Counts in `[-10000, -1]` mark flow-ratio releases rather than absolute
//! inventory. How such an entry is consumed is a policy decision, so the
//! store delegates to a [`RatioStrategy`] whenever it meets one. The
//! strategy may grant or deny; it never sees the entry's atomic cell and so
//! cannot decrement it.

use spotline_core::{Ad, MediaId, SlotPosition, TimeBucket};

/// Address of one dispatch plan entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coordinate {
    /// Bucket of the entry
    pub bucket: TimeBucket,
    /// Media of the entry
    pub media: MediaId,
    /// Ad of the entry
    pub ad: Ad,
    /// Slot of the entry
    pub slot: SlotPosition,
}

/// Decides whether a ratio-sentinel entry yields an allocation
pub trait RatioStrategy: Send + Sync {
    /// Called with the coordinate and its sentinel value
    fn consume(&self, coordinate: &Coordinate, sentinel: i64) -> bool;

    /// Name for logs
    fn name(&self) -> &'static str;
}

/// Grants every ratio entry without mutating it
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantWithoutDecrement;

impl RatioStrategy for GrantWithoutDecrement {
    fn consume(&self, _coordinate: &Coordinate, _sentinel: i64) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "grant-without-decrement"
    }
}

/// Treats ratio entries as unavailable
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyRatio;

impl RatioStrategy for DenyRatio {
    fn consume(&self, _coordinate: &Coordinate, _sentinel: i64) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "deny"
    }
}
