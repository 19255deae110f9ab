//! Spotline Plan: the dispatch plan and its reorganizer
//!
//! The dispatch plan is the table `(TimeBucket, MediaId, Ad, SlotPosition) →
//! RemainingCount` that every ad request allocates against. It is seeded once
//! from a [`PlanSnapshot`], decremented by requests through
//! [`DispatchPlanStore::try_allocate`] and rolled forward in time by the
//! [`StackReorganizer`].
//!
//! # Concurrency
//!
//! Each bucket carries its own `RwLock` over the media maps and each entry is
//! an `AtomicI64`. Allocations take a bucket read lock and decrement with a
//! compare-and-swap loop; a reorganization pass takes the write locks of the
//! two buckets it touches, so an allocation racing a move observes either the
//! pre-move or post-move state, never a torn one.
//!
//! # Usage
//!
//! ```rust,no_run
//! use spotline_core::{Ad, MediaId, TimeBucket};
//! use spotline_plan::{DispatchPlanStore, PlanSnapshot};
//!
//! # fn example() -> Result<(), spotline_plan::PlanError> {
//! let bucket = TimeBucket::from_epoch_minutes(28_000_000);
//! let ad = Ad::new(1, 1, 1, 1);
//!
//! let store = DispatchPlanStore::new();
//! store.load(PlanSnapshot::new().with_row(MediaId::new(1), bucket, ad, 2))?;
//!
//! assert!(store.try_allocate(bucket, MediaId::new(1), &ad, 0).is_granted());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod errors;
pub mod ratio;
pub mod reorganizer;
pub mod snapshot;
pub mod store;

pub use errors::{PlanError, PlanResult};
pub use ratio::{Coordinate, DenyRatio, GrantWithoutDecrement, RatioStrategy};
pub use reorganizer::{ReorganizeReport, StackReorganizer};
pub use snapshot::{PlanSnapshot, SnapshotRow};
pub use store::{
    AdvanceReport, Allocation, DispatchPlanStore, DispatchSlice, EntryCount, PlanStats,
    RATIO_SENTINEL_MAX, RATIO_SENTINEL_MIN,
};
