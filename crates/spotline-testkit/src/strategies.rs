//! Property test strategies for Spotline types
//!
//! Identifier ranges are kept small on purpose so generated plans collide
//! on coordinates and exercise merge paths.

use std::collections::BTreeMap;

use proptest::prelude::*;

// Re-export proptest for convenience
pub use proptest;

use spotline_core::{Ad, MediaId, TimeBucket};
use spotline_plan::PlanSnapshot;

/// Strategy for a media id out of a handful
pub fn arb_media_id() -> impl Strategy<Value = MediaId> {
    (1u64..4).prop_map(MediaId::new)
}

/// Strategy for an ad out of a small pool
///
/// # Example
///
/// ```rust
/// use spotline_testkit::strategies::arb_ad;
/// use proptest::prelude::*;
///
/// proptest! {
///     #[test]
///     fn test_ad_property(ad in arb_ad()) {
///         assert!(ad.spot_plan_id > 0);
///     }
/// }
/// ```
pub fn arb_ad() -> impl Strategy<Value = Ad> {
    (1u64..6, 1u64..3).prop_map(|(spot, master)| Ad::new(spot, master, spot * 10, 1))
}

/// Strategy for a snapshot of positive absolute counts over `buckets`
///
/// Each `(media, bucket, ad)` appears at most once.
pub fn arb_absolute_snapshot(buckets: Vec<TimeBucket>) -> impl Strategy<Value = PlanSnapshot> {
    let width = buckets.len().max(1);
    proptest::collection::btree_map((0..width, arb_media_id(), arb_ad()), 1i64..1_000, 0..24)
        .prop_map(move |rows: BTreeMap<(usize, MediaId, Ad), i64>| {
            let mut snapshot = PlanSnapshot::new();
            for ((index, media, ad), count) in rows {
                if let Some(bucket) = buckets.get(index) {
                    snapshot.push(media, *bucket, ad, count);
                }
            }
            snapshot
        })
}

/// Strategy for a ratio sentinel
pub fn arb_ratio_sentinel() -> impl Strategy<Value = i64> {
    spotline_plan::RATIO_SENTINEL_MIN..=spotline_plan::RATIO_SENTINEL_MAX
}
