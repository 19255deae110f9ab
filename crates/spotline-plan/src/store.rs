//! Dispatch plan store
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::RwLock` at two levels:
//! 1. The bucket index, held only long enough to clone a bucket's `Arc`
//! 2. Each bucket's media map, read-locked by allocations and write-locked
//!    by `advance_bucket` for the two buckets it moves between
//!
//! Neither lock is held across `.await` points or I/O. Per-entry mutation is
//! a compare-and-swap on an `AtomicI64`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use spotline_core::{Ad, MediaId, SlotPosition, TimeBucket};

use crate::errors::{PlanError, PlanResult};
use crate::ratio::{Coordinate, GrantWithoutDecrement, RatioStrategy};
use crate::snapshot::PlanSnapshot;

/// Lowest value of the reserved ratio-sentinel range (inclusive)
pub const RATIO_SENTINEL_MIN: i64 = -10_000;
/// Highest value of the reserved ratio-sentinel range (inclusive)
pub const RATIO_SENTINEL_MAX: i64 = -1;

// =============================================================================
// Entry Counts
// =============================================================================

/// Interpretation of a raw remaining count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryCount {
    /// Absolute inventory; zero means exhausted
    Absolute(u64),
    /// Ratio-sentinel release
    Ratio(i64),
    /// Below the sentinel range
    Invalid(i64),
}

impl EntryCount {
    /// Classify a raw count
    pub fn classify(raw: i64) -> Self {
        if raw >= 0 {
            EntryCount::Absolute(raw.unsigned_abs())
        } else if (RATIO_SENTINEL_MIN..=RATIO_SENTINEL_MAX).contains(&raw) {
            EntryCount::Ratio(raw)
        } else {
            EntryCount::Invalid(raw)
        }
    }
}

/// Outcome of a single allocation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    /// An absolute count was decremented
    Granted {
        /// Count left after the decrement
        remaining: u64,
    },
    /// A ratio entry was granted by the ratio strategy
    RatioGranted {
        /// Sentinel value of the entry
        sentinel: i64,
    },
    /// The entry exists but yields nothing
    Exhausted,
    /// No entry at the coordinate
    Absent,
}

impl Allocation {
    /// Returns true if the allocation produced an impression
    pub fn is_granted(self) -> bool {
        matches!(self, Allocation::Granted { .. } | Allocation::RatioGranted { .. })
    }
}

// =============================================================================
// Bucket Layout
// =============================================================================

type SlotCells = BTreeMap<SlotPosition, AtomicI64>;
type MediaPlan = HashMap<Ad, SlotCells>;

#[derive(Debug, Default)]
struct BucketPlan {
    media: RwLock<HashMap<MediaId, MediaPlan>>,
}

/// Read-only copy of one media's entries in one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSlice {
    /// Bucket the slice was taken from
    pub bucket: TimeBucket,
    /// Media the slice belongs to
    pub media: MediaId,
    /// `ad → slot → count` at the time of the copy
    pub entries: BTreeMap<Ad, BTreeMap<SlotPosition, i64>>,
}

impl DispatchSlice {
    /// Count at a coordinate, if present
    pub fn count(&self, ad: &Ad, slot: SlotPosition) -> Option<i64> {
        self.entries.get(ad).and_then(|slots| slots.get(&slot)).copied()
    }

    /// Ads with an entry at `slot`, with their counts
    pub fn ads_at(&self, slot: SlotPosition) -> impl Iterator<Item = (Ad, i64)> + '_ {
        self.entries
            .iter()
            .filter_map(move |(ad, slots)| slots.get(&slot).map(|count| (*ad, *count)))
    }

    /// Highest slot present in the slice
    pub fn max_slot(&self) -> Option<SlotPosition> {
        self.entries
            .values()
            .filter_map(|slots| slots.keys().next_back().copied())
            .max()
    }

    /// Returns true if the slice holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Aggregate store statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanStats {
    /// Buckets held in memory
    pub buckets: usize,
    /// Entries across all buckets
    pub entries: usize,
    /// Entries in the ratio-sentinel range
    pub ratio_entries: usize,
    /// Sum of absolute remaining counts
    pub remaining: u64,
}

/// Outcome of moving one bucket into another
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    /// Entries moved into a vacant destination coordinate
    pub moved: usize,
    /// Entries summed into an existing destination count
    pub merged: usize,
    /// Entries dropped because they could not be combined
    pub conflicts: usize,
}

impl AdvanceReport {
    fn absorb(&mut self, other: AdvanceReport) {
        self.moved += other.moved;
        self.merged += other.merged;
        self.conflicts += other.conflicts;
    }

    /// Entries that left the source bucket
    pub fn total(&self) -> usize {
        self.moved + self.merged + self.conflicts
    }
}

// =============================================================================
// Dispatch Plan Store
// =============================================================================

/// Time-bucketed inventory table
pub struct DispatchPlanStore {
    buckets: RwLock<BTreeMap<TimeBucket, Arc<BucketPlan>>>,
    ratio: Arc<dyn RatioStrategy>,
    loaded: AtomicBool,
}

impl std::fmt::Debug for DispatchPlanStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchPlanStore")
            .field("buckets", &self.buckets.read().len())
            .field("ratio", &self.ratio.name())
            .field("loaded", &self.loaded.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for DispatchPlanStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchPlanStore {
    /// Empty store granting ratio entries without decrement
    pub fn new() -> Self {
        Self::with_ratio_strategy(Arc::new(GrantWithoutDecrement))
    }

    /// Empty store with an explicit ratio strategy
    pub fn with_ratio_strategy(ratio: Arc<dyn RatioStrategy>) -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            ratio,
            loaded: AtomicBool::new(false),
        }
    }

    /// Returns true once `load` has succeeded
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Seed the store from a snapshot, every entry at slot 0
    ///
    /// The whole snapshot is validated before anything becomes visible; a
    /// rejected snapshot leaves the store empty and loadable.
    pub fn load(&self, snapshot: PlanSnapshot) -> PlanResult<usize> {
        if self.is_loaded() {
            return Err(PlanError::AlreadyLoaded);
        }

        let mut staged: BTreeMap<TimeBucket, HashMap<MediaId, HashMap<Ad, i64>>> =
            BTreeMap::new();
        for row in &snapshot.rows {
            if let EntryCount::Invalid(count) = EntryCount::classify(row.count) {
                return Err(PlanError::InvalidCount {
                    media: row.media,
                    bucket: row.bucket,
                    ad: row.ad,
                    count,
                });
            }

            let slot = staged
                .entry(row.bucket)
                .or_default()
                .entry(row.media)
                .or_default()
                .entry(row.ad);
            match slot {
                std::collections::hash_map::Entry::Vacant(vacant) => {
                    vacant.insert(row.count);
                }
                std::collections::hash_map::Entry::Occupied(mut occupied) => {
                    let existing = *occupied.get();
                    if existing < 0 || row.count < 0 {
                        return Err(PlanError::DuplicateEntry {
                            media: row.media,
                            bucket: row.bucket,
                            ad: row.ad,
                        });
                    }
                    let sum = existing.checked_add(row.count).ok_or(PlanError::CountOverflow {
                        media: row.media,
                        ad: row.ad,
                        slot: 0,
                    })?;
                    occupied.insert(sum);
                }
            }
        }

        let mut entries = 0;
        let mut built = BTreeMap::new();
        for (bucket, media) in staged {
            let mut plan: HashMap<MediaId, MediaPlan> = HashMap::with_capacity(media.len());
            for (media, ads) in media {
                entries += ads.len();
                let ads = ads
                    .into_iter()
                    .map(|(ad, count)| (ad, BTreeMap::from([(0, AtomicI64::new(count))])))
                    .collect();
                plan.insert(media, ads);
            }
            built.insert(
                bucket,
                Arc::new(BucketPlan {
                    media: RwLock::new(plan),
                }),
            );
        }

        let mut buckets = self.buckets.write();
        if self
            .loaded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PlanError::AlreadyLoaded);
        }
        *buckets = built;

        info!(
            buckets = buckets.len(),
            entries,
            ratio_strategy = self.ratio.name(),
            "Dispatch plan loaded"
        );
        Ok(entries)
    }

    fn bucket(&self, bucket: TimeBucket) -> Option<Arc<BucketPlan>> {
        self.buckets.read().get(&bucket).cloned()
    }

    /// Attempt one allocation at a coordinate
    ///
    /// Absolute counts above zero are decremented by exactly one; zero and
    /// missing coordinates yield nothing; ratio sentinels are handed to the
    /// ratio strategy and never decremented.
    pub fn try_allocate(
        &self,
        bucket: TimeBucket,
        media: MediaId,
        ad: &Ad,
        slot: SlotPosition,
    ) -> Allocation {
        let Some(plan) = self.bucket(bucket) else {
            return Allocation::Absent;
        };
        let media_plans = plan.media.read();
        let Some(cell) = media_plans
            .get(&media)
            .and_then(|ads| ads.get(ad))
            .and_then(|slots| slots.get(&slot))
        else {
            return Allocation::Absent;
        };

        let mut current = cell.load(Ordering::Acquire);
        loop {
            match EntryCount::classify(current) {
                EntryCount::Absolute(0) => return Allocation::Exhausted,
                EntryCount::Absolute(remaining) => {
                    match cell.compare_exchange_weak(
                        current,
                        current - 1,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            return Allocation::Granted {
                                remaining: remaining - 1,
                            }
                        }
                        Err(actual) => current = actual,
                    }
                }
                EntryCount::Ratio(sentinel) => {
                    let coordinate = Coordinate {
                        bucket,
                        media,
                        ad: *ad,
                        slot,
                    };
                    return if self.ratio.consume(&coordinate, sentinel) {
                        Allocation::RatioGranted { sentinel }
                    } else {
                        Allocation::Exhausted
                    };
                }
                EntryCount::Invalid(raw) => {
                    warn!(%bucket, %media, %ad, slot, raw, "Invalid remaining count in dispatch plan");
                    return Allocation::Exhausted;
                }
            }
        }
    }

    /// Current count at a coordinate
    pub fn remaining(
        &self,
        bucket: TimeBucket,
        media: MediaId,
        ad: &Ad,
        slot: SlotPosition,
    ) -> Option<i64> {
        let plan = self.bucket(bucket)?;
        let media_plans = plan.media.read();
        media_plans
            .get(&media)
            .and_then(|ads| ads.get(ad))
            .and_then(|slots| slots.get(&slot))
            .map(|cell| cell.load(Ordering::Acquire))
    }

    /// Copy of one media's entries in a bucket, `None` if either is absent
    pub fn slice(&self, bucket: TimeBucket, media: MediaId) -> Option<DispatchSlice> {
        let plan = self.bucket(bucket)?;
        let media_plans = plan.media.read();
        let ads = media_plans.get(&media)?;
        let entries = ads
            .iter()
            .map(|(ad, slots)| {
                let slots = slots
                    .iter()
                    .map(|(slot, cell)| (*slot, cell.load(Ordering::Acquire)))
                    .collect();
                (*ad, slots)
            })
            .collect();
        Some(DispatchSlice {
            bucket,
            media,
            entries,
        })
    }

    /// Returns true if the bucket is held in memory
    pub fn contains_bucket(&self, bucket: TimeBucket) -> bool {
        self.buckets.read().contains_key(&bucket)
    }

    /// Buckets held in memory, oldest first
    pub fn buckets(&self) -> Vec<TimeBucket> {
        self.buckets.read().keys().copied().collect()
    }

    /// Move every entry of `from` into `to` at `slot + 1`
    ///
    /// Missing source bucket is a no-op and creates nothing. The destination
    /// bucket and its nested maps are created on demand. Where the
    /// destination already holds a count, two absolute counts are summed;
    /// any combination involving a ratio sentinel keeps the destination and
    /// drops the source entry, logged as a conflict.
    pub fn advance_bucket(&self, from: TimeBucket, to: TimeBucket) -> PlanResult<AdvanceReport> {
        if from >= to {
            return Err(PlanError::InvalidAdvance { from, to });
        }

        let Some(past) = self.bucket(from) else {
            debug!(%from, %to, "No source bucket to advance");
            return Ok(AdvanceReport::default());
        };
        let future = Arc::clone(self.buckets.write().entry(to).or_default());

        // Lock order is always past before future; `from < to` keeps it total.
        let mut past_media = past.media.write();
        let mut future_media = future.media.write();

        let work: Vec<(MediaId, MediaPlan, MediaPlan)> = past_media
            .drain()
            .map(|(media, source)| {
                let destination = future_media.remove(&media).unwrap_or_default();
                (media, source, destination)
            })
            .collect();

        let merged: Vec<(MediaId, MediaPlan, AdvanceReport)> = work
            .into_par_iter()
            .map(|(media, source, destination)| {
                let (plan, report) = shift_media(media, source, destination);
                (media, plan, report)
            })
            .collect();

        let mut report = AdvanceReport::default();
        for (media, plan, media_report) in merged {
            report.absorb(media_report);
            future_media.insert(media, plan);
        }

        debug!(
            %from,
            %to,
            moved = report.moved,
            merged = report.merged,
            conflicts = report.conflicts,
            "Bucket advanced"
        );
        Ok(report)
    }

    /// Drop every bucket strictly older than `horizon`
    pub fn evict_before(&self, horizon: TimeBucket) -> usize {
        let mut buckets = self.buckets.write();
        let kept = buckets.split_off(&horizon);
        let evicted = buckets.len();
        *buckets = kept;
        if evicted > 0 {
            debug!(%horizon, evicted, "Evicted stale buckets");
        }
        evicted
    }

    /// Aggregate statistics across all buckets
    pub fn stats(&self) -> PlanStats {
        let plans: Vec<Arc<BucketPlan>> = self.buckets.read().values().cloned().collect();
        let mut stats = PlanStats {
            buckets: plans.len(),
            ..PlanStats::default()
        };
        for plan in plans {
            let media_plans = plan.media.read();
            for cell in media_plans
                .values()
                .flat_map(|ads| ads.values())
                .flat_map(|slots| slots.values())
            {
                stats.entries += 1;
                match EntryCount::classify(cell.load(Ordering::Acquire)) {
                    EntryCount::Absolute(count) => {
                        stats.remaining = stats.remaining.saturating_add(count);
                    }
                    EntryCount::Ratio(_) => stats.ratio_entries += 1,
                    EntryCount::Invalid(_) => {}
                }
            }
        }
        stats
    }
}

/// Shift one media's entries forward by one slot into `destination`
fn shift_media(
    media: MediaId,
    source: MediaPlan,
    mut destination: MediaPlan,
) -> (MediaPlan, AdvanceReport) {
    let mut report = AdvanceReport::default();

    for (ad, slots) in source {
        let target_slots = destination.entry(ad).or_default();
        for (slot, cell) in slots {
            let count = cell.into_inner();
            let Some(next_slot) = slot.checked_add(1) else {
                warn!(%media, %ad, slot, "Slot position overflow, entry dropped");
                report.conflicts += 1;
                continue;
            };

            match target_slots.entry(next_slot) {
                std::collections::btree_map::Entry::Vacant(vacant) => {
                    vacant.insert(AtomicI64::new(count));
                    report.moved += 1;
                }
                std::collections::btree_map::Entry::Occupied(occupied) => {
                    let existing = occupied.get().load(Ordering::Acquire);
                    let combined = match (EntryCount::classify(existing), EntryCount::classify(count)) {
                        (EntryCount::Absolute(_), EntryCount::Absolute(_)) => {
                            existing.checked_add(count)
                        }
                        _ => None,
                    };
                    match combined {
                        Some(sum) => {
                            occupied.get().store(sum, Ordering::Release);
                            report.merged += 1;
                        }
                        None => {
                            warn!(
                                %media,
                                %ad,
                                slot = next_slot,
                                existing,
                                incoming = count,
                                "Cannot combine reorganized entry, keeping destination"
                            );
                            report.conflicts += 1;
                        }
                    }
                }
            }
        }
    }

    destination.retain(|_, slots| !slots.is_empty());
    (destination, report)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratio::DenyRatio;

    const MEDIA: MediaId = MediaId::new(1);
    const AD: Ad = Ad::new(10, 20, 30, 40);

    fn bucket(minutes: i64) -> TimeBucket {
        TimeBucket::from_epoch_minutes(minutes)
    }

    fn seeded(count: i64) -> DispatchPlanStore {
        let store = DispatchPlanStore::new();
        store
            .load(PlanSnapshot::new().with_row(MEDIA, bucket(100), AD, count))
            .unwrap();
        store
    }

    #[test]
    fn test_classify_counts() {
        assert_eq!(EntryCount::classify(0), EntryCount::Absolute(0));
        assert_eq!(EntryCount::classify(7), EntryCount::Absolute(7));
        assert_eq!(EntryCount::classify(-1), EntryCount::Ratio(-1));
        assert_eq!(EntryCount::classify(-10_000), EntryCount::Ratio(-10_000));
        assert_eq!(EntryCount::classify(-10_001), EntryCount::Invalid(-10_001));
    }

    #[test]
    fn test_allocate_decrements_until_exhausted() {
        let store = seeded(2);

        assert_eq!(
            store.try_allocate(bucket(100), MEDIA, &AD, 0),
            Allocation::Granted { remaining: 1 }
        );
        assert_eq!(
            store.try_allocate(bucket(100), MEDIA, &AD, 0),
            Allocation::Granted { remaining: 0 }
        );
        assert_eq!(
            store.try_allocate(bucket(100), MEDIA, &AD, 0),
            Allocation::Exhausted
        );
        assert_eq!(store.remaining(bucket(100), MEDIA, &AD, 0), Some(0));
    }

    #[test]
    fn test_allocate_missing_coordinates() {
        let store = seeded(2);
        assert_eq!(store.try_allocate(bucket(99), MEDIA, &AD, 0), Allocation::Absent);
        assert_eq!(
            store.try_allocate(bucket(100), MediaId::new(2), &AD, 0),
            Allocation::Absent
        );
        assert_eq!(store.try_allocate(bucket(100), MEDIA, &AD, 1), Allocation::Absent);
    }

    #[test]
    fn test_ratio_entry_is_never_decremented() {
        let store = seeded(-250);
        for _ in 0..5 {
            assert_eq!(
                store.try_allocate(bucket(100), MEDIA, &AD, 0),
                Allocation::RatioGranted { sentinel: -250 }
            );
        }
        assert_eq!(store.remaining(bucket(100), MEDIA, &AD, 0), Some(-250));
    }

    #[test]
    fn test_ratio_strategy_can_deny() {
        let store = DispatchPlanStore::with_ratio_strategy(Arc::new(DenyRatio));
        store
            .load(PlanSnapshot::new().with_row(MEDIA, bucket(100), AD, -3))
            .unwrap();
        assert_eq!(
            store.try_allocate(bucket(100), MEDIA, &AD, 0),
            Allocation::Exhausted
        );
    }

    #[test]
    fn test_load_only_once() {
        let store = seeded(1);
        assert_eq!(
            store.load(PlanSnapshot::new()).unwrap_err(),
            PlanError::AlreadyLoaded
        );
    }

    #[test]
    fn test_load_rejects_invalid_count_atomically() {
        let store = DispatchPlanStore::new();
        let snapshot = PlanSnapshot::new()
            .with_row(MEDIA, bucket(100), AD, 5)
            .with_row(MEDIA, bucket(101), AD, -20_000);

        assert!(matches!(
            store.load(snapshot),
            Err(PlanError::InvalidCount { count: -20_000, .. })
        ));
        assert!(!store.is_loaded());
        assert!(store.buckets().is_empty());
    }

    #[test]
    fn test_load_sums_duplicate_absolute_rows() {
        let store = DispatchPlanStore::new();
        let snapshot = PlanSnapshot::new()
            .with_row(MEDIA, bucket(100), AD, 2)
            .with_row(MEDIA, bucket(100), AD, 3);
        assert_eq!(store.load(snapshot).unwrap(), 1);
        assert_eq!(store.remaining(bucket(100), MEDIA, &AD, 0), Some(5));
    }

    #[test]
    fn test_load_rejects_duplicate_ratio_rows() {
        let store = DispatchPlanStore::new();
        let snapshot = PlanSnapshot::new()
            .with_row(MEDIA, bucket(100), AD, 2)
            .with_row(MEDIA, bucket(100), AD, -3);
        assert!(matches!(
            store.load(snapshot),
            Err(PlanError::DuplicateEntry { .. })
        ));
    }

    #[test]
    fn test_advance_moves_to_next_slot() {
        let store = seeded(4);
        let report = store.advance_bucket(bucket(100), bucket(102)).unwrap();

        assert_eq!(report.moved, 1);
        assert_eq!(store.remaining(bucket(100), MEDIA, &AD, 0), None);
        assert_eq!(store.remaining(bucket(102), MEDIA, &AD, 1), Some(4));
        assert_eq!(store.remaining(bucket(102), MEDIA, &AD, 0), None);
    }

    #[test]
    fn test_advance_without_source_creates_nothing() {
        let store = seeded(4);
        let report = store.advance_bucket(bucket(50), bucket(52)).unwrap();

        assert_eq!(report, AdvanceReport::default());
        assert_eq!(store.buckets(), vec![bucket(100)]);
    }

    #[test]
    fn test_advance_sums_into_existing_destination() {
        let store = DispatchPlanStore::new();
        store
            .load(
                PlanSnapshot::new()
                    .with_row(MEDIA, bucket(100), AD, 3)
                    .with_row(MEDIA, bucket(101), AD, 2),
            )
            .unwrap();

        store.advance_bucket(bucket(101), bucket(102)).unwrap();
        let report = store.advance_bucket(bucket(100), bucket(102)).unwrap();

        assert_eq!(report.merged, 1);
        assert_eq!(store.remaining(bucket(102), MEDIA, &AD, 1), Some(5));
    }

    #[test]
    fn test_advance_keeps_untouched_destination_media() {
        let other_media = MediaId::new(2);
        let store = DispatchPlanStore::new();
        store
            .load(
                PlanSnapshot::new()
                    .with_row(MEDIA, bucket(100), AD, 3)
                    .with_row(other_media, bucket(102), AD, 8),
            )
            .unwrap();

        let report = store.advance_bucket(bucket(100), bucket(102)).unwrap();

        assert_eq!(report.moved, 1);
        assert_eq!(store.remaining(bucket(102), other_media, &AD, 0), Some(8));
        assert_eq!(store.remaining(bucket(102), MEDIA, &AD, 1), Some(3));
    }

    #[test]
    fn test_advance_conflict_keeps_destination() {
        let store = DispatchPlanStore::new();
        store
            .load(
                PlanSnapshot::new()
                    .with_row(MEDIA, bucket(100), AD, 3)
                    .with_row(MEDIA, bucket(101), AD, -5),
            )
            .unwrap();

        store.advance_bucket(bucket(101), bucket(102)).unwrap();
        let report = store.advance_bucket(bucket(100), bucket(102)).unwrap();

        assert_eq!(report.conflicts, 1);
        assert_eq!(report.total(), 1);
        assert_eq!(store.remaining(bucket(102), MEDIA, &AD, 1), Some(-5));
        assert_eq!(store.remaining(bucket(100), MEDIA, &AD, 0), None);
    }

    #[test]
    fn test_advance_rejects_backwards() {
        let store = seeded(1);
        assert!(matches!(
            store.advance_bucket(bucket(100), bucket(100)),
            Err(PlanError::InvalidAdvance { .. })
        ));
    }

    #[test]
    fn test_slice_copies_counts() {
        let store = seeded(3);
        let slice = store.slice(bucket(100), MEDIA).unwrap();
        assert_eq!(slice.count(&AD, 0), Some(3));
        assert_eq!(slice.ads_at(0).collect::<Vec<_>>(), vec![(AD, 3)]);
        assert_eq!(slice.max_slot(), Some(0));

        store.try_allocate(bucket(100), MEDIA, &AD, 0);
        assert_eq!(slice.count(&AD, 0), Some(3));
        assert!(store.slice(bucket(101), MEDIA).is_none());
    }

    #[test]
    fn test_evict_before_horizon() {
        let store = DispatchPlanStore::new();
        store
            .load(
                PlanSnapshot::new()
                    .with_row(MEDIA, bucket(10), AD, 1)
                    .with_row(MEDIA, bucket(20), AD, 1)
                    .with_row(MEDIA, bucket(30), AD, 1),
            )
            .unwrap();

        assert_eq!(store.evict_before(bucket(20)), 1);
        assert_eq!(store.buckets(), vec![bucket(20), bucket(30)]);
    }

    #[test]
    fn test_stats() {
        let store = DispatchPlanStore::new();
        store
            .load(
                PlanSnapshot::new()
                    .with_row(MEDIA, bucket(10), AD, 4)
                    .with_row(MEDIA, bucket(10), Ad::new(1, 1, 1, 1), -9)
                    .with_row(MediaId::new(2), bucket(11), AD, 6),
            )
            .unwrap();

        let stats = store.stats();
        assert_eq!(stats.buckets, 2);
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.ratio_entries, 1);
        assert_eq!(stats.remaining, 10);
    }
}
