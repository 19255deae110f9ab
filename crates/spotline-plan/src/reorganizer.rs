//! Stack reorganizer
//!
//! Rolls unconsumed inventory forward as wall-clock time advances. With the
//! current minute `T`, a pass moves every entry of bucket `T-1` into bucket
//! `T+1` one slot further down the queue, then evicts buckets that fell
//! behind the retention horizon.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use spotline_core::TimeBucket;

use crate::errors::PlanError;
use crate::store::{AdvanceReport, DispatchPlanStore};

/// Outcome of one reorganization pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorganizeReport {
    /// Bucket the pass was run for
    pub now: TimeBucket,
    /// Per-entry counts of the move
    pub advance: AdvanceReport,
    /// Buckets dropped behind the retention horizon
    pub evicted: usize,
    /// Error that stopped the move, if any
    pub error: Option<PlanError>,
    /// Wall time spent in the pass
    pub elapsed: Duration,
}

impl ReorganizeReport {
    /// Returns true if the pass finished without a fatal error or conflicts
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.advance.conflicts == 0
    }
}

/// Releases the in-flight flag however the pass ends
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Moves past inventory into the near future
#[derive(Debug)]
pub struct StackReorganizer {
    store: Arc<DispatchPlanStore>,
    retention_minutes: u32,
    reorganizing: AtomicBool,
    passes: AtomicU64,
}

impl StackReorganizer {
    /// Reorganizer over `store`, evicting buckets more than
    /// `retention_minutes` behind the pass bucket
    pub fn new(store: Arc<DispatchPlanStore>, retention_minutes: u32) -> Self {
        Self {
            store,
            retention_minutes,
            reorganizing: AtomicBool::new(false),
            passes: AtomicU64::new(0),
        }
    }

    /// Store being reorganized
    pub fn store(&self) -> &Arc<DispatchPlanStore> {
        &self.store
    }

    /// Returns true while a pass is in flight
    pub fn is_running(&self) -> bool {
        self.reorganizing.load(Ordering::Acquire)
    }

    /// Completed passes since construction
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Run one pass for the bucket containing "now"
    ///
    /// Returns `None` without touching the store if another pass is in
    /// flight.
    #[instrument(skip(self), fields(now = %now))]
    pub fn run_pass(&self, now: TimeBucket) -> Option<ReorganizeReport> {
        if self
            .reorganizing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Reorganization already in progress, skipping");
            return None;
        }
        let _guard = PassGuard(&self.reorganizing);
        let started = Instant::now();

        let (advance, error) = match self.store.advance_bucket(now.previous(), now.next()) {
            Ok(advance) => (advance, None),
            Err(err) => {
                error!(error = %err, "Reorganization pass failed");
                (AdvanceReport::default(), Some(err))
            }
        };

        let horizon = now.offset(-i64::from(self.retention_minutes));
        let evicted = self.store.evict_before(horizon);
        self.passes.fetch_add(1, Ordering::Relaxed);

        let report = ReorganizeReport {
            now,
            advance,
            evicted,
            error,
            elapsed: started.elapsed(),
        };
        if advance.conflicts > 0 {
            warn!(conflicts = advance.conflicts, "Reorganization finished with conflicts");
        }
        info!(
            moved = advance.moved,
            merged = advance.merged,
            conflicts = advance.conflicts,
            evicted,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Reorganization pass complete"
        );
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::PlanSnapshot;
    use spotline_core::{Ad, MediaId};

    const MEDIA: MediaId = MediaId::new(7);
    const AD: Ad = Ad::new(1, 2, 3, 4);

    fn bucket(minutes: i64) -> TimeBucket {
        TimeBucket::from_epoch_minutes(minutes)
    }

    #[test]
    fn test_pass_moves_past_into_future() {
        let store = Arc::new(DispatchPlanStore::new());
        store
            .load(PlanSnapshot::new().with_row(MEDIA, bucket(99), AD, 5))
            .unwrap();
        let reorganizer = StackReorganizer::new(Arc::clone(&store), 60);

        let report = reorganizer.run_pass(bucket(100)).unwrap();

        assert!(report.is_clean());
        assert_eq!(report.advance.moved, 1);
        assert_eq!(store.remaining(bucket(101), MEDIA, &AD, 1), Some(5));
        assert_eq!(store.remaining(bucket(99), MEDIA, &AD, 0), None);
        assert_eq!(reorganizer.passes(), 1);
        assert!(!reorganizer.is_running());
    }

    #[test]
    fn test_pass_without_buckets_is_noop() {
        let store = Arc::new(DispatchPlanStore::new());
        store
            .load(PlanSnapshot::new().with_row(MEDIA, bucket(500), AD, 5))
            .unwrap();
        let reorganizer = StackReorganizer::new(Arc::clone(&store), 600);

        let report = reorganizer.run_pass(bucket(200)).unwrap();

        assert_eq!(report.advance.total(), 0);
        assert_eq!(store.buckets(), vec![bucket(500)]);
    }

    #[test]
    fn test_pass_skipped_while_in_flight() {
        let store = Arc::new(DispatchPlanStore::new());
        let reorganizer = StackReorganizer::new(store, 60);

        reorganizer.reorganizing.store(true, Ordering::Release);
        assert!(reorganizer.run_pass(bucket(100)).is_none());
        assert_eq!(reorganizer.passes(), 0);

        reorganizer.reorganizing.store(false, Ordering::Release);
        assert!(reorganizer.run_pass(bucket(100)).is_some());
    }

    #[test]
    fn test_pass_evicts_behind_retention() {
        let store = Arc::new(DispatchPlanStore::new());
        store
            .load(
                PlanSnapshot::new()
                    .with_row(MEDIA, bucket(10), AD, 1)
                    .with_row(MEDIA, bucket(95), AD, 1),
            )
            .unwrap();
        let reorganizer = StackReorganizer::new(Arc::clone(&store), 30);

        let report = reorganizer.run_pass(bucket(100)).unwrap();

        assert_eq!(report.evicted, 1);
        assert!(!store.contains_bucket(bucket(10)));
        assert!(store.contains_bucket(bucket(95)));
    }
}
