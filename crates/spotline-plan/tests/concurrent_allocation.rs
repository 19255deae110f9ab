//! Concurrency tests for the dispatch plan store

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use spotline_core::{Ad, MediaId, TimeBucket};
use spotline_plan::{DispatchPlanStore, PlanSnapshot, StackReorganizer};

const MEDIA: MediaId = MediaId::new(3);
const AD: Ad = Ad::new(100, 200, 300, 400);
const NOW: TimeBucket = TimeBucket::from_epoch_minutes(29_000_000);

#[test]
fn test_racing_threads_grant_exactly_remaining_count() {
    const THREADS: usize = 32;
    const COUNT: i64 = 11;

    let store = Arc::new(DispatchPlanStore::new());
    store
        .load(PlanSnapshot::new().with_row(MEDIA, NOW, AD, COUNT))
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let granted = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let granted = Arc::clone(&granted);
            thread::spawn(move || {
                barrier.wait();
                if store.try_allocate(NOW, MEDIA, &AD, 0).is_granted() {
                    granted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(granted.load(Ordering::SeqCst), COUNT as usize);
    assert_eq!(store.remaining(NOW, MEDIA, &AD, 0), Some(0));
}

#[test]
fn test_allocation_racing_reorganization_is_never_double_counted() {
    const COUNT: i64 = 500;

    let past = NOW.previous();
    let store = Arc::new(DispatchPlanStore::new());
    store
        .load(PlanSnapshot::new().with_row(MEDIA, past, AD, COUNT))
        .unwrap();
    let reorganizer = StackReorganizer::new(Arc::clone(&store), 60);

    let barrier = Arc::new(Barrier::new(5));
    let granted = Arc::new(AtomicUsize::new(0));
    let allocators: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let granted = Arc::clone(&granted);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..200 {
                    // Either the old coordinate or the moved one is live.
                    if store.try_allocate(past, MEDIA, &AD, 0).is_granted()
                        || store.try_allocate(NOW.next(), MEDIA, &AD, 1).is_granted()
                    {
                        granted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    barrier.wait();
    let report = reorganizer.run_pass(NOW).unwrap();
    for handle in allocators {
        handle.join().unwrap();
    }

    assert!(report.is_clean());
    let remaining = store.remaining(NOW.next(), MEDIA, &AD, 1).unwrap_or(0);
    assert_eq!(granted.load(Ordering::SeqCst) as i64 + remaining, COUNT);
    assert_eq!(store.remaining(past, MEDIA, &AD, 0), None);
}

#[test]
fn test_empty_store_pass_is_noop() {
    let store = Arc::new(DispatchPlanStore::new());
    store.load(PlanSnapshot::new()).unwrap();

    let report = StackReorganizer::new(Arc::clone(&store), 60)
        .run_pass(NOW)
        .unwrap();

    assert_eq!(report.advance.total(), 0);
    assert_eq!(report.evicted, 0);
    assert!(store.buckets().is_empty());
    assert_eq!(store.stats().entries, 0);
}
