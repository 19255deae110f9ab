//! Start-up snapshot of the dispatch plan
//!
//! The planning subsystem computes per-media, per-bucket, per-ad remaining
//! counts; this is the interchange shape the store imports once at start-up.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use spotline_core::{Ad, MediaId, TimeBucket};

/// One `(media, bucket, ad) → count` row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    /// Media the inventory belongs to
    pub media: MediaId,
    /// Minute bucket of the release
    pub bucket: TimeBucket,
    /// Allocated ad
    pub ad: Ad,
    /// Remaining count (or ratio sentinel)
    pub count: i64,
}

/// Flat snapshot of the initial dispatch plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    /// Snapshot rows, in no particular order
    pub rows: Vec<SnapshotRow>,
}

impl PlanSnapshot {
    /// Empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row
    pub fn with_row(mut self, media: MediaId, bucket: TimeBucket, ad: Ad, count: i64) -> Self {
        self.push(media, bucket, ad, count);
        self
    }

    /// Append a row in place
    pub fn push(&mut self, media: MediaId, bucket: TimeBucket, ad: Ad, count: i64) {
        self.rows.push(SnapshotRow {
            media,
            bucket,
            ad,
            count,
        });
    }

    /// Build from the nested `media → bucket → ad → count` shape
    pub fn from_nested(nested: HashMap<MediaId, HashMap<TimeBucket, HashMap<Ad, i64>>>) -> Self {
        let rows = nested
            .into_iter()
            .flat_map(|(media, buckets)| {
                buckets.into_iter().flat_map(move |(bucket, ads)| {
                    ads.into_iter().map(move |(ad, count)| SnapshotRow {
                        media,
                        bucket,
                        ad,
                        count,
                    })
                })
            })
            .collect();
        Self { rows }
    }

    /// Parse a JSON snapshot
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the snapshot has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_nested_flattens_every_row() {
        let bucket = TimeBucket::from_epoch_minutes(10);
        let mut ads = HashMap::new();
        ads.insert(Ad::new(1, 1, 1, 1), 3);
        ads.insert(Ad::new(2, 1, 1, 1), -50);
        let mut buckets = HashMap::new();
        buckets.insert(bucket, ads);
        buckets.insert(bucket.next(), HashMap::from([(Ad::new(1, 1, 1, 1), 4)]));
        let nested = HashMap::from([(MediaId::new(9), buckets)]);

        let snapshot = PlanSnapshot::from_nested(nested);
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.rows.iter().all(|row| row.media == MediaId::new(9)));
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{"rows":[{"media":3,"bucket":100,"ad":{"spot_plan_id":1,"master_plan_id":2,"edition_id":3,"group_id":4},"count":5}]}"#;
        let snapshot = PlanSnapshot::from_json(json).unwrap();
        assert_eq!(snapshot.rows[0].ad, Ad::new(1, 2, 3, 4));
        assert_eq!(snapshot.rows[0].bucket, TimeBucket::from_epoch_minutes(100));
    }
}
