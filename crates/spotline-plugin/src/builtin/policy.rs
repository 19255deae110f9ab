use std::cmp::Ordering;

use tracing::trace;

use crate::context::{MaterialCandidate, PolicyContext, PositionQueue};
use crate::contracts::PolicyPlugin;
use crate::errors::PluginResult;

/// Releases the dispatch plan in slot order
///
/// For each slot of the slice, starting at zero, the candidates are the ads
/// with a non-zero entry and a known creative. The pipeline's filters run in
/// order, then the best candidate by summed scorer output (ties broken by
/// the larger remaining count, then by ad order) takes the slot. The queue
/// stops at the first slot without a candidate, so queue index and slot
/// always agree. Every target position receives the same queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOrderPolicy;

impl PolicyPlugin for PlanOrderPolicy {
    fn select(&self, ctx: &PolicyContext<'_>) -> PluginResult<Vec<PositionQueue>> {
        let Some(slice) = ctx.slice else {
            return Ok(Vec::new());
        };
        let Some(max_slot) = slice.max_slot() else {
            return Ok(Vec::new());
        };

        let mut queue = Vec::new();
        for slot in 0..=max_slot {
            let mut candidates: Vec<MaterialCandidate> = slice
                .ads_at(slot)
                .filter(|(_, count)| *count != 0)
                .filter_map(|(ad, _)| ctx.creatives.get(&ad).map(MaterialCandidate::from_creative))
                .collect();
            for filter in ctx.filters {
                candidates = filter.filter(ctx, slot, candidates)?;
            }

            let best = candidates
                .into_iter()
                .map(|candidate| {
                    let score: f64 = ctx
                        .scorers
                        .iter()
                        .map(|scorer| scorer.score(ctx, slot, &candidate))
                        .sum();
                    let remaining = ctx.remaining(&candidate.ad, slot).unwrap_or(0);
                    (score, remaining, candidate)
                })
                .reduce(|best, next| match next.0.total_cmp(&best.0) {
                    Ordering::Greater => next,
                    Ordering::Equal if next.1 > best.1 => next,
                    _ => best,
                });

            match best {
                Some((_, _, candidate)) => queue.push(candidate),
                None => {
                    trace!(slot, "No candidate for slot, queue ends");
                    break;
                }
            }
        }

        Ok(ctx
            .target_positions()
            .into_iter()
            .map(|position| PositionQueue {
                position,
                candidates: queue.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;

    use spotline_core::{
        Ad, CreativeTypeId, GroupId, MaterialId, MediaId, PositionId, PositionOrGroup, TimeBucket,
    };
    use spotline_plan::DispatchSlice;

    use super::*;
    use crate::builtin::{ExhaustedFilter, RemainingCountScorer};
    use crate::contracts::{FilterPlugin, ScorerPlugin};
    use crate::pipeline::{Creative, Group};

    const A: Ad = Ad::new(1, 1, 1, 1);
    const B: Ad = Ad::new(2, 2, 2, 2);

    struct Tables {
        slice: DispatchSlice,
        creatives: HashMap<Ad, Creative>,
        groups: HashMap<GroupId, Group>,
        parameters: BTreeMap<String, String>,
        filters: Vec<Arc<dyn FilterPlugin>>,
        scorers: Vec<Arc<dyn ScorerPlugin>>,
    }

    fn creative(ad: Ad, material: u64) -> Creative {
        Creative {
            ad,
            material: MaterialId::new(material),
            creative_type: CreativeTypeId::new(1),
            attributes: BTreeMap::new(),
        }
    }

    fn tables(entries: &[(Ad, u32, i64)]) -> Tables {
        let mut slice = DispatchSlice {
            bucket: TimeBucket::from_epoch_minutes(1),
            media: MediaId::new(1),
            entries: BTreeMap::new(),
        };
        for (ad, slot, count) in entries {
            slice.entries.entry(*ad).or_default().insert(*slot, *count);
        }
        Tables {
            slice,
            creatives: HashMap::from([(A, creative(A, 100)), (B, creative(B, 200))]),
            groups: HashMap::from([(
                GroupId::new(5),
                Group {
                    id: GroupId::new(5),
                    media: MediaId::new(1),
                    code: "pair".to_string(),
                    positions: vec![PositionId::new(1), PositionId::new(2)],
                },
            )]),
            parameters: BTreeMap::new(),
            filters: vec![Arc::new(ExhaustedFilter)],
            scorers: vec![Arc::new(RemainingCountScorer)],
        }
    }

    fn select(tables: &Tables, target: PositionOrGroup, with_slice: bool) -> Vec<PositionQueue> {
        let positions = HashMap::new();
        let null = serde_json::Value::Null;
        let ctx = PolicyContext {
            media: MediaId::new(1),
            bucket: tables.slice.bucket,
            target,
            cookie: "cookie",
            parameters: &tables.parameters,
            pipelines: &[],
            positions: &positions,
            groups: &tables.groups,
            targeting: &null,
            ip_libraries: &null,
            slice: with_slice.then_some(&tables.slice),
            serializer_mappings: &[],
            creatives: &tables.creatives,
            filters: &tables.filters,
            scorers: &tables.scorers,
        };
        PlanOrderPolicy.select(&ctx).unwrap()
    }

    #[test]
    fn test_queue_follows_slots_and_scores() {
        let tables = tables(&[(A, 0, 2), (B, 0, 5), (A, 1, 1), (B, 2, 3)]);
        let queues = select(&tables, PositionOrGroup::Position(PositionId::new(1)), true);

        assert_eq!(queues.len(), 1);
        let ads: Vec<Ad> = queues[0].candidates.iter().map(|c| c.ad).collect();
        assert_eq!(ads, vec![B, A, B]);
    }

    #[test]
    fn test_queue_stops_at_exhausted_slot() {
        let tables = tables(&[(A, 0, 0), (A, 1, 4)]);
        let queues = select(&tables, PositionOrGroup::Position(PositionId::new(1)), true);
        assert!(queues[0].candidates.is_empty());
    }

    #[test]
    fn test_group_expands_to_member_positions() {
        let tables = tables(&[(A, 0, -20)]);
        let queues = select(&tables, PositionOrGroup::Group(GroupId::new(5)), true);

        let positions: Vec<PositionId> = queues.iter().map(|q| q.position).collect();
        assert_eq!(positions, vec![PositionId::new(1), PositionId::new(2)]);
        assert!(queues.iter().all(|q| q.candidates.len() == 1));
    }

    #[test]
    fn test_missing_slice_yields_nothing() {
        let tables = tables(&[(A, 0, 2)]);
        assert!(select(&tables, PositionOrGroup::Position(PositionId::new(1)), false).is_empty());
    }
}
