use spotline_core::SlotPosition;
use spotline_plan::EntryCount;

use crate::context::{MaterialCandidate, PolicyContext};
use crate::contracts::ScorerPlugin;

/// Scores by remaining absolute inventory; ratio entries score one
#[derive(Debug, Clone, Copy, Default)]
pub struct RemainingCountScorer;

impl ScorerPlugin for RemainingCountScorer {
    fn score(
        &self,
        ctx: &PolicyContext<'_>,
        slot: SlotPosition,
        candidate: &MaterialCandidate,
    ) -> f64 {
        match ctx.remaining(&candidate.ad, slot).map(EntryCount::classify) {
            Some(EntryCount::Absolute(count)) => count as f64,
            Some(EntryCount::Ratio(_)) => 1.0,
            Some(EntryCount::Invalid(_)) | None => 0.0,
        }
    }
}
