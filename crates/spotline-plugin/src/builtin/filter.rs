use spotline_core::SlotPosition;

use crate::context::{MaterialCandidate, PolicyContext};
use crate::contracts::FilterPlugin;
use crate::errors::PluginResult;

/// Drops candidates whose entry in the slice is already at zero
#[derive(Debug, Clone, Copy, Default)]
pub struct ExhaustedFilter;

impl FilterPlugin for ExhaustedFilter {
    fn filter(
        &self,
        ctx: &PolicyContext<'_>,
        slot: SlotPosition,
        mut candidates: Vec<MaterialCandidate>,
    ) -> PluginResult<Vec<MaterialCandidate>> {
        candidates.retain(|candidate| ctx.remaining(&candidate.ad, slot) != Some(0));
        Ok(candidates)
    }
}
