//! Values passed into and out of plugins

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use spotline_core::{
    Ad, CreativeTypeId, GroupId, MaterialId, MediaId, PositionId, PositionOrGroup, SlotPosition,
    TimeBucket,
};
use spotline_plan::DispatchSlice;

use crate::contracts::{FilterPlugin, ScorerPlugin};
use crate::pipeline::{Creative, Group, PipelineConfiguration, Position, SerializerMapping};
use crate::version::{PluginId, PluginVersion};

/// Request parameters, by name
pub type Parameters = BTreeMap<String, String>;

/// Everything a policy may read to choose candidates for one position code
///
/// Borrowed from the request and the current configuration snapshot; a
/// policy never outlives the request that built its context.
#[derive(Clone)]
pub struct PolicyContext<'a> {
    /// Requesting media
    pub media: MediaId,
    /// Bucket the request is served against
    pub bucket: TimeBucket,
    /// Position or group the code resolved to
    pub target: PositionOrGroup,
    /// Viewer cookie
    pub cookie: &'a str,
    /// Request parameters
    pub parameters: &'a Parameters,
    /// All pipeline configurations of the snapshot
    pub pipelines: &'a [PipelineConfiguration],
    /// Position table
    pub positions: &'a HashMap<PositionId, Position>,
    /// Group table
    pub groups: &'a HashMap<GroupId, Group>,
    /// Targeting definitions, opaque to the runtime
    pub targeting: &'a serde_json::Value,
    /// IP libraries, opaque to the runtime
    pub ip_libraries: &'a serde_json::Value,
    /// Dispatch plan of the media in the current bucket
    pub slice: Option<&'a DispatchSlice>,
    /// Serializer mappings
    pub serializer_mappings: &'a [SerializerMapping],
    /// Creatives by ad
    pub creatives: &'a HashMap<Ad, Creative>,
    /// Filters the pipeline allows
    pub filters: &'a [Arc<dyn FilterPlugin>],
    /// Scorers the pipeline allows
    pub scorers: &'a [Arc<dyn ScorerPlugin>],
}

impl<'a> PolicyContext<'a> {
    /// Positions the target expands to, in serving order
    ///
    /// A group with no entry in the group table expands to nothing.
    pub fn target_positions(&self) -> Vec<PositionId> {
        match self.target {
            PositionOrGroup::Position(position) => vec![position],
            PositionOrGroup::Group(group) => self
                .groups
                .get(&group)
                .map(|group| group.positions.clone())
                .unwrap_or_default(),
        }
    }

    /// Count in the dispatch slice at a coordinate
    pub fn remaining(&self, ad: &Ad, slot: SlotPosition) -> Option<i64> {
        self.slice.and_then(|slice| slice.count(ad, slot))
    }
}

impl std::fmt::Debug for PolicyContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyContext")
            .field("media", &self.media)
            .field("bucket", &self.bucket)
            .field("target", &self.target)
            .field("has_slice", &self.slice.is_some())
            .field("filters", &self.filters.len())
            .field("scorers", &self.scorers.len())
            .finish_non_exhaustive()
    }
}

/// Material a policy proposes for a queue slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialCandidate {
    /// Ad to allocate
    pub ad: Ad,
    /// Material to release
    pub material: MaterialId,
    /// Creative type of the material
    pub creative_type: CreativeTypeId,
}

impl MaterialCandidate {
    /// Candidate for a creative
    pub fn from_creative(creative: &Creative) -> Self {
        Self {
            ad: creative.ad,
            material: creative.material,
            creative_type: creative.creative_type,
        }
    }
}

/// Ordered candidates for one position; index is the sequence index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionQueue {
    /// Position the queue fills
    pub position: PositionId,
    /// Candidates in sequence order
    pub candidates: Vec<MaterialCandidate>,
}

/// Result of one granted allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRelease {
    /// Allocated ad
    pub ad: Ad,
    /// Released material
    pub material: MaterialId,
    /// Creative type of the material
    pub creative_type: CreativeTypeId,
    /// Position the material fills
    pub position: PositionId,
    /// Sequence index within the position
    pub sequence: SlotPosition,
    /// Policy that produced the release
    pub policy: PluginId,
    /// Version of that policy
    pub policy_version: PluginVersion,
}
