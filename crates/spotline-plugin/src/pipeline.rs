//! Pipeline configuration and the reference data plugins read
//!
//! These are the read-only tables a configuration refresh publishes. They
//! carry no behavior beyond lookups.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use spotline_core::{Ad, CreativeTypeId, GroupId, MaterialId, MediaId, PositionId, PositionOrGroup};

use crate::version::PluginReference;

/// Plugin bindings for one `(media, position-or-group)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfiguration {
    /// Media the pipeline serves
    pub media: MediaId,
    /// Position or group the pipeline serves
    pub target: PositionOrGroup,
    /// Policy plugin
    pub policy: PluginReference,
    /// Filters the policy may use
    #[serde(default)]
    pub filters: Vec<PluginReference>,
    /// Scorers the policy may use
    #[serde(default)]
    pub scorers: Vec<PluginReference>,
    /// Serializers the pipeline allows
    #[serde(default)]
    pub serializers: Vec<PluginReference>,
}

impl PipelineConfiguration {
    /// Returns true if the pipeline serves `(media, target)`
    pub fn serves(&self, media: MediaId, target: PositionOrGroup) -> bool {
        self.media == media && self.target == target
    }
}

/// Ad position within a media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Position id
    pub id: PositionId,
    /// Owning media
    pub media: MediaId,
    /// Human-readable code
    pub code: String,
    /// Group the position belongs to, if any
    #[serde(default)]
    pub group: Option<GroupId>,
}

/// Group of positions served together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group id
    pub id: GroupId,
    /// Owning media
    pub media: MediaId,
    /// Human-readable code
    pub code: String,
    /// Member positions, in serving order
    pub positions: Vec<PositionId>,
}

/// Material resolved for an ad
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creative {
    /// Ad the material belongs to
    pub ad: Ad,
    /// Material id
    pub material: MaterialId,
    /// Creative type of the material
    pub creative_type: CreativeTypeId,
    /// Free-form attributes handed to serializers
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Level of the serialization chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializerLevel {
    /// One material
    Ad,
    /// All materials of one position
    Position,
    /// All positions of the response
    Global,
}

/// Serializer binding, optionally narrowed to a position or creative type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializerMapping {
    /// Level the mapping applies to
    pub level: SerializerLevel,
    /// Position the mapping is restricted to; `None` matches any
    #[serde(default)]
    pub position: Option<PositionId>,
    /// Creative type the mapping is restricted to; `None` matches any
    #[serde(default)]
    pub creative_type: Option<CreativeTypeId>,
    /// Serializer to use
    pub serializer: PluginReference,
    /// Extension values handed to the serializer
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

impl SerializerMapping {
    /// Returns the specificity of the match, or `None` if it does not apply
    pub fn matches(
        &self,
        level: SerializerLevel,
        position: Option<PositionId>,
        creative_type: Option<CreativeTypeId>,
    ) -> Option<u8> {
        if self.level != level {
            return None;
        }
        let mut specificity = 0;
        if let Some(required) = self.position {
            if position != Some(required) {
                return None;
            }
            specificity += 2;
        }
        if let Some(required) = self.creative_type {
            if creative_type != Some(required) {
                return None;
            }
            specificity += 1;
        }
        Some(specificity)
    }
}

/// Most specific mapping for a level, earliest wins on ties
pub fn best_mapping(
    mappings: &[SerializerMapping],
    level: SerializerLevel,
    position: Option<PositionId>,
    creative_type: Option<CreativeTypeId>,
) -> Option<&SerializerMapping> {
    let mut best: Option<(u8, &SerializerMapping)> = None;
    for mapping in mappings {
        if let Some(specificity) = mapping.matches(level, position, creative_type) {
            if best.map_or(true, |(current, _)| specificity > current) {
                best = Some((specificity, mapping));
            }
        }
    }
    best.map(|(_, mapping)| mapping)
}
