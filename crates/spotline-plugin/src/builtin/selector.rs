use spotline_core::{CreativeTypeId, PositionId};

use crate::context::Parameters;
use crate::contracts::SerializerSelectorPlugin;
use crate::errors::PluginResult;
use crate::pipeline::{best_mapping, SerializerLevel, SerializerMapping};
use crate::version::{PluginKind, PluginReference, PluginVersion};

/// Request parameter naming a serializer to force for every level
pub const SERIALIZER_PARAMETER: &str = "serializer";

/// Picks the most specific mapping, falling back to a fixed serializer
#[derive(Debug, Clone)]
pub struct StaticSelector {
    fallback: PluginReference,
}

impl StaticSelector {
    /// Selector falling back to `fallback` when no mapping matches
    pub fn new(fallback: PluginReference) -> Self {
        Self { fallback }
    }
}

impl SerializerSelectorPlugin for StaticSelector {
    fn select(
        &self,
        parameters: &Parameters,
        mappings: &[SerializerMapping],
        position: Option<PositionId>,
        creative_type: Option<CreativeTypeId>,
        level: SerializerLevel,
    ) -> PluginResult<PluginReference> {
        if let Some(forced) = parameters.get(SERIALIZER_PARAMETER) {
            return Ok(PluginReference::new(
                PluginKind::Serializer,
                forced.as_str(),
                PluginVersion::ZERO,
            ));
        }
        Ok(best_mapping(mappings, level, position, creative_type)
            .map(|mapping| mapping.serializer.clone())
            .unwrap_or_else(|| self.fallback.clone()))
    }
}
