//! Plugin contracts
//!
//! All contracts are synchronous: plugins run inside the request's own
//! thread of control and must not block on I/O belonging to anything else.

use std::sync::Arc;

use spotline_core::{CreativeTypeId, PositionId, SlotPosition};

use crate::context::{MaterialCandidate, MaterialRelease, Parameters, PolicyContext, PositionQueue};
use crate::errors::PluginResult;
use crate::pipeline::{SerializerLevel, SerializerMapping};
use crate::version::{PluginKind, PluginReference};

/// Chooses ordered candidate queues for a position code
pub trait PolicyPlugin: Send + Sync {
    /// One queue per matched position
    fn select(&self, ctx: &PolicyContext<'_>) -> PluginResult<Vec<PositionQueue>>;
}

/// Narrows the candidates for one queue slot
pub trait FilterPlugin: Send + Sync {
    /// Candidates that survive the filter, order preserved
    fn filter(
        &self,
        ctx: &PolicyContext<'_>,
        slot: SlotPosition,
        candidates: Vec<MaterialCandidate>,
    ) -> PluginResult<Vec<MaterialCandidate>>;
}

/// Scores a candidate for one queue slot; higher is better
pub trait ScorerPlugin: Send + Sync {
    /// Score of the candidate
    fn score(&self, ctx: &PolicyContext<'_>, slot: SlotPosition, candidate: &MaterialCandidate)
        -> f64;
}

/// Chooses the serializer for one level of the chain
pub trait SerializerSelectorPlugin: Send + Sync {
    /// Serializer reference to resolve
    fn select(
        &self,
        parameters: &Parameters,
        mappings: &[SerializerMapping],
        position: Option<PositionId>,
        creative_type: Option<CreativeTypeId>,
        level: SerializerLevel,
    ) -> PluginResult<PluginReference>;
}

/// Renders the three levels of the response
pub trait SerializerPlugin: Send + Sync {
    /// Render one released material
    fn serialize_ad(
        &self,
        release: &MaterialRelease,
        mappings: &[SerializerMapping],
    ) -> PluginResult<String>;

    /// Render one position from its rendered ads, in sequence order
    fn serialize_position(
        &self,
        position: PositionId,
        ads: &[String],
        mappings: &[SerializerMapping],
    ) -> PluginResult<String>;

    /// Render the response from the rendered positions
    fn serialize_global(
        &self,
        positions: &[(PositionId, String)],
        mappings: &[SerializerMapping],
    ) -> PluginResult<String>;
}

/// A plugin implementation tagged with its kind
#[derive(Clone)]
pub enum PluginInstance {
    /// Policy implementation
    Policy(Arc<dyn PolicyPlugin>),
    /// Filter implementation
    Filter(Arc<dyn FilterPlugin>),
    /// Scorer implementation
    Scorer(Arc<dyn ScorerPlugin>),
    /// Serializer implementation
    Serializer(Arc<dyn SerializerPlugin>),
    /// Serializer selector implementation
    SerializerSelector(Arc<dyn SerializerSelectorPlugin>),
}

impl PluginInstance {
    /// Kind of the wrapped implementation
    pub fn kind(&self) -> PluginKind {
        match self {
            PluginInstance::Policy(_) => PluginKind::Policy,
            PluginInstance::Filter(_) => PluginKind::Filter,
            PluginInstance::Scorer(_) => PluginKind::Scorer,
            PluginInstance::Serializer(_) => PluginKind::Serializer,
            PluginInstance::SerializerSelector(_) => PluginKind::SerializerSelector,
        }
    }

    /// Wrap a policy
    pub fn policy(plugin: impl PolicyPlugin + 'static) -> Self {
        Self::Policy(Arc::new(plugin))
    }

    /// Wrap a filter
    pub fn filter(plugin: impl FilterPlugin + 'static) -> Self {
        Self::Filter(Arc::new(plugin))
    }

    /// Wrap a scorer
    pub fn scorer(plugin: impl ScorerPlugin + 'static) -> Self {
        Self::Scorer(Arc::new(plugin))
    }

    /// Wrap a serializer
    pub fn serializer(plugin: impl SerializerPlugin + 'static) -> Self {
        Self::Serializer(Arc::new(plugin))
    }

    /// Wrap a serializer selector
    pub fn serializer_selector(plugin: impl SerializerSelectorPlugin + 'static) -> Self {
        Self::SerializerSelector(Arc::new(plugin))
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PluginInstance::{}", self.kind())
    }
}
