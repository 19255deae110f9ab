//! Scripted plugins
//!
//! Plugin doubles with fixed, observable behavior: a policy that returns a
//! preset queue, policies that panic or fail, a serializer that fails at a
//! chosen level, and a policy that cancels its own request.

use std::sync::atomic::{AtomicUsize, Ordering};

use spotline_core::PositionId;
use spotline_plugin::builtin::JsonSerializer;
use spotline_plugin::{
    MaterialCandidate, MaterialRelease, PluginError, PluginResult, PolicyContext, PolicyPlugin,
    PositionQueue, SerializerLevel, SerializerMapping, SerializerPlugin,
};
use tokio_util::sync::CancellationToken;

/// Returns the same preset queue for every target position
#[derive(Debug, Default)]
pub struct ScriptedPolicy {
    candidates: Vec<MaterialCandidate>,
    calls: AtomicUsize,
}

impl ScriptedPolicy {
    /// Policy proposing `candidates` in order
    pub fn new(candidates: Vec<MaterialCandidate>) -> Self {
        Self {
            candidates,
            calls: AtomicUsize::new(0),
        }
    }

    /// Times the policy was invoked
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PolicyPlugin for ScriptedPolicy {
    fn select(&self, ctx: &PolicyContext<'_>) -> PluginResult<Vec<PositionQueue>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ctx
            .target_positions()
            .into_iter()
            .map(|position| PositionQueue {
                position,
                candidates: self.candidates.clone(),
            })
            .collect())
    }
}

/// Panics on every call
#[derive(Debug, Clone)]
pub struct PanickingPolicy {
    message: String,
}

impl PanickingPolicy {
    /// Policy panicking with `message`
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl PolicyPlugin for PanickingPolicy {
    fn select(&self, _ctx: &PolicyContext<'_>) -> PluginResult<Vec<PositionQueue>> {
        panic!("{}", self.message)
    }
}

/// Returns an error on every call
#[derive(Debug, Clone)]
pub struct FailingPolicy {
    id: String,
}

impl FailingPolicy {
    /// Policy failing as plugin `id`
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl PolicyPlugin for FailingPolicy {
    fn select(&self, _ctx: &PolicyContext<'_>) -> PluginResult<Vec<PositionQueue>> {
        Err(PluginError::failed(self.id.as_str(), "scripted failure"))
    }
}

/// Cancels the request token, then behaves like the wrapped policy
pub struct CancellingPolicy<P> {
    token: CancellationToken,
    inner: P,
}

impl<P> CancellingPolicy<P> {
    /// Policy cancelling `token` before delegating to `inner`
    pub fn new(token: CancellationToken, inner: P) -> Self {
        Self { token, inner }
    }
}

impl<P: PolicyPlugin> PolicyPlugin for CancellingPolicy<P> {
    fn select(&self, ctx: &PolicyContext<'_>) -> PluginResult<Vec<PositionQueue>> {
        self.token.cancel();
        self.inner.select(ctx)
    }
}

/// JSON serializer that fails at one level, optionally for one position
#[derive(Debug, Clone)]
pub struct LevelFailingSerializer {
    level: SerializerLevel,
    position: Option<PositionId>,
}

impl LevelFailingSerializer {
    /// Fail every call at `level`
    pub fn at(level: SerializerLevel) -> Self {
        Self {
            level,
            position: None,
        }
    }

    /// Fail calls at `level` for `position` only
    pub fn at_position(level: SerializerLevel, position: PositionId) -> Self {
        Self {
            level,
            position: Some(position),
        }
    }

    fn check(&self, level: SerializerLevel, position: Option<PositionId>) -> PluginResult<()> {
        let position_matches = self.position.is_none() || self.position == position;
        if level == self.level && position_matches {
            Err(PluginError::failed("failing-serializer", format!("{level:?} refused")))
        } else {
            Ok(())
        }
    }
}

impl SerializerPlugin for LevelFailingSerializer {
    fn serialize_ad(
        &self,
        release: &MaterialRelease,
        mappings: &[SerializerMapping],
    ) -> PluginResult<String> {
        self.check(SerializerLevel::Ad, Some(release.position))?;
        JsonSerializer.serialize_ad(release, mappings)
    }

    fn serialize_position(
        &self,
        position: PositionId,
        ads: &[String],
        mappings: &[SerializerMapping],
    ) -> PluginResult<String> {
        self.check(SerializerLevel::Position, Some(position))?;
        JsonSerializer.serialize_position(position, ads, mappings)
    }

    fn serialize_global(
        &self,
        positions: &[(PositionId, String)],
        mappings: &[SerializerMapping],
    ) -> PluginResult<String> {
        self.check(SerializerLevel::Global, None)?;
        JsonSerializer.serialize_global(positions, mappings)
    }
}
