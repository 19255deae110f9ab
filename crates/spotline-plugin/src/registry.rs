//! Versioned plugin registry
//!
//! Plugins are registered explicitly at start-up (or later, for a hot
//! upgrade) and looked up by `(kind, id)`. Each `(kind, id)` holds a
//! version-ordered map, so "highest version at or above the minimum" is a
//! range query.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::RwLock` because lookups are read-mostly, short and
//! never held across `.await` points. Resolved plugins are `Arc` clones, so
//! plugin calls run outside the lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::contracts::{
    FilterPlugin, PluginInstance, PolicyPlugin, ScorerPlugin, SerializerPlugin,
    SerializerSelectorPlugin,
};
use crate::errors::{PluginError, PluginResult};
use crate::version::{PluginId, PluginKind, PluginReference, PluginVersion};

type Versions<T> = HashMap<PluginId, BTreeMap<PluginVersion, Arc<T>>>;

/// A resolved plugin with the version that satisfied the lookup
pub struct Resolved<T: ?Sized> {
    /// Plugin id
    pub id: PluginId,
    /// Version that was picked
    pub version: PluginVersion,
    /// The implementation
    pub plugin: Arc<T>,
}

impl<T: ?Sized> std::fmt::Debug for Resolved<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("id", &self.id)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> Clone for Resolved<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            version: self.version,
            plugin: Arc::clone(&self.plugin),
        }
    }
}

#[derive(Default)]
struct Slots {
    policies: Versions<dyn PolicyPlugin>,
    filters: Versions<dyn FilterPlugin>,
    scorers: Versions<dyn ScorerPlugin>,
    serializers: Versions<dyn SerializerPlugin>,
    selectors: Versions<dyn SerializerSelectorPlugin>,
}

fn insert<T: ?Sized>(
    slots: &mut Versions<T>,
    id: PluginId,
    version: PluginVersion,
    plugin: Arc<T>,
) -> bool {
    slots.entry(id).or_default().insert(version, plugin).is_some()
}

fn best<T: ?Sized>(
    slots: &Versions<T>,
    kind: PluginKind,
    id: &PluginId,
    minimum: PluginVersion,
) -> PluginResult<Resolved<T>> {
    slots
        .get(id)
        .and_then(|versions| versions.range(minimum..).next_back())
        .map(|(version, plugin)| Resolved {
            id: id.clone(),
            version: *version,
            plugin: Arc::clone(plugin),
        })
        .ok_or_else(|| PluginError::NotFound {
            kind,
            id: id.clone(),
            minimum,
        })
}

fn versions_of<T: ?Sized>(slots: &Versions<T>, id: &PluginId) -> Vec<PluginVersion> {
    slots
        .get(id)
        .map(|versions| versions.keys().copied().collect())
        .unwrap_or_default()
}

/// Registry of plugin implementations keyed by kind, id and version
#[derive(Default)]
pub struct PluginRegistry {
    slots: RwLock<Slots>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.len())
            .finish()
    }
}

impl PluginRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under `(instance kind, id, version)`
    ///
    /// Registering an existing `(kind, id, version)` replaces it.
    pub fn register(
        &self,
        id: impl Into<PluginId>,
        version: PluginVersion,
        instance: PluginInstance,
    ) {
        let id = id.into();
        let kind = instance.kind();
        let mut slots = self.slots.write();
        let replaced = match instance {
            PluginInstance::Policy(plugin) => insert(&mut slots.policies, id.clone(), version, plugin),
            PluginInstance::Filter(plugin) => insert(&mut slots.filters, id.clone(), version, plugin),
            PluginInstance::Scorer(plugin) => insert(&mut slots.scorers, id.clone(), version, plugin),
            PluginInstance::Serializer(plugin) => {
                insert(&mut slots.serializers, id.clone(), version, plugin)
            }
            PluginInstance::SerializerSelector(plugin) => {
                insert(&mut slots.selectors, id.clone(), version, plugin)
            }
        };
        if replaced {
            info!(%kind, plugin = %id, %version, "Plugin replaced");
        } else {
            debug!(%kind, plugin = %id, %version, "Plugin registered");
        }
    }

    /// Highest policy version `>= minimum`
    pub fn resolve_policy(
        &self,
        id: &PluginId,
        minimum: PluginVersion,
    ) -> PluginResult<Resolved<dyn PolicyPlugin>> {
        best(&self.slots.read().policies, PluginKind::Policy, id, minimum)
    }

    /// Highest filter version `>= minimum`
    pub fn resolve_filter(
        &self,
        id: &PluginId,
        minimum: PluginVersion,
    ) -> PluginResult<Resolved<dyn FilterPlugin>> {
        best(&self.slots.read().filters, PluginKind::Filter, id, minimum)
    }

    /// Highest scorer version `>= minimum`
    pub fn resolve_scorer(
        &self,
        id: &PluginId,
        minimum: PluginVersion,
    ) -> PluginResult<Resolved<dyn ScorerPlugin>> {
        best(&self.slots.read().scorers, PluginKind::Scorer, id, minimum)
    }

    /// Highest serializer version `>= minimum`
    pub fn resolve_serializer(
        &self,
        id: &PluginId,
        minimum: PluginVersion,
    ) -> PluginResult<Resolved<dyn SerializerPlugin>> {
        best(&self.slots.read().serializers, PluginKind::Serializer, id, minimum)
    }

    /// Highest serializer selector version `>= minimum`
    pub fn resolve_selector(
        &self,
        id: &PluginId,
        minimum: PluginVersion,
    ) -> PluginResult<Resolved<dyn SerializerSelectorPlugin>> {
        best(
            &self.slots.read().selectors,
            PluginKind::SerializerSelector,
            id,
            minimum,
        )
    }

    /// Resolve a reference of any kind
    pub fn resolve(&self, reference: &PluginReference) -> PluginResult<(PluginVersion, PluginInstance)> {
        let id = &reference.id;
        let minimum = reference.minimum;
        Ok(match reference.kind {
            PluginKind::Policy => {
                let resolved = self.resolve_policy(id, minimum)?;
                (resolved.version, PluginInstance::Policy(resolved.plugin))
            }
            PluginKind::Filter => {
                let resolved = self.resolve_filter(id, minimum)?;
                (resolved.version, PluginInstance::Filter(resolved.plugin))
            }
            PluginKind::Scorer => {
                let resolved = self.resolve_scorer(id, minimum)?;
                (resolved.version, PluginInstance::Scorer(resolved.plugin))
            }
            PluginKind::Serializer => {
                let resolved = self.resolve_serializer(id, minimum)?;
                (resolved.version, PluginInstance::Serializer(resolved.plugin))
            }
            PluginKind::SerializerSelector => {
                let resolved = self.resolve_selector(id, minimum)?;
                (
                    resolved.version,
                    PluginInstance::SerializerSelector(resolved.plugin),
                )
            }
        })
    }

    /// Check that a reference is of `expected` kind
    pub fn check_kind(reference: &PluginReference, expected: PluginKind) -> PluginResult<()> {
        if reference.kind == expected {
            Ok(())
        } else {
            Err(PluginError::KindMismatch {
                id: reference.id.clone(),
                expected,
                found: reference.kind,
            })
        }
    }

    /// Registered versions of `(kind, id)`, ascending
    pub fn versions(&self, kind: PluginKind, id: &PluginId) -> Vec<PluginVersion> {
        let slots = self.slots.read();
        match kind {
            PluginKind::Policy => versions_of(&slots.policies, id),
            PluginKind::Filter => versions_of(&slots.filters, id),
            PluginKind::Scorer => versions_of(&slots.scorers, id),
            PluginKind::Serializer => versions_of(&slots.serializers, id),
            PluginKind::SerializerSelector => versions_of(&slots.selectors, id),
        }
    }

    /// Number of registered `(kind, id, version)` entries
    pub fn len(&self) -> usize {
        PluginKind::ALL.into_iter().map(|kind| self.len_of(kind)).sum()
    }

    /// Number of registered `(id, version)` entries of one kind
    pub fn len_of(&self, kind: PluginKind) -> usize {
        fn count<T: ?Sized>(slots: &Versions<T>) -> usize {
            slots.values().map(BTreeMap::len).sum()
        }
        let slots = self.slots.read();
        match kind {
            PluginKind::Policy => count(&slots.policies),
            PluginKind::Filter => count(&slots.filters),
            PluginKind::Scorer => count(&slots.scorers),
            PluginKind::Serializer => count(&slots.serializers),
            PluginKind::SerializerSelector => count(&slots.selectors),
        }
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
