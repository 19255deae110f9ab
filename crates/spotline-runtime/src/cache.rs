//! Configuration cache
//!
//! Readers take an `Arc<ConfigSnapshot>` and keep it for the whole request,
//! so they always see one complete, consistent snapshot. A refresh fetches
//! every collection concurrently, builds a new snapshot that replaces only
//! the collections that fetched successfully, and publishes it with a
//! single pointer swap.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::RwLock` around the published `Arc` because:
//! 1. Readers clone the `Arc` and release immediately
//! 2. The writer swaps a pointer; the new snapshot is built outside the lock
//! 3. The lock is never held across `.await` points

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use spotline_core::{Ad, GroupId, MediaId, PositionId, PositionOrGroup};
use spotline_plugin::builtin::static_selector_reference;
use spotline_plugin::{
    Creative, Group, PipelineConfiguration, PluginReference, Position, SerializerMapping,
};

use crate::errors::SourceError;
use crate::sources::{CodeEntry, ConfigSource};

/// Immutable view of every configuration collection
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// Monotonic publish counter; zero is the empty start-up snapshot
    pub version: u64,
    /// Pipeline bindings
    pub pipelines: Arc<Vec<PipelineConfiguration>>,
    /// `media → code → target`
    pub code_tables: Arc<HashMap<MediaId, HashMap<String, PositionOrGroup>>>,
    /// Position table
    pub positions: Arc<HashMap<PositionId, Position>>,
    /// Group table
    pub groups: Arc<HashMap<GroupId, Group>>,
    /// Creatives by ad
    pub creatives: Arc<HashMap<Ad, Creative>>,
    /// Serializer mappings
    pub serializer_mappings: Arc<Vec<SerializerMapping>>,
    /// Serializer selector
    pub selector: PluginReference,
    /// Targeting definitions
    pub targeting: Arc<serde_json::Value>,
    /// IP libraries
    pub ip_libraries: Arc<serde_json::Value>,
    /// Named settings of this service
    pub settings: Arc<BTreeMap<String, String>>,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            version: 0,
            pipelines: Arc::default(),
            code_tables: Arc::default(),
            positions: Arc::default(),
            groups: Arc::default(),
            creatives: Arc::default(),
            serializer_mappings: Arc::default(),
            selector: static_selector_reference(),
            targeting: Arc::new(serde_json::Value::Null),
            ip_libraries: Arc::new(serde_json::Value::Null),
            settings: Arc::default(),
        }
    }
}

impl ConfigSnapshot {
    /// Target a media's code names
    pub fn resolve_code(&self, media: MediaId, code: &str) -> Option<PositionOrGroup> {
        self.code_tables.get(&media)?.get(code).copied()
    }

    /// Pipeline bound to `(media, target)`
    pub fn pipeline(&self, media: MediaId, target: PositionOrGroup) -> Option<&PipelineConfiguration> {
        self.pipelines.iter().find(|pipeline| pipeline.serves(media, target))
    }

    /// Named setting parsed as a positive number of minutes
    pub fn setting_minutes(&self, name: &str) -> Option<u64> {
        let raw = self.settings.get(name)?;
        match raw.trim().parse::<u64>() {
            Ok(minutes) if minutes > 0 => Some(minutes),
            _ => {
                warn!(setting = name, value = %raw, "Ignoring invalid interval setting");
                None
            }
        }
    }

    /// Replace the code tables from rows
    pub fn with_codes(mut self, codes: Vec<CodeEntry>) -> Self {
        self.code_tables = Arc::new(index_codes(codes));
        self
    }

    /// Replace the pipelines
    pub fn with_pipelines(mut self, pipelines: Vec<PipelineConfiguration>) -> Self {
        self.pipelines = Arc::new(pipelines);
        self
    }

    /// Replace the position table
    pub fn with_positions(mut self, positions: Vec<Position>) -> Self {
        self.positions = Arc::new(positions.into_iter().map(|p| (p.id, p)).collect());
        self
    }

    /// Replace the group table
    pub fn with_groups(mut self, groups: Vec<Group>) -> Self {
        self.groups = Arc::new(groups.into_iter().map(|g| (g.id, g)).collect());
        self
    }

    /// Replace the creatives
    pub fn with_creatives(mut self, creatives: Vec<Creative>) -> Self {
        self.creatives = Arc::new(creatives.into_iter().map(|c| (c.ad, c)).collect());
        self
    }

    /// Replace the serializer mappings
    pub fn with_serializer_mappings(mut self, mappings: Vec<SerializerMapping>) -> Self {
        self.serializer_mappings = Arc::new(mappings);
        self
    }

    /// Replace the serializer selector
    pub fn with_selector(mut self, selector: PluginReference) -> Self {
        self.selector = selector;
        self
    }

    /// Replace the named settings
    pub fn with_settings(mut self, settings: BTreeMap<String, String>) -> Self {
        self.settings = Arc::new(settings);
        self
    }
}

fn index_codes(codes: Vec<CodeEntry>) -> HashMap<MediaId, HashMap<String, PositionOrGroup>> {
    let mut tables: HashMap<MediaId, HashMap<String, PositionOrGroup>> = HashMap::new();
    for entry in codes {
        tables.entry(entry.media).or_default().insert(entry.code, entry.target);
    }
    tables
}

/// Outcome of one refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Version published by the refresh
    pub version: u64,
    /// Collections replaced
    pub updated: Vec<&'static str>,
    /// Collections that kept their previous value
    pub failed: Vec<(&'static str, SourceError)>,
}

impl RefreshReport {
    /// Returns true if every collection was replaced
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Copy-on-refresh configuration snapshot
pub struct ConfigurationCache {
    source: Arc<dyn ConfigSource>,
    service_name: String,
    current: RwLock<Arc<ConfigSnapshot>>,
    published: AtomicU64,
}

impl std::fmt::Debug for ConfigurationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationCache")
            .field("service_name", &self.service_name)
            .field("version", &self.published.load(Ordering::Relaxed))
            .finish()
    }
}

impl ConfigurationCache {
    /// Empty cache reading from `source` for `service_name`'s settings
    pub fn new(source: Arc<dyn ConfigSource>, service_name: impl Into<String>) -> Self {
        Self {
            source,
            service_name: service_name.into(),
            current: RwLock::new(Arc::new(ConfigSnapshot::default())),
            published: AtomicU64::new(0),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Publish a snapshot directly, bumping its version
    pub fn publish(&self, mut snapshot: ConfigSnapshot) -> u64 {
        let version = self.published.fetch_add(1, Ordering::AcqRel) + 1;
        snapshot.version = version;
        *self.current.write() = Arc::new(snapshot);
        version
    }

    /// Fetch every collection and publish what succeeded
    #[instrument(skip(self), fields(service = %self.service_name))]
    pub async fn refresh(&self) -> RefreshReport {
        let source = &self.source;
        let (
            pipelines,
            codes,
            positions,
            groups,
            creatives,
            mappings,
            selector,
            targeting,
            ip_libraries,
            settings,
        ) = tokio::join!(
            source.fetch_pipelines(),
            source.fetch_code_tables(),
            source.fetch_positions(),
            source.fetch_groups(),
            source.fetch_creatives(),
            source.fetch_serializer_mappings(),
            source.fetch_selector(),
            source.fetch_targeting(),
            source.fetch_ip_libraries(),
            source.fetch_settings(&self.service_name),
        );

        let mut next = ConfigSnapshot::clone(&self.snapshot());
        let mut report = RefreshReport::default();
        let mut apply = |name: &'static str, outcome: Result<(), SourceError>| match outcome {
            Ok(()) => report.updated.push(name),
            Err(err) => {
                warn!(collection = name, error = %err, "Keeping previous collection");
                report.failed.push((name, err));
            }
        };

        apply("pipelines", pipelines.map(|v| next.pipelines = Arc::new(v)));
        apply("codes", codes.map(|v| next.code_tables = Arc::new(index_codes(v))));
        apply(
            "positions",
            positions.map(|v| next.positions = Arc::new(v.into_iter().map(|p| (p.id, p)).collect())),
        );
        apply(
            "groups",
            groups.map(|v| next.groups = Arc::new(v.into_iter().map(|g| (g.id, g)).collect())),
        );
        apply(
            "creatives",
            creatives.map(|v| next.creatives = Arc::new(v.into_iter().map(|c| (c.ad, c)).collect())),
        );
        apply("serializer_mappings", mappings.map(|v| next.serializer_mappings = Arc::new(v)));
        apply("selector", selector.map(|v| next.selector = v));
        apply("targeting", targeting.map(|v| next.targeting = Arc::new(v)));
        apply("ip_libraries", ip_libraries.map(|v| next.ip_libraries = Arc::new(v)));
        apply("settings", settings.map(|v| next.settings = Arc::new(v)));

        report.version = self.publish(next);
        if report.is_complete() {
            info!(version = report.version, "Configuration cache refreshed");
        } else {
            debug!(
                version = report.version,
                updated = report.updated.len(),
                failed = report.failed.len(),
                "Configuration cache partially refreshed"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_indexed_per_media() {
        let target = PositionOrGroup::Position(PositionId::new(3));
        let snapshot = ConfigSnapshot::default().with_codes(vec![
            CodeEntry {
                media: MediaId::new(1),
                code: "pre".to_string(),
                target,
            },
            CodeEntry {
                media: MediaId::new(2),
                code: "mid".to_string(),
                target,
            },
        ]);

        assert_eq!(snapshot.resolve_code(MediaId::new(1), "pre"), Some(target));
        assert_eq!(snapshot.resolve_code(MediaId::new(1), "mid"), None);
        assert_eq!(snapshot.resolve_code(MediaId::new(3), "pre"), None);
    }

    #[test]
    fn test_setting_minutes_rejects_non_positive() {
        let settings = BTreeMap::from([
            ("zero".to_string(), "0".to_string()),
            ("text".to_string(), "soon".to_string()),
            ("padded".to_string(), " 15 ".to_string()),
        ]);
        let snapshot = ConfigSnapshot::default().with_settings(settings);

        assert_eq!(snapshot.setting_minutes("zero"), None);
        assert_eq!(snapshot.setting_minutes("text"), None);
        assert_eq!(snapshot.setting_minutes("padded"), Some(15));
    }
}
