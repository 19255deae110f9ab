//! Standard test fixtures
//!
//! One media with two positions (`pre`, `mid`), a group covering both
//! (`break`), two ads with creatives, and pipelines bound to the reference
//! plugins. Tests that need something different start from
//! [`standard_collections`] and edit it.

use std::collections::BTreeMap;
use std::sync::Arc;

use spotline_core::{
    Ad, CreativeTypeId, GroupId, MaterialId, MediaId, PositionId, PositionOrGroup, TimeBucket,
};
use spotline_plan::PlanSnapshot;
use spotline_plugin::builtin::{
    self, EXHAUSTED_FILTER, PLAN_ORDER_POLICY, REMAINING_COUNT_SCORER,
};
use spotline_plugin::{
    Creative, Group, PipelineConfiguration, PluginKind, PluginReference, PluginRegistry,
    PluginVersion, Position, SerializerMapping,
};
use spotline_runtime::{AdRequest, CodeEntry, ConfigSnapshot};

/// Bucket most tests serve in
pub const NOW: TimeBucket = TimeBucket::from_epoch_minutes(29_000_000);
/// The fixture media
pub const MEDIA: MediaId = MediaId::new(1);
/// Code of [`PRE_POSITION`]
pub const PRE_ROLL: &str = "pre";
/// Code of [`MID_POSITION`]
pub const MID_ROLL: &str = "mid";
/// Code of [`BREAK_GROUP`]
pub const BREAK: &str = "break";
/// Pre-roll position
pub const PRE_POSITION: PositionId = PositionId::new(10);
/// Mid-roll position
pub const MID_POSITION: PositionId = PositionId::new(11);
/// Group of both positions
pub const BREAK_GROUP: GroupId = GroupId::new(20);
/// First fixture ad
pub const AD_A: Ad = Ad::new(1, 1, 1, 1);
/// Second fixture ad
pub const AD_B: Ad = Ad::new(2, 2, 2, 2);
/// Creative type of every fixture creative
pub const VIDEO: CreativeTypeId = CreativeTypeId::new(3);

/// Raw configuration collections, as a [`crate::InMemoryConfigSource`]
/// serves them
#[derive(Debug, Clone)]
pub struct ConfigCollections {
    /// Pipeline bindings
    pub pipelines: Vec<PipelineConfiguration>,
    /// Code table rows
    pub codes: Vec<CodeEntry>,
    /// Position table
    pub positions: Vec<Position>,
    /// Group table
    pub groups: Vec<Group>,
    /// Creatives
    pub creatives: Vec<Creative>,
    /// Serializer mappings
    pub serializer_mappings: Vec<SerializerMapping>,
    /// Serializer selector
    pub selector: PluginReference,
    /// Targeting definitions
    pub targeting: serde_json::Value,
    /// IP libraries
    pub ip_libraries: serde_json::Value,
    /// `service → name → value`
    pub settings: BTreeMap<String, BTreeMap<String, String>>,
}

impl ConfigCollections {
    /// Snapshot holding these collections, with `service`'s settings
    pub fn to_snapshot(&self, service: &str) -> ConfigSnapshot {
        let mut snapshot = ConfigSnapshot::default()
            .with_pipelines(self.pipelines.clone())
            .with_codes(self.codes.clone())
            .with_positions(self.positions.clone())
            .with_groups(self.groups.clone())
            .with_creatives(self.creatives.clone())
            .with_serializer_mappings(self.serializer_mappings.clone())
            .with_selector(self.selector.clone())
            .with_settings(self.settings.get(service).cloned().unwrap_or_default());
        snapshot.targeting = Arc::new(self.targeting.clone());
        snapshot.ip_libraries = Arc::new(self.ip_libraries.clone());
        snapshot
    }

    /// Rebind the pipeline of `target` to the policy `policy`
    pub fn bind_policy(&mut self, target: PositionOrGroup, policy: &str) {
        for pipeline in &mut self.pipelines {
            if pipeline.target == target {
                pipeline.policy = reference(PluginKind::Policy, policy);
            }
        }
    }

    /// Set one setting of `service`
    pub fn set_setting(&mut self, service: &str, name: &str, value: &str) {
        self.settings
            .entry(service.to_string())
            .or_default()
            .insert(name.to_string(), value.to_string());
    }
}

/// Reference to `id` at any version
pub fn reference(kind: PluginKind, id: &str) -> PluginReference {
    PluginReference::new(kind, id, PluginVersion::ZERO)
}

/// Creative of [`VIDEO`] type
pub fn creative(ad: Ad, material: u64) -> Creative {
    Creative {
        ad,
        material: MaterialId::new(material),
        creative_type: VIDEO,
        attributes: BTreeMap::new(),
    }
}

/// Pipeline on the reference policy, filter and scorer
pub fn builtin_pipeline(media: MediaId, target: PositionOrGroup) -> PipelineConfiguration {
    PipelineConfiguration {
        media,
        target,
        policy: reference(PluginKind::Policy, PLAN_ORDER_POLICY),
        filters: vec![reference(PluginKind::Filter, EXHAUSTED_FILTER)],
        scorers: vec![reference(PluginKind::Scorer, REMAINING_COUNT_SCORER)],
        serializers: vec![builtin::json_serializer_reference()],
    }
}

/// The standard fixture collections
pub fn standard_collections() -> ConfigCollections {
    let pre = PositionOrGroup::Position(PRE_POSITION);
    let mid = PositionOrGroup::Position(MID_POSITION);
    let group = PositionOrGroup::Group(BREAK_GROUP);
    ConfigCollections {
        pipelines: vec![
            builtin_pipeline(MEDIA, pre),
            builtin_pipeline(MEDIA, mid),
            builtin_pipeline(MEDIA, group),
        ],
        codes: vec![
            CodeEntry {
                media: MEDIA,
                code: PRE_ROLL.to_string(),
                target: pre,
            },
            CodeEntry {
                media: MEDIA,
                code: MID_ROLL.to_string(),
                target: mid,
            },
            CodeEntry {
                media: MEDIA,
                code: BREAK.to_string(),
                target: group,
            },
        ],
        positions: vec![
            Position {
                id: PRE_POSITION,
                media: MEDIA,
                code: PRE_ROLL.to_string(),
                group: Some(BREAK_GROUP),
            },
            Position {
                id: MID_POSITION,
                media: MEDIA,
                code: MID_ROLL.to_string(),
                group: Some(BREAK_GROUP),
            },
        ],
        groups: vec![Group {
            id: BREAK_GROUP,
            media: MEDIA,
            code: BREAK.to_string(),
            positions: vec![PRE_POSITION, MID_POSITION],
        }],
        creatives: vec![creative(AD_A, 100), creative(AD_B, 200)],
        serializer_mappings: Vec::new(),
        selector: builtin::static_selector_reference(),
        targeting: serde_json::Value::Null,
        ip_libraries: serde_json::Value::Null,
        settings: BTreeMap::new(),
    }
}

/// The standard fixture as a published-ready snapshot
pub fn standard_config() -> ConfigSnapshot {
    standard_collections().to_snapshot("spotline-dispatch")
}

/// Registry holding the reference plugins
pub fn builtin_registry() -> Arc<PluginRegistry> {
    let registry = Arc::new(PluginRegistry::new());
    builtin::register_builtins(&registry);
    registry
}

/// Plan for [`MEDIA`] at `bucket` with one row per `(ad, count)`
pub fn plan_at(bucket: TimeBucket, rows: &[(Ad, i64)]) -> PlanSnapshot {
    rows.iter().fold(PlanSnapshot::new(), |snapshot, (ad, count)| {
        snapshot.with_row(MEDIA, bucket, *ad, *count)
    })
}

/// Request from [`MEDIA`] for `codes`
pub fn request<'a>(codes: impl IntoIterator<Item = &'a str>) -> AdRequest {
    AdRequest::new(MEDIA, codes, "cookie-1")
}
