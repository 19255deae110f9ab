//! In-memory collaborators
//!
//! Stand-ins for the runtime's external sources with failure injection:
//! configuration collections that can be made to fail one by one, a plan
//! source, a monitoring sink that records, and a status service whose
//! upstream becomes ready after a scripted number of polls.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use spotline_core::{MonitoringEvent, ServerId, ServiceStatus, StatusRecord};
use spotline_plan::PlanSnapshot;
use spotline_plugin::{
    Creative, Group, PipelineConfiguration, PluginReference, Position, SerializerMapping,
};
use spotline_runtime::{
    CodeEntry, ConfigSource, MonitoringSink, PlanSnapshotSource, SourceError, StatusService,
};

use crate::fixtures::ConfigCollections;

// =============================================================================
// Configuration Source
// =============================================================================

/// Configuration source over [`ConfigCollections`]
///
/// Collections are named as in refresh reports (`pipelines`, `codes`,
/// `positions`, ...). A failing collection returns
/// [`SourceError::Unavailable`] until recovered.
#[derive(Debug)]
pub struct InMemoryConfigSource {
    collections: Mutex<ConfigCollections>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
}

impl InMemoryConfigSource {
    /// Source serving `collections`
    pub fn new(collections: ConfigCollections) -> Self {
        Self {
            collections: Mutex::new(collections),
            failing: Mutex::new(HashSet::new()),
            delay: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Make `collection` fail until [`Self::recover`]
    pub fn fail(&self, collection: &str) {
        self.failing.lock().insert(collection.to_string());
    }

    /// Make `collection` succeed again
    pub fn recover(&self, collection: &str) {
        self.failing.lock().remove(collection);
    }

    /// Edit the served collections
    pub fn update(&self, edit: impl FnOnce(&mut ConfigCollections)) {
        edit(&mut *self.collections.lock());
    }

    /// Hold every pipelines fetch for `delay` (tokio time)
    pub fn delay_pipelines(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Pipelines fetches so far, one per refresh
    pub fn refreshes(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn read<T>(&self, name: &str, pick: impl FnOnce(&ConfigCollections) -> T) -> Result<T, SourceError> {
        if self.failing.lock().contains(name) {
            return Err(SourceError::unavailable(name, "injected failure"));
        }
        Ok(pick(&*self.collections.lock()))
    }
}

#[async_trait]
impl ConfigSource for InMemoryConfigSource {
    async fn fetch_pipelines(&self) -> Result<Vec<PipelineConfiguration>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.read("pipelines", |c| c.pipelines.clone())
    }

    async fn fetch_code_tables(&self) -> Result<Vec<CodeEntry>, SourceError> {
        self.read("codes", |c| c.codes.clone())
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>, SourceError> {
        self.read("positions", |c| c.positions.clone())
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>, SourceError> {
        self.read("groups", |c| c.groups.clone())
    }

    async fn fetch_creatives(&self) -> Result<Vec<Creative>, SourceError> {
        self.read("creatives", |c| c.creatives.clone())
    }

    async fn fetch_serializer_mappings(&self) -> Result<Vec<SerializerMapping>, SourceError> {
        self.read("serializer_mappings", |c| c.serializer_mappings.clone())
    }

    async fn fetch_selector(&self) -> Result<PluginReference, SourceError> {
        self.read("selector", |c| c.selector.clone())
    }

    async fn fetch_targeting(&self) -> Result<serde_json::Value, SourceError> {
        self.read("targeting", |c| c.targeting.clone())
    }

    async fn fetch_ip_libraries(&self) -> Result<serde_json::Value, SourceError> {
        self.read("ip_libraries", |c| c.ip_libraries.clone())
    }

    async fn fetch_settings(&self, service: &str) -> Result<BTreeMap<String, String>, SourceError> {
        self.read("settings", |c| c.settings.get(service).cloned().unwrap_or_default())
    }
}

// =============================================================================
// Plan Source
// =============================================================================

/// Plan source returning a fixed snapshot, or failing
#[derive(Debug)]
pub struct InMemoryPlanSource {
    snapshot: Result<PlanSnapshot, SourceError>,
}

impl InMemoryPlanSource {
    /// Source returning `snapshot`
    pub fn new(snapshot: PlanSnapshot) -> Self {
        Self { snapshot: Ok(snapshot) }
    }

    /// Source that is always unavailable
    pub fn unavailable() -> Self {
        Self {
            snapshot: Err(SourceError::unavailable("plan", "injected failure")),
        }
    }
}

#[async_trait]
impl PlanSnapshotSource for InMemoryPlanSource {
    async fn fetch_snapshot(&self) -> Result<PlanSnapshot, SourceError> {
        self.snapshot.clone()
    }
}

// =============================================================================
// Monitoring Sink
// =============================================================================

/// Sink keeping every event it receives
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MonitoringEvent>>,
}

impl RecordingSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far
    pub fn events(&self) -> Vec<MonitoringEvent> {
        self.events.lock().clone()
    }

    /// Names of the events received so far
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(MonitoringEvent::name).collect()
    }
}

impl MonitoringSink for RecordingSink {
    fn record(&self, event: MonitoringEvent) {
        self.events.lock().push(event);
    }
}

// =============================================================================
// Status Service
// =============================================================================

/// Server id the scripted upstream reports under
pub const UPSTREAM_SERVER: &str = "planner-1";

/// One `report_status` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Reporting service
    pub service: String,
    /// Reporting server
    pub server: ServerId,
    /// Reported status
    pub status: ServiceStatus,
    /// Reported resource count
    pub resource_count: u64,
}

/// Status service whose upstream turns `Running` after a number of polls
#[derive(Debug)]
pub struct ScriptedStatusService {
    ready_after: Option<u32>,
    unreachable: bool,
    polls: AtomicU32,
    reports: Mutex<Vec<StatusReport>>,
}

impl ScriptedStatusService {
    /// Upstream running from the first poll
    pub fn ready() -> Self {
        Self::ready_after(1)
    }

    /// Upstream running from poll `polls` on
    pub fn ready_after(polls: u32) -> Self {
        Self {
            ready_after: Some(polls),
            unreachable: false,
            polls: AtomicU32::new(0),
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Upstream that only ever reports `Starting`
    pub fn never_ready() -> Self {
        Self {
            ready_after: None,
            unreachable: false,
            polls: AtomicU32::new(0),
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Status store that fails every call
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::never_ready()
        }
    }

    /// Polls of the upstream status so far
    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    /// Reports written so far
    pub fn reports(&self) -> Vec<StatusReport> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl StatusService for ScriptedStatusService {
    async fn report_status(
        &self,
        service: &str,
        server: &ServerId,
        status: ServiceStatus,
        resource_count: u64,
    ) -> Result<(), SourceError> {
        if self.unreachable {
            return Err(SourceError::unavailable("status", "injected failure"));
        }
        self.reports.lock().push(StatusReport {
            service: service.to_string(),
            server: server.clone(),
            status,
            resource_count,
        });
        Ok(())
    }

    async fn get_statuses(&self, _service: &str) -> Result<HashMap<ServerId, StatusRecord>, SourceError> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.unreachable {
            return Err(SourceError::unavailable("status", "injected failure"));
        }
        let status = match self.ready_after {
            Some(ready) if poll >= ready => ServiceStatus::Running,
            _ => ServiceStatus::Starting,
        };
        Ok(HashMap::from([(
            ServerId::new(UPSTREAM_SERVER),
            StatusRecord {
                status,
                resource_count: 0,
                reported_at: Utc::now(),
            },
        )]))
    }
}
