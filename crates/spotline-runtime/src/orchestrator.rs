//! Delivery orchestrator
//!
//! The request-time path. For every position code of a request the
//! orchestrator walks one small state machine:
//!
//! ```text
//! ResolvePosition → ResolvePipeline → RunPolicy → AllocateInventory
//!     → SerializePerAd → SerializePerPosition → SerializeGlobal → Done
//! ```
//!
//! Any stage may fail. A failure is captured with its stage and cause,
//! emitted as a monitoring event, and costs only the position it happened
//! in; the request always returns a best-effort payload. Plugin panics are
//! caught at the call site and treated like any other plugin failure.
//!
//! Allocation is final: once `try_allocate` grants, the unit is consumed
//! even if a later stage fails or the request is cancelled.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use spotline_core::{
    Clock, Correlation, MediaId, MonitoringEvent, PositionId, PositionOrGroup, SlotPosition,
    TimeBucket,
};
use spotline_plan::{DispatchPlanStore, DispatchSlice};
use spotline_plugin::{
    FilterPlugin, MaterialRelease, Parameters, PluginId, PluginKind, PluginRegistry,
    PolicyContext, PositionQueue, ScorerPlugin, SerializerLevel, SerializerSelectorPlugin,
};

use crate::cache::{ConfigSnapshot, ConfigurationCache};
use crate::errors::DeliveryError;
use crate::monitor::Monitor;

// =============================================================================
// Request and Response
// =============================================================================

/// Stage of the per-request state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Code → position or group
    ResolvePosition,
    /// Pipeline and plugin resolution
    ResolvePipeline,
    /// Policy invocation
    RunPolicy,
    /// Inventory decrement
    AllocateInventory,
    /// Ad-level serialization
    SerializePerAd,
    /// Position-level serialization
    SerializePerPosition,
    /// Global serialization
    SerializeGlobal,
    /// Finished with a payload
    Done,
    /// Finished without a payload
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::ResolvePosition => "resolve_position",
            Stage::ResolvePipeline => "resolve_pipeline",
            Stage::RunPolicy => "run_policy",
            Stage::AllocateInventory => "allocate_inventory",
            Stage::SerializePerAd => "serialize_per_ad",
            Stage::SerializePerPosition => "serialize_per_position",
            Stage::SerializeGlobal => "serialize_global",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(label)
    }
}

fn new_request_id() -> Uuid {
    Uuid::new_v4()
}

/// One inbound ad request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdRequest {
    /// Requesting media
    pub media: MediaId,
    /// Position or group codes, in request order
    pub codes: Vec<String>,
    /// Viewer cookie
    #[serde(default)]
    pub cookie: String,
    /// Viewer session
    #[serde(default)]
    pub session: Option<String>,
    /// Page or player view
    #[serde(default)]
    pub view: Option<String>,
    /// Request identifier
    #[serde(default = "new_request_id")]
    pub request: Uuid,
    /// Free-form parameters
    #[serde(default)]
    pub parameters: Parameters,
}

impl AdRequest {
    /// Request for `codes` with a fresh id and no parameters
    pub fn new<I, S>(media: MediaId, codes: I, cookie: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            media,
            codes: codes.into_iter().map(Into::into).collect(),
            cookie: cookie.into(),
            session: None,
            view: None,
            request: new_request_id(),
            parameters: Parameters::new(),
        }
    }

    /// Add a parameter
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Correlation identifiers for monitoring
    pub fn correlation(&self) -> Correlation {
        Correlation {
            media: self.media,
            cookie: self.cookie.clone(),
            session: self.session.clone(),
            view: self.view.clone(),
            request: self.request,
        }
    }
}

/// A position or code that produced no output
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFailure {
    /// Code being served, or `*` for request-wide stages
    pub code: String,
    /// Position, once known
    pub position: Option<PositionId>,
    /// Stage the failure was captured at
    pub stage: Stage,
    /// Cause
    pub error: DeliveryError,
}

/// Outcome of one request
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryResponse {
    /// Request identifier
    pub request: Uuid,
    /// Serialized response; empty when the global stage did not produce one
    pub payload: String,
    /// Allocations granted while serving
    pub granted: usize,
    /// `Done` or `Failed`
    pub stage: Stage,
    /// Per-position failures
    pub failures: Vec<PositionFailure>,
}

impl DeliveryResponse {
    /// Returns true if a payload was produced
    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }
}

// =============================================================================
// Plugin Call Guard
// =============================================================================

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run a plugin call, turning panics into errors
fn guarded<T, E>(plugin: &PluginId, call: impl FnOnce() -> Result<T, E>) -> Result<T, DeliveryError>
where
    DeliveryError: From<E>,
{
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result.map_err(DeliveryError::from),
        Err(payload) => Err(DeliveryError::PluginPanicked {
            plugin: plugin.clone(),
            message: panic_message(payload),
        }),
    }
}

type StageResult<T> = Result<T, (Stage, DeliveryError)>;

fn at<T, E: Into<DeliveryError>>(stage: Stage, result: Result<T, E>) -> StageResult<T> {
    result.map_err(|err| (stage, err.into()))
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Per-request state shared by every code
struct RequestScope<'a> {
    request: &'a AdRequest,
    correlation: Correlation,
    bucket: TimeBucket,
    snapshot: Arc<ConfigSnapshot>,
    slice: Option<DispatchSlice>,
    cancel: &'a CancellationToken,
}

/// Serves ad requests against the dispatch plan
pub struct DeliveryOrchestrator {
    store: Arc<DispatchPlanStore>,
    registry: Arc<PluginRegistry>,
    cache: Arc<ConfigurationCache>,
    monitor: Arc<Monitor>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for DeliveryOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryOrchestrator")
            .field("store", &self.store)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl DeliveryOrchestrator {
    /// Orchestrator over the shared runtime state
    pub fn new(
        store: Arc<DispatchPlanStore>,
        registry: Arc<PluginRegistry>,
        cache: Arc<ConfigurationCache>,
        monitor: Arc<Monitor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            cache,
            monitor,
            clock,
        }
    }

    /// Serve one request
    ///
    /// Never fails: every error is folded into the response's failures.
    /// `cancel` is checked before the policy call of each code and before
    /// each serialization stage.
    pub fn serve(&self, request: &AdRequest, cancel: &CancellationToken) -> DeliveryResponse {
        let bucket = self.clock.current_bucket();
        let scope = RequestScope {
            request,
            correlation: request.correlation(),
            bucket,
            snapshot: self.cache.snapshot(),
            slice: self.store.slice(bucket, request.media),
            cancel,
        };
        self.monitor.emit(MonitoringEvent::RequestReceived {
            correlation: scope.correlation.clone(),
            codes: request.codes.clone(),
            bucket,
        });
        debug!(
            request = %request.request,
            media = %request.media,
            %bucket,
            codes = request.codes.len(),
            has_slice = scope.slice.is_some(),
            "Serving ad request"
        );

        let mut failures = Vec::new();
        let mut merged: IndexMap<PositionId, Vec<MaterialRelease>> = IndexMap::new();
        let mut granted = 0;

        for code in &request.codes {
            match self.deliver_code(&scope, code) {
                Ok(releases) => {
                    granted += releases.len();
                    for release in releases {
                        merged.entry(release.position).or_default().push(release);
                    }
                }
                Err((stage, error)) => {
                    self.record_failure(&scope, &mut failures, code, None, stage, error);
                }
            }
        }

        let payload = self.serialize(&scope, merged, &mut failures);
        let stage = if payload.is_some() {
            Stage::Done
        } else {
            Stage::Failed
        };
        DeliveryResponse {
            request: request.request,
            payload: payload.unwrap_or_default(),
            granted,
            stage,
            failures,
        }
    }

    fn record_failure(
        &self,
        scope: &RequestScope<'_>,
        failures: &mut Vec<PositionFailure>,
        code: &str,
        position: Option<PositionId>,
        stage: Stage,
        error: DeliveryError,
    ) {
        warn!(
            request = %scope.request.request,
            code,
            %stage,
            error = %error,
            "Delivery stage failed"
        );
        self.monitor.emit(MonitoringEvent::DeliveryFailed {
            correlation: scope.correlation.clone(),
            code: code.to_string(),
            stage: stage.to_string(),
            cause: error.to_string(),
        });
        failures.push(PositionFailure {
            code: code.to_string(),
            position,
            stage,
            error,
        });
    }

    /// Resolve, run the policy and allocate for one code
    fn deliver_code(&self, scope: &RequestScope<'_>, code: &str) -> StageResult<Vec<MaterialRelease>> {
        let media = scope.request.media;
        let snapshot = &scope.snapshot;

        // ResolvePosition
        let Some(target) = snapshot.resolve_code(media, code) else {
            debug!(%media, code, "Unknown position code, skipped");
            return Ok(Vec::new());
        };

        // ResolvePipeline
        let pipeline = snapshot.pipeline(media, target).ok_or((
            Stage::ResolvePipeline,
            DeliveryError::UnknownPipeline { media, target },
        ))?;
        at(
            Stage::ResolvePipeline,
            PluginRegistry::check_kind(&pipeline.policy, PluginKind::Policy),
        )?;
        let policy = at(
            Stage::ResolvePipeline,
            self.registry
                .resolve_policy(&pipeline.policy.id, pipeline.policy.minimum),
        )?;
        let filters: Vec<Arc<dyn FilterPlugin>> = pipeline
            .filters
            .iter()
            .map(|reference| {
                PluginRegistry::check_kind(reference, PluginKind::Filter)?;
                Ok(self.registry.resolve_filter(&reference.id, reference.minimum)?.plugin)
            })
            .collect::<Result<_, spotline_plugin::PluginError>>()
            .map_err(|err| (Stage::ResolvePipeline, err.into()))?;
        let scorers: Vec<Arc<dyn ScorerPlugin>> = pipeline
            .scorers
            .iter()
            .map(|reference| {
                PluginRegistry::check_kind(reference, PluginKind::Scorer)?;
                Ok(self.registry.resolve_scorer(&reference.id, reference.minimum)?.plugin)
            })
            .collect::<Result<_, spotline_plugin::PluginError>>()
            .map_err(|err| (Stage::ResolvePipeline, err.into()))?;

        // RunPolicy
        if scope.cancel.is_cancelled() {
            return Err((
                Stage::RunPolicy,
                DeliveryError::Cancelled {
                    stage: Stage::RunPolicy,
                },
            ));
        }
        let ctx = PolicyContext {
            media,
            bucket: scope.bucket,
            target,
            cookie: &scope.request.cookie,
            parameters: &scope.request.parameters,
            pipelines: &snapshot.pipelines,
            positions: &snapshot.positions,
            groups: &snapshot.groups,
            targeting: &snapshot.targeting,
            ip_libraries: &snapshot.ip_libraries,
            slice: scope.slice.as_ref(),
            serializer_mappings: &snapshot.serializer_mappings,
            creatives: &snapshot.creatives,
            filters: &filters,
            scorers: &scorers,
        };
        let queues = at(
            Stage::RunPolicy,
            guarded(&policy.id, || policy.plugin.select(&ctx)),
        )?;

        // AllocateInventory
        Ok(self.allocate(scope, target, &policy.id, policy.version, queues))
    }

    fn allocate(
        &self,
        scope: &RequestScope<'_>,
        target: PositionOrGroup,
        policy: &PluginId,
        policy_version: spotline_plugin::PluginVersion,
        queues: Vec<PositionQueue>,
    ) -> Vec<MaterialRelease> {
        let media = scope.request.media;
        let mut releases = Vec::new();

        for queue in queues {
            for (index, candidate) in queue.candidates.into_iter().enumerate() {
                let Ok(sequence) = SlotPosition::try_from(index) else {
                    break;
                };
                let allocation = self
                    .store
                    .try_allocate(scope.bucket, media, &candidate.ad, sequence);
                if !allocation.is_granted() {
                    continue;
                }

                self.monitor.emit(MonitoringEvent::AdReturned {
                    correlation: scope.correlation.clone(),
                    position: queue.position,
                    sequence,
                    ad: candidate.ad,
                    material: candidate.material,
                });
                releases.push(MaterialRelease {
                    ad: candidate.ad,
                    material: candidate.material,
                    creative_type: candidate.creative_type,
                    position: queue.position,
                    sequence,
                    policy: policy.clone(),
                    policy_version,
                });
            }
        }

        debug!(%target, granted = releases.len(), "Inventory allocated");
        releases
    }

    fn check_cancel(scope: &RequestScope<'_>, stage: Stage) -> Result<(), DeliveryError> {
        if scope.cancel.is_cancelled() {
            Err(DeliveryError::Cancelled { stage })
        } else {
            Ok(())
        }
    }

    fn select_serializer(
        &self,
        selector: &dyn SerializerSelectorPlugin,
        selector_id: &PluginId,
        scope: &RequestScope<'_>,
        position: Option<PositionId>,
        creative_type: Option<spotline_core::CreativeTypeId>,
        level: SerializerLevel,
    ) -> Result<spotline_plugin::Resolved<dyn spotline_plugin::SerializerPlugin>, DeliveryError> {
        let reference = guarded(selector_id, || {
            selector.select(
                &scope.request.parameters,
                &scope.snapshot.serializer_mappings,
                position,
                creative_type,
                level,
            )
        })?;
        PluginRegistry::check_kind(&reference, PluginKind::Serializer)?;
        Ok(self
            .registry
            .resolve_serializer(&reference.id, reference.minimum)?)
    }

    /// Run the three serialization stages; `None` if the global stage failed
    fn serialize(
        &self,
        scope: &RequestScope<'_>,
        merged: IndexMap<PositionId, Vec<MaterialRelease>>,
        failures: &mut Vec<PositionFailure>,
    ) -> Option<String> {
        const REQUEST_WIDE: &str = "*";
        let mappings = &scope.snapshot.serializer_mappings;

        let selector_ref = &scope.snapshot.selector;
        let selector = match PluginRegistry::check_kind(selector_ref, PluginKind::SerializerSelector)
            .and_then(|()| self.registry.resolve_selector(&selector_ref.id, selector_ref.minimum))
        {
            Ok(selector) => selector,
            Err(err) => {
                self.record_failure(scope, failures, REQUEST_WIDE, None, Stage::SerializeGlobal, err.into());
                return None;
            }
        };
        let code_of = |position: PositionId| format!("{position}");

        // SerializePerAd
        let mut per_position: Vec<(PositionId, Vec<String>)> = Vec::with_capacity(merged.len());
        if let Err(err) = Self::check_cancel(scope, Stage::SerializePerAd) {
            self.record_failure(scope, failures, REQUEST_WIDE, None, Stage::SerializePerAd, err);
            return None;
        }
        for (position, releases) in merged {
            let rendered: Result<Vec<String>, DeliveryError> = releases
                .iter()
                .map(|release| {
                    let serializer = self.select_serializer(
                        selector.plugin.as_ref(),
                        &selector.id,
                        scope,
                        Some(position),
                        Some(release.creative_type),
                        SerializerLevel::Ad,
                    )?;
                    guarded(&serializer.id, || serializer.plugin.serialize_ad(release, mappings))
                })
                .collect();
            match rendered {
                Ok(ads) => per_position.push((position, ads)),
                Err(err) => self.record_failure(
                    scope,
                    failures,
                    &code_of(position),
                    Some(position),
                    Stage::SerializePerAd,
                    err,
                ),
            }
        }

        // SerializePerPosition
        if let Err(err) = Self::check_cancel(scope, Stage::SerializePerPosition) {
            self.record_failure(scope, failures, REQUEST_WIDE, None, Stage::SerializePerPosition, err);
            return None;
        }
        let mut outputs: Vec<(PositionId, String)> = Vec::with_capacity(per_position.len());
        for (position, ads) in per_position {
            let rendered = self
                .select_serializer(
                    selector.plugin.as_ref(),
                    &selector.id,
                    scope,
                    Some(position),
                    None,
                    SerializerLevel::Position,
                )
                .and_then(|serializer| {
                    guarded(&serializer.id, || {
                        serializer.plugin.serialize_position(position, &ads, mappings)
                    })
                });
            match rendered {
                Ok(output) => outputs.push((position, output)),
                Err(err) => self.record_failure(
                    scope,
                    failures,
                    &code_of(position),
                    Some(position),
                    Stage::SerializePerPosition,
                    err,
                ),
            }
        }

        // SerializeGlobal
        if let Err(err) = Self::check_cancel(scope, Stage::SerializeGlobal) {
            self.record_failure(scope, failures, REQUEST_WIDE, None, Stage::SerializeGlobal, err);
            return None;
        }
        let rendered = self
            .select_serializer(
                selector.plugin.as_ref(),
                &selector.id,
                scope,
                None,
                None,
                SerializerLevel::Global,
            )
            .and_then(|serializer| {
                guarded(&serializer.id, || serializer.plugin.serialize_global(&outputs, mappings))
            });
        match rendered {
            Ok(payload) => Some(payload),
            Err(err) => {
                self.record_failure(scope, failures, REQUEST_WIDE, None, Stage::SerializeGlobal, err);
                None
            }
        }
    }
}
