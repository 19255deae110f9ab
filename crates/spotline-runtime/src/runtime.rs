//! Dispatch runtime assembly
//!
//! Start-up order is fixed:
//!
//! 1. Validate configuration
//! 2. Wait for the upstream planner ([`ServiceReadinessGate`])
//! 3. Load the dispatch plan snapshot
//! 4. Refresh the configuration cache once
//! 5. Start the monitoring drain and the maintenance tick loop
//!
//! Requests can be served as soon as [`DispatchRuntime::start`] returns.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use spotline_core::{Clock, RuntimeConfig, ServiceStatus, SystemClock};
use spotline_plan::{DispatchPlanStore, GrantWithoutDecrement, RatioStrategy, StackReorganizer};
use spotline_plugin::PluginRegistry;

use crate::cache::ConfigurationCache;
use crate::errors::Result;
use crate::monitor::{self, Monitor, MonitoringSink, TracingSink};
use crate::orchestrator::{AdRequest, DeliveryOrchestrator, DeliveryResponse};
use crate::readiness::ServiceReadinessGate;
use crate::scheduler::{HeartbeatIdentity, MaintenanceScheduler};
use crate::sources::{ConfigSource, PlanSnapshotSource};
use crate::status::StatusService;
use crate::tasks::RuntimeTaskRegistry;

/// Collaborators and options for [`DispatchRuntime::start`]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    plugins: Arc<PluginRegistry>,
    config_source: Arc<dyn ConfigSource>,
    plan_source: Arc<dyn PlanSnapshotSource>,
    status: Arc<dyn StatusService>,
    sink: Arc<dyn MonitoringSink>,
    clock: Arc<dyn Clock>,
    ratio: Arc<dyn RatioStrategy>,
}

impl RuntimeBuilder {
    /// Builder with the required collaborators
    pub fn new(
        config: RuntimeConfig,
        plugins: Arc<PluginRegistry>,
        config_source: Arc<dyn ConfigSource>,
        plan_source: Arc<dyn PlanSnapshotSource>,
        status: Arc<dyn StatusService>,
    ) -> Self {
        Self {
            config,
            plugins,
            config_source,
            plan_source,
            status,
            sink: Arc::new(TracingSink),
            clock: Arc::new(SystemClock),
            ratio: Arc::new(GrantWithoutDecrement),
        }
    }

    /// Monitoring sink (default: log every event)
    pub fn with_sink(mut self, sink: Arc<dyn MonitoringSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Clock (default: system time)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Ratio-sentinel strategy (default: grant without decrement)
    pub fn with_ratio_strategy(mut self, ratio: Arc<dyn RatioStrategy>) -> Self {
        self.ratio = ratio;
        self
    }

    /// Start the runtime; see [`DispatchRuntime::start`]
    pub async fn start(self, cancel: &CancellationToken) -> Result<DispatchRuntime> {
        DispatchRuntime::start(self, cancel).await
    }
}

/// A started dispatch runtime
pub struct DispatchRuntime {
    config: RuntimeConfig,
    store: Arc<DispatchPlanStore>,
    cache: Arc<ConfigurationCache>,
    monitor: Arc<Monitor>,
    orchestrator: Arc<DeliveryOrchestrator>,
    scheduler: Arc<MaintenanceScheduler>,
    tasks: RuntimeTaskRegistry,
}

impl std::fmt::Debug for DispatchRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchRuntime")
            .field("service", &self.config.service_name)
            .field("server", &self.config.server_id)
            .field("store", &self.store)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl DispatchRuntime {
    /// Run the start-up sequence
    #[instrument(skip_all, fields(service = %builder.config.service_name, server = %builder.config.server_id))]
    pub async fn start(builder: RuntimeBuilder, cancel: &CancellationToken) -> Result<Self> {
        let RuntimeBuilder {
            config,
            plugins,
            config_source,
            plan_source,
            status,
            sink,
            clock,
            ratio,
        } = builder;
        config.validate()?;

        let attempts = ServiceReadinessGate::new(Arc::clone(&status), config.readiness.clone())
            .wait_until_ready(cancel)
            .await?;

        let store = Arc::new(DispatchPlanStore::with_ratio_strategy(ratio));
        let snapshot = plan_source.fetch_snapshot().await?;
        let entries = store.load(snapshot)?;

        let cache = Arc::new(ConfigurationCache::new(
            config_source,
            config.service_name.clone(),
        ));
        let refresh = cache.refresh().await;
        if !refresh.is_complete() {
            warn!(
                failed = refresh.failed.len(),
                "Starting with an incomplete configuration cache"
            );
        }

        let tasks = RuntimeTaskRegistry::new();
        let (monitor, receiver) = Monitor::channel(config.monitoring.channel_capacity);
        let monitor = Arc::new(monitor);
        tasks.spawn_cancellable(monitor::drain(receiver, sink));

        let reorganizer = Arc::new(StackReorganizer::new(
            Arc::clone(&store),
            config.plan.bucket_retention_minutes,
        ));
        let scheduler = Arc::new(MaintenanceScheduler::new(
            HeartbeatIdentity {
                service: config.service_name.clone(),
                server: config.server_id.clone(),
            },
            config.maintenance.clone(),
            Arc::clone(&cache),
            reorganizer,
            status,
            Arc::clone(&clock),
        ));
        if refresh.is_complete() {
            scheduler.mark_refreshed(clock.now());
        }
        let ticker = Arc::clone(&scheduler);
        tasks.spawn_interval_until(config.tick_interval(), move || {
            let scheduler = Arc::clone(&ticker);
            async move {
                scheduler.tick().await;
                true
            }
        });

        let orchestrator = Arc::new(DeliveryOrchestrator::new(
            Arc::clone(&store),
            plugins,
            Arc::clone(&cache),
            Arc::clone(&monitor),
            clock,
        ));

        info!(
            readiness_attempts = attempts,
            entries,
            config_version = refresh.version,
            "Dispatch runtime started"
        );
        Ok(Self {
            config,
            store,
            cache,
            monitor,
            orchestrator,
            scheduler,
            tasks,
        })
    }

    /// Serve one request on the caller's thread
    pub fn serve(&self, request: &AdRequest, cancel: &CancellationToken) -> DeliveryResponse {
        self.orchestrator.serve(request, cancel)
    }

    /// Shared orchestrator, for callers serving from their own threads
    pub fn orchestrator(&self) -> Arc<DeliveryOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// Dispatch plan store
    pub fn store(&self) -> &Arc<DispatchPlanStore> {
        &self.store
    }

    /// Configuration cache
    pub fn cache(&self) -> &Arc<ConfigurationCache> {
        &self.cache
    }

    /// Monitoring channel
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Maintenance scheduler
    pub fn scheduler(&self) -> &Arc<MaintenanceScheduler> {
        &self.scheduler
    }

    /// Token cancelled when the runtime shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.tasks.cancellation_token()
    }

    /// Report `Stopped` and stop every background task
    #[instrument(skip(self), fields(service = %self.config.service_name))]
    pub async fn shutdown(self) {
        self.scheduler.report_final(ServiceStatus::Stopping).await;
        self.tasks.shutdown();
        self.scheduler.report_final(ServiceStatus::Stopped).await;
        info!(
            dropped_events = self.monitor.dropped(),
            "Dispatch runtime stopped"
        );
    }
}
