//! Spotline Runtime: ad delivery and background maintenance
//!
//! This crate wires the dispatch plan and the plugin registry into a running
//! service:
//!
//! - [`DeliveryOrchestrator`] serves ad requests: code resolution, pipeline
//!   and plugin resolution, policy invocation, inventory allocation and the
//!   three serialization stages, with per-position failure isolation
//! - [`MaintenanceScheduler`] drives health reporting, configuration refresh
//!   and plan reorganization from one periodic tick
//! - [`ConfigurationCache`] holds the copy-on-refresh configuration snapshot
//! - [`ServiceReadinessGate`] holds start-up until the upstream planner runs
//! - [`DispatchRuntime`] assembles all of the above
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use spotline_core::{MediaId, RuntimeConfig};
//! use spotline_plugin::{builtin, PluginRegistry};
//! use spotline_runtime::{
//!     AdRequest, FileConfigSource, FilePlanSource, InMemoryStatusRegistry, RuntimeBuilder,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> spotline_runtime::Result<()> {
//! let plugins = Arc::new(PluginRegistry::new());
//! builtin::register_builtins(&plugins);
//!
//! let cancel = CancellationToken::new();
//! let runtime = RuntimeBuilder::new(
//!     RuntimeConfig::default(),
//!     plugins,
//!     Arc::new(FileConfigSource::new("config-cache.json")),
//!     Arc::new(FilePlanSource::new("plan.json")),
//!     Arc::new(InMemoryStatusRegistry::new()),
//! )
//! .start(&cancel)
//! .await?;
//!
//! let response = runtime.serve(&AdRequest::new(MediaId::new(1), ["pre"], "cookie"), &cancel);
//! println!("{}", response.payload);
//! runtime.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod errors;
pub mod monitor;
pub mod orchestrator;
pub mod readiness;
pub mod runtime;
pub mod scheduler;
pub mod sources;
pub mod status;
pub mod tasks;

pub use cache::{ConfigSnapshot, ConfigurationCache, RefreshReport};
pub use errors::{DeliveryError, Result, RuntimeError, SourceError};
pub use monitor::{Monitor, MonitoringSink, TracingSink};
pub use orchestrator::{AdRequest, DeliveryOrchestrator, DeliveryResponse, PositionFailure, Stage};
pub use readiness::ServiceReadinessGate;
pub use runtime::{DispatchRuntime, RuntimeBuilder};
pub use scheduler::{HeartbeatIdentity, MaintenanceScheduler, TickOutcome};
pub use sources::{CodeEntry, ConfigSource, FileConfigSource, FilePlanSource, PlanSnapshotSource};
pub use status::{InMemoryStatusRegistry, StatusService};
pub use tasks::RuntimeTaskRegistry;
