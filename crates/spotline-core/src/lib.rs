//! Spotline Core: shared vocabulary for the ad dispatch runtime
//!
//! This crate holds the value types every other Spotline crate speaks in:
//! identifiers, the [`Ad`] allocation unit, minute-granular [`TimeBucket`]s,
//! service status records, monitoring events, the clock abstraction and
//! the runtime configuration.
//!
//! # Design Principles
//!
//! - **Value types**: identifiers and `Ad` are `Copy + Eq + Hash` so they can
//!   key concurrent maps without interior mutability
//! - **Normalised time**: a `TimeBucket` can only be built by truncating a
//!   timestamp to the minute
//! - **No runtime dependencies**: nothing here spawns tasks or takes locks

#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod ad;
pub mod bucket;
pub mod config;
pub mod errors;
pub mod ids;
pub mod monitoring;
pub mod status;
pub mod time;

pub use ad::Ad;
pub use bucket::{SlotPosition, TimeBucket};
pub use config::{
    MaintenanceConfig, MonitoringConfig, PlanConfig, ReadinessConfig, RuntimeConfig,
    SETTING_READ_CACHE_INTERVAL, SETTING_REORGANIZE_INTERVAL, SETTING_REPORT_HEALTH_INTERVAL,
};
pub use errors::{ConfigError, CoreError, CoreResult};
pub use ids::{
    CreativeTypeId, GroupId, MaterialId, MediaId, PositionId, PositionOrGroup, ServerId,
};
pub use monitoring::{Correlation, MonitoringEvent};
pub use status::{ServiceStatus, StatusRecord};
pub use time::{Clock, SystemClock};
