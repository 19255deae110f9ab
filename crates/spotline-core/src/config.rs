//! Runtime configuration
//!
//! [`RuntimeConfig`] is loaded from a TOML file, overridden by `SPOTLINE_*`
//! environment variables and validated before the runtime starts.
//!
//! # Usage
//!
//! ```rust,no_run
//! use spotline_core::RuntimeConfig;
//! use std::path::Path;
//!
//! # fn example() -> Result<(), spotline_core::ConfigError> {
//! let mut config = RuntimeConfig::load_from_file(Path::new("spotline.toml"))?;
//! config.merge_with_env()?;
//! config.validate()?;
//! # Ok(())
//! # }
//! ```
//!
//! The maintenance intervals can additionally be overridden at run time by
//! named settings in the configuration cache; see the `SETTING_*` constants.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::ids::ServerId;

/// Named cache setting overriding [`MaintenanceConfig::report_health_interval_minutes`]
pub const SETTING_REPORT_HEALTH_INTERVAL: &str = "reportHealthIntervalMinutes";
/// Named cache setting overriding [`MaintenanceConfig::read_cache_interval_minutes`]
pub const SETTING_READ_CACHE_INTERVAL: &str = "readCacheIntervalMinutes";
/// Named cache setting overriding [`MaintenanceConfig::reorganize_interval_minutes`]
pub const SETTING_REORGANIZE_INTERVAL: &str = "reorganizeIntervalMinutes";

const ENV_PREFIX: &str = "SPOTLINE_";

// =============================================================================
// Configuration Sections
// =============================================================================

/// Top-level runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Name this runtime reports its status under
    pub service_name: String,

    /// Identifier of this server instance
    pub server_id: ServerId,

    /// Maintenance tick period in milliseconds
    pub tick_interval_ms: u64,

    /// Start-up readiness gate
    pub readiness: ReadinessConfig,

    /// Maintenance cadences
    pub maintenance: MaintenanceConfig,

    /// Dispatch plan retention
    pub plan: PlanConfig,

    /// Monitoring channel
    pub monitoring: MonitoringConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            service_name: "spotline-dispatch".to_string(),
            server_id: ServerId::new("local"),
            tick_interval_ms: 1_000,
            readiness: ReadinessConfig::default(),
            maintenance: MaintenanceConfig::default(),
            plan: PlanConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

/// Start-up readiness gate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Upstream planning service that must report `Running`
    pub upstream_service: String,

    /// Fixed backoff between polls, in milliseconds
    pub backoff_ms: u64,

    /// Give up after this many polls; `None` waits indefinitely
    pub max_attempts: Option<u32>,

    /// Log a stuck-state warning every this many polls
    pub warn_every: u32,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            upstream_service: "spotline-planner".to_string(),
            backoff_ms: 1_000,
            max_attempts: None,
            warn_every: 30,
        }
    }
}

/// Maintenance cadences, in minutes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Health heartbeat interval
    pub report_health_interval_minutes: u64,

    /// Configuration cache refresh interval
    pub read_cache_interval_minutes: u64,

    /// Stack reorganization interval
    pub reorganize_interval_minutes: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            report_health_interval_minutes: 1,
            read_cache_interval_minutes: 5,
            reorganize_interval_minutes: 1,
        }
    }
}

/// Dispatch plan retention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Buckets older than this many minutes behind "now" are evicted after
    /// each reorganization pass
    pub bucket_retention_minutes: u32,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            bucket_retention_minutes: 60,
        }
    }
}

/// Monitoring channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Events buffered before new events are dropped
    pub channel_capacity: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 10_000,
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

impl RuntimeConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Runtime config loaded");
        Ok(config)
    }

    /// Apply `SPOTLINE_*` environment overrides
    pub fn merge_with_env(&mut self) -> Result<(), ConfigError> {
        let applied = self.merge_with_vars(std::env::vars())?;
        if applied > 0 {
            info!(applied, "Environment overrides applied");
        }
        Ok(())
    }

    /// Apply overrides from an explicit variable list
    ///
    /// Variables without the `SPOTLINE_` prefix are ignored; unknown keys
    /// under the prefix are rejected so typos surface at start-up. Returns
    /// the number of overrides applied.
    pub fn merge_with_vars<I>(&mut self, vars: I) -> Result<usize, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut applied = 0;
        for (key, value) in vars {
            if let Some(name) = key.strip_prefix(ENV_PREFIX) {
                let name = name.to_ascii_lowercase();
                self.set_from_string(&name, &value)?;
                debug!(key = %name, "Config override applied");
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Set a single value by its flattened key
    pub fn set_from_string(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "service_name" => self.service_name = value.to_string(),
            "server_id" => self.server_id = ServerId::new(value),
            "tick_interval_ms" => self.tick_interval_ms = parse_number(key, value)?,
            "upstream_service" => self.readiness.upstream_service = value.to_string(),
            "readiness_backoff_ms" => self.readiness.backoff_ms = parse_number(key, value)?,
            "readiness_max_attempts" => {
                self.readiness.max_attempts = if value.is_empty() {
                    None
                } else {
                    Some(parse_number(key, value)?)
                };
            }
            "report_health_interval_minutes" => {
                self.maintenance.report_health_interval_minutes = parse_number(key, value)?;
            }
            "read_cache_interval_minutes" => {
                self.maintenance.read_cache_interval_minutes = parse_number(key, value)?;
            }
            "reorganize_interval_minutes" => {
                self.maintenance.reorganize_interval_minutes = parse_number(key, value)?;
            }
            "bucket_retention_minutes" => {
                self.plan.bucket_retention_minutes = parse_number(key, value)?;
            }
            "monitoring_channel_capacity" => {
                self.monitoring.channel_capacity = parse_number(key, value)?;
            }
            _ => {
                return Err(ConfigError::Override {
                    key: key.to_string(),
                    value: value.to_string(),
                    reason: "unknown key".to_string(),
                })
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::invalid("service_name", "must not be empty"));
        }
        if self.server_id.as_str().trim().is_empty() {
            return Err(ConfigError::invalid("server_id", "must not be empty"));
        }
        if self.readiness.upstream_service.trim().is_empty() {
            return Err(ConfigError::invalid(
                "readiness.upstream_service",
                "must not be empty",
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::invalid("tick_interval_ms", "must be positive"));
        }
        if self.readiness.backoff_ms == 0 {
            return Err(ConfigError::invalid("readiness.backoff_ms", "must be positive"));
        }
        if self.readiness.max_attempts == Some(0) {
            return Err(ConfigError::invalid(
                "readiness.max_attempts",
                "must be positive when set",
            ));
        }
        if self.monitoring.channel_capacity == 0 {
            return Err(ConfigError::invalid(
                "monitoring.channel_capacity",
                "must be positive",
            ));
        }

        let intervals = [
            (
                "maintenance.report_health_interval_minutes",
                self.maintenance.report_health_interval_minutes,
            ),
            (
                "maintenance.read_cache_interval_minutes",
                self.maintenance.read_cache_interval_minutes,
            ),
            (
                "maintenance.reorganize_interval_minutes",
                self.maintenance.reorganize_interval_minutes,
            ),
        ];
        for (field, minutes) in intervals {
            if minutes == 0 {
                return Err(ConfigError::invalid(field, "must be positive"));
            }
            if self.tick_interval_ms > minutes.saturating_mul(60_000) {
                return Err(ConfigError::invalid(
                    "tick_interval_ms",
                    format!("longer than {field}"),
                ));
            }
        }

        Ok(())
    }

    /// Maintenance tick period
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Readiness poll backoff
    pub fn readiness_backoff(&self) -> Duration {
        Duration::from_millis(self.readiness.backoff_ms)
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Override {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        RuntimeConfig::default().validate().unwrap();
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
service_name = "dispatch-eu"

[maintenance]
reorganize_interval_minutes = 2
"#
        )
        .unwrap();

        let config = RuntimeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.service_name, "dispatch-eu");
        assert_eq!(config.maintenance.reorganize_interval_minutes, 2);
        assert_eq!(config.maintenance.read_cache_interval_minutes, 5);
        assert_eq!(config.readiness, ReadinessConfig::default());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = RuntimeConfig::load_from_file(Path::new("/nonexistent/spotline.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RuntimeConfig::default();
        let applied = config
            .merge_with_vars(vec![
                ("SPOTLINE_SERVER_ID".to_string(), "node-7".to_string()),
                ("SPOTLINE_READINESS_MAX_ATTEMPTS".to_string(), "12".to_string()),
                ("PATH".to_string(), "/usr/bin".to_string()),
            ])
            .unwrap();

        assert_eq!(applied, 2);
        assert_eq!(config.server_id, ServerId::new("node-7"));
        assert_eq!(config.readiness.max_attempts, Some(12));
    }

    #[test]
    fn test_env_override_rejects_unknown_key() {
        let mut config = RuntimeConfig::default();
        let err = config
            .merge_with_vars(vec![("SPOTLINE_NOPE".to_string(), "1".to_string())])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Override { .. }));
    }

    #[test]
    fn test_env_override_rejects_bad_number() {
        let mut config = RuntimeConfig::default();
        let err = config.set_from_string("tick_interval_ms", "soon").unwrap_err();
        assert!(matches!(err, ConfigError::Override { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = RuntimeConfig::default();
        config.maintenance.reorganize_interval_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_tick_longer_than_interval() {
        let mut config = RuntimeConfig::default();
        config.tick_interval_ms = 120_000;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "tick_interval_ms",
                ..
            }
        ));
    }
}
