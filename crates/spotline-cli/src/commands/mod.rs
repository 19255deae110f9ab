//! CLI command implementations

pub mod config;
pub mod plan;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use spotline_core::RuntimeConfig;
use tracing::{debug, info};

/// Load the runtime configuration for a command
///
/// A missing file falls back to the defaults; `SPOTLINE_*` environment
/// overrides are applied either way.
pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    let mut config = if path.exists() {
        info!(path = %path.display(), "Loading runtime config");
        RuntimeConfig::load_from_file(path)?
    } else {
        debug!(path = %path.display(), "No config file, using defaults");
        RuntimeConfig::default()
    };
    config
        .merge_with_env()
        .context("applying environment overrides")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.tick_interval_ms, RuntimeConfig::default().tick_interval_ms);
    }

    #[test]
    fn test_file_values_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spotline.toml");
        std::fs::write(&path, "service_name = \"dispatch-eu\"\ntick_interval_ms = 250\n").unwrap();

        let config = load_config(&path).unwrap();

        assert_eq!(config.service_name, "dispatch-eu");
        assert_eq!(config.tick_interval_ms, 250);
    }
}
