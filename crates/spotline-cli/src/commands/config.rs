//! Configuration commands
//!
//! Offline checks of a runtime config file with environment overrides
//! applied, the same way `spotline run` would see it.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;

use super::load_config;

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Validate the effective configuration
    Check,
}

/// Handle configuration command execution
pub fn handle_config_command(cmd: ConfigCommand, path: &Path) -> Result<()> {
    let config = load_config(path)?;
    match cmd {
        ConfigCommand::Show => {
            let rendered = toml::to_string_pretty(&config).context("rendering config")?;
            print!("{rendered}");
        }
        ConfigCommand::Check => {
            config.validate()?;
            println!(
                "ok: {} on {} (tick {}ms, upstream {})",
                config.service_name,
                config.server_id,
                config.tick_interval_ms,
                config.readiness.upstream_service
            );
        }
    }
    Ok(())
}
