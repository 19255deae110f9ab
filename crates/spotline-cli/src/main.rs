//! Spotline command-line interface
//!
//! Runs the dispatch runtime over file-backed plan and configuration
//! sources, and offers offline tools for inspecting plan snapshots and
//! runtime configuration files.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{
    config::{handle_config_command, ConfigCommand},
    plan::{handle_plan_command, PlanCommand},
    run::{handle_run_command, RunCommand},
};

#[derive(Parser)]
#[command(name = "spotline")]
#[command(about = "Spotline - Ad Dispatch Scheduling and Delivery Runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Runtime config file path
    #[arg(short, long, global = true, default_value = "spotline.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dispatch runtime and serve requests read from stdin
    Run(RunCommand),

    /// Inspect plan snapshots
    #[command(subcommand)]
    Plan(PlanCommand),

    /// Show or check the effective runtime configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flag when set
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(cmd) => {
            let config = commands::load_config(&cli.config)?;
            handle_run_command(cmd, config).await?;
        }
        Commands::Plan(cmd) => {
            handle_plan_command(cmd, &cli.config).await?;
        }
        Commands::Config(cmd) => {
            handle_config_command(cmd, &cli.config)?;
        }
    }

    Ok(())
}
