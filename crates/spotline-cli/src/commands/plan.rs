//! Plan snapshot commands
//!
//! Loads a snapshot into a scratch store the way the runtime does at
//! start-up, optionally runs a reorganization pass over it, and prints
//! what the store ends up holding.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;
use spotline_core::TimeBucket;
use spotline_plan::{DispatchPlanStore, PlanSnapshot, StackReorganizer};
use tracing::info;

use super::load_config;

/// Plan subcommands
#[derive(Subcommand)]
pub enum PlanCommand {
    /// Load a snapshot and print store statistics
    Inspect {
        /// Plan snapshot JSON file
        path: PathBuf,

        /// Run one reorganization pass as of this bucket (minutes since the epoch)
        #[arg(long)]
        reorganize_at: Option<i64>,
    },
}

/// Handle plan command execution
pub async fn handle_plan_command(cmd: PlanCommand, config_path: &Path) -> Result<()> {
    match cmd {
        PlanCommand::Inspect {
            path,
            reorganize_at,
        } => inspect(&path, reorganize_at, config_path).await,
    }
}

async fn inspect(path: &Path, reorganize_at: Option<i64>, config_path: &Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let snapshot = PlanSnapshot::from_json(&raw).context("parsing plan snapshot")?;
    let rows = snapshot.len();

    let store = Arc::new(DispatchPlanStore::new());
    let loaded = store.load(snapshot)?;
    info!(rows, loaded, "Snapshot loaded");

    if let Some(minutes) = reorganize_at {
        let config = load_config(config_path)?;
        let reorganizer =
            StackReorganizer::new(Arc::clone(&store), config.plan.bucket_retention_minutes);
        let now = TimeBucket::from_epoch_minutes(minutes);
        if let Some(report) = reorganizer.run_pass(now) {
            println!(
                "reorganized at {now}: moved {} merged {} conflicts {} evicted {}",
                report.advance.moved,
                report.advance.merged,
                report.advance.conflicts,
                report.evicted
            );
            if let Some(err) = report.error {
                println!("  error: {err}");
            }
        }
    }

    let stats = store.stats();
    println!("rows:          {rows}");
    println!("buckets:       {}", stats.buckets);
    println!("entries:       {}", stats.entries);
    println!("ratio entries: {}", stats.ratio_entries);
    println!("remaining:     {}", stats.remaining);
    for bucket in store.buckets() {
        println!("  {bucket} ({})", bucket.epoch_minutes());
    }
    Ok(())
}
