//! Runtime command
//!
//! Starts the dispatch runtime over a plan snapshot file and a configuration
//! document, then serves newline-delimited JSON ad requests from stdin and
//! writes one JSON response per line to stdout until stdin closes or the
//! process is interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use spotline_core::{RuntimeConfig, ServerId, ServiceStatus};
use spotline_plugin::{builtin::register_builtins, PluginRegistry};
use spotline_runtime::{
    AdRequest, DeliveryResponse, DispatchRuntime, FileConfigSource, FilePlanSource,
    InMemoryStatusRegistry, RuntimeBuilder, StatusService,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Server id used when standing in for the upstream planner
const STANDALONE_UPSTREAM: &str = "standalone";

/// Run command for serving ad requests
#[derive(Args)]
pub struct RunCommand {
    /// Plan snapshot JSON file
    #[arg(long)]
    pub plan: PathBuf,

    /// Configuration collections JSON document
    #[arg(long)]
    pub collections: PathBuf,

    /// Report the upstream planner as running instead of waiting for it
    #[arg(long)]
    pub standalone: bool,
}

/// Handle run command execution
pub async fn handle_run_command(cmd: RunCommand, config: RuntimeConfig) -> Result<()> {
    info!(service = %config.service_name, server = %config.server_id, "Starting Spotline runtime...");

    let registry = Arc::new(PluginRegistry::new());
    register_builtins(&registry);

    let status = Arc::new(InMemoryStatusRegistry::new());
    if cmd.standalone {
        status
            .report_status(
                &config.readiness.upstream_service,
                &ServerId::new(STANDALONE_UPSTREAM),
                ServiceStatus::Running,
                0,
            )
            .await?;
    } else {
        warn!("Upstream status is process-local; without --standalone start-up waits until the readiness limit");
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            interrupt.cancel();
        }
    });

    let runtime = RuntimeBuilder::new(
        config,
        registry,
        Arc::new(FileConfigSource::new(&cmd.collections)),
        Arc::new(FilePlanSource::new(&cmd.plan)),
        status,
    )
    .start(&cancel)
    .await
    .context("starting dispatch runtime")?;

    info!("Runtime started, reading requests from stdin");
    let served = serve_stdin(&runtime, &cancel).await;

    runtime.shutdown().await;
    let served = served?;
    info!(served, "Runtime stopped");
    Ok(())
}

async fn serve_stdin(runtime: &DispatchRuntime, cancel: &CancellationToken) -> Result<u64> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut served = 0u64;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line.context("reading stdin")?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let output = match serde_json::from_str::<AdRequest>(&line) {
            Ok(request) => {
                let orchestrator = runtime.orchestrator();
                let request_cancel = cancel.child_token();
                let response = tokio::task::spawn_blocking(move || {
                    orchestrator.serve(&request, &request_cancel)
                })
                .await
                .context("request task failed")?;
                served += 1;
                render(&response)
            }
            Err(err) => {
                error!(error = %err, "Malformed request line");
                json!({ "error": err.to_string() })
            }
        };

        stdout.write_all(output.to_string().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(served)
}

fn render(response: &DeliveryResponse) -> serde_json::Value {
    let failures: Vec<serde_json::Value> = response
        .failures
        .iter()
        .map(|failure| {
            json!({
                "code": failure.code,
                "position": failure.position.map(|position| position.to_string()),
                "stage": failure.stage,
                "error": failure.error.to_string(),
            })
        })
        .collect();
    json!({
        "request": response.request,
        "stage": response.stage,
        "granted": response.granted,
        "payload": response.payload,
        "failures": failures,
    })
}
