//! Start-up readiness gate
//!
//! The runtime must not load or serve a dispatch plan before the upstream
//! planning service has finished computing it. The gate polls the upstream
//! service's status with a fixed backoff until any of its servers reports
//! `Running`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use spotline_core::ReadinessConfig;

use crate::errors::{Result, RuntimeError};
use crate::status::StatusService;

/// Blocks start-up until the upstream service is running
pub struct ServiceReadinessGate {
    status: Arc<dyn StatusService>,
    config: ReadinessConfig,
}

impl std::fmt::Debug for ServiceReadinessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceReadinessGate")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ServiceReadinessGate {
    /// Gate polling `status` as configured
    pub fn new(status: Arc<dyn StatusService>, config: ReadinessConfig) -> Self {
        Self { status, config }
    }

    /// Poll until an upstream server is running; returns the attempts made
    ///
    /// With `max_attempts` unset this waits indefinitely, logging a warning
    /// every `warn_every` attempts.
    #[instrument(skip(self, cancel), fields(upstream = %self.config.upstream_service))]
    pub async fn wait_until_ready(&self, cancel: &CancellationToken) -> Result<u32> {
        let service = self.config.upstream_service.as_str();
        let backoff = std::time::Duration::from_millis(self.config.backoff_ms);
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            match self.status.get_statuses(service).await {
                Ok(statuses) => {
                    if let Some((server, _)) = statuses.iter().find(|(_, record)| record.status.is_running()) {
                        info!(%server, attempts, "Upstream service is running");
                        return Ok(attempts);
                    }
                    debug!(servers = statuses.len(), attempts, "Upstream service not running yet");
                }
                Err(err) => debug!(error = %err, attempts, "Upstream status unavailable"),
            }

            if self.config.max_attempts.is_some_and(|max| attempts >= max) {
                warn!(attempts, "Giving up waiting for upstream service");
                return Err(RuntimeError::UpstreamNotReady {
                    service: service.to_string(),
                    attempts,
                });
            }
            if self.config.warn_every > 0 && attempts % self.config.warn_every == 0 {
                warn!(attempts, "Still waiting for upstream service to report running");
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }
}
