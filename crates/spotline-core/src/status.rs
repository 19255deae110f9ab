//! Service status records shared between cooperating runtimes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status a runtime reports about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Process is initialising
    Starting,
    /// Process is serving
    Running,
    /// Process is shutting down
    Stopping,
    /// Process has stopped
    Stopped,
    /// Process reported an unrecoverable fault
    Faulted,
}

impl ServiceStatus {
    /// Returns true if the service is serving
    pub fn is_running(self) -> bool {
        matches!(self, ServiceStatus::Running)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServiceStatus::Starting => "starting",
            ServiceStatus::Running => "running",
            ServiceStatus::Stopping => "stopping",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Faulted => "faulted",
        };
        f.write_str(label)
    }
}

/// One server's last reported status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Reported status
    pub status: ServiceStatus,
    /// Resource count attached to the report (remaining inventory for the
    /// dispatch runtime)
    pub resource_count: u64,
    /// When the report was written
    pub reported_at: DateTime<Utc>,
}
