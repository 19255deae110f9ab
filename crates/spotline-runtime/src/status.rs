//! Service status contract
//!
//! Cooperating runtimes publish `(service, server) → (status, resource count)`
//! records here. The dispatch runtime writes its own heartbeat and reads the
//! upstream planner's records before it starts.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::trace;

use spotline_core::{ServerId, ServiceStatus, StatusRecord};

use crate::errors::SourceError;

/// Shared service status store
#[async_trait]
pub trait StatusService: Send + Sync {
    /// Publish this server's status for `service`
    async fn report_status(
        &self,
        service: &str,
        server: &ServerId,
        status: ServiceStatus,
        resource_count: u64,
    ) -> Result<(), SourceError>;

    /// Every server's last record for `service`
    async fn get_statuses(&self, service: &str) -> Result<HashMap<ServerId, StatusRecord>, SourceError>;
}

/// Process-local status store
#[derive(Debug, Default)]
pub struct InMemoryStatusRegistry {
    records: RwLock<HashMap<String, HashMap<ServerId, StatusRecord>>>,
}

impl InMemoryStatusRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Last record of one server, if any
    pub fn record(&self, service: &str, server: &ServerId) -> Option<StatusRecord> {
        self.records.read().get(service)?.get(server).cloned()
    }
}

#[async_trait]
impl StatusService for InMemoryStatusRegistry {
    async fn report_status(
        &self,
        service: &str,
        server: &ServerId,
        status: ServiceStatus,
        resource_count: u64,
    ) -> Result<(), SourceError> {
        trace!(service, %server, %status, resource_count, "Status reported");
        self.records
            .write()
            .entry(service.to_string())
            .or_default()
            .insert(
                server.clone(),
                StatusRecord {
                    status,
                    resource_count,
                    reported_at: Utc::now(),
                },
            );
        Ok(())
    }

    async fn get_statuses(&self, service: &str) -> Result<HashMap<ServerId, StatusRecord>, SourceError> {
        Ok(self.records.read().get(service).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_report_overwrites_per_server() {
        let registry = InMemoryStatusRegistry::new();
        let server = ServerId::new("a");

        registry
            .report_status("svc", &server, ServiceStatus::Starting, 0)
            .await
            .unwrap();
        registry
            .report_status("svc", &server, ServiceStatus::Running, 12)
            .await
            .unwrap();
        registry
            .report_status("svc", &ServerId::new("b"), ServiceStatus::Stopped, 0)
            .await
            .unwrap();

        let statuses = registry.get_statuses("svc").await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[&server].status, ServiceStatus::Running);
        assert_eq!(statuses[&server].resource_count, 12);
        assert!(registry.get_statuses("other").await.unwrap().is_empty());
    }
}
