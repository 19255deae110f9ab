//! External data sources
//!
//! The runtime reads its plan snapshot and its configuration collections
//! through these traits. The file-backed implementations read JSON and are
//! what the CLI wires up; production deployments plug in their own stores.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use spotline_core::{MediaId, PositionOrGroup};
use spotline_plan::PlanSnapshot;
use spotline_plugin::{
    Creative, Group, PipelineConfiguration, PluginReference, Position, SerializerMapping,
};

use crate::errors::SourceError;

/// One row of a media's code table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeEntry {
    /// Media the code belongs to
    pub media: MediaId,
    /// Human-readable position code
    pub code: String,
    /// Position or group the code names
    pub target: PositionOrGroup,
}

/// Source of the start-up dispatch plan
#[async_trait]
pub trait PlanSnapshotSource: Send + Sync {
    /// Fetch the full snapshot
    async fn fetch_snapshot(&self) -> Result<PlanSnapshot, SourceError>;
}

/// Source of the configuration collections
///
/// Each collection is fetched independently so one failing collection does
/// not hold back the others.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Pipeline bindings
    async fn fetch_pipelines(&self) -> Result<Vec<PipelineConfiguration>, SourceError>;

    /// Code tables of every media
    async fn fetch_code_tables(&self) -> Result<Vec<CodeEntry>, SourceError>;

    /// Position table
    async fn fetch_positions(&self) -> Result<Vec<Position>, SourceError>;

    /// Group table
    async fn fetch_groups(&self) -> Result<Vec<Group>, SourceError>;

    /// Creatives
    async fn fetch_creatives(&self) -> Result<Vec<Creative>, SourceError>;

    /// Serializer mappings
    async fn fetch_serializer_mappings(&self) -> Result<Vec<SerializerMapping>, SourceError>;

    /// Serializer selector to use
    async fn fetch_selector(&self) -> Result<PluginReference, SourceError>;

    /// Targeting definitions
    async fn fetch_targeting(&self) -> Result<serde_json::Value, SourceError>;

    /// IP libraries
    async fn fetch_ip_libraries(&self) -> Result<serde_json::Value, SourceError>;

    /// Named settings of `service`
    async fn fetch_settings(&self, service: &str) -> Result<BTreeMap<String, String>, SourceError>;
}

// =============================================================================
// File-backed Sources
// =============================================================================

async fn read_json(path: &Path) -> Result<serde_json::Value, SourceError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| SourceError::Io {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    serde_json::from_str(&raw)
        .map_err(|err| SourceError::malformed(path.display().to_string(), err.to_string()))
}

/// Plan snapshot read from a JSON file
#[derive(Debug, Clone)]
pub struct FilePlanSource {
    path: PathBuf,
}

impl FilePlanSource {
    /// Source reading `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PlanSnapshotSource for FilePlanSource {
    async fn fetch_snapshot(&self) -> Result<PlanSnapshot, SourceError> {
        let value = read_json(&self.path).await?;
        let snapshot: PlanSnapshot = serde_json::from_value(value)
            .map_err(|err| SourceError::malformed("plan snapshot", err.to_string()))?;
        debug!(path = %self.path.display(), rows = snapshot.len(), "Plan snapshot read");
        Ok(snapshot)
    }
}

/// Configuration collections read from one JSON document
///
/// The document is an object with one field per collection (`pipelines`,
/// `codes`, `positions`, `groups`, `creatives`, `serializer_mappings`,
/// `selector`, `targeting`, `ip_libraries`) plus `settings`, an object of
/// per-service string maps. The file is re-read on every fetch, so edits
/// are picked up by the next refresh.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    /// Source reading `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn collection<T: DeserializeOwned>(&self, name: &str) -> Result<T, SourceError> {
        let mut document = read_json(&self.path).await?;
        let value = document
            .get_mut(name)
            .map(serde_json::Value::take)
            .ok_or_else(|| SourceError::unavailable(name, "missing from document"))?;
        serde_json::from_value(value).map_err(|err| SourceError::malformed(name, err.to_string()))
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn fetch_pipelines(&self) -> Result<Vec<PipelineConfiguration>, SourceError> {
        self.collection("pipelines").await
    }

    async fn fetch_code_tables(&self) -> Result<Vec<CodeEntry>, SourceError> {
        self.collection("codes").await
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>, SourceError> {
        self.collection("positions").await
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>, SourceError> {
        self.collection("groups").await
    }

    async fn fetch_creatives(&self) -> Result<Vec<Creative>, SourceError> {
        self.collection("creatives").await
    }

    async fn fetch_serializer_mappings(&self) -> Result<Vec<SerializerMapping>, SourceError> {
        self.collection("serializer_mappings").await
    }

    async fn fetch_selector(&self) -> Result<PluginReference, SourceError> {
        self.collection("selector").await
    }

    async fn fetch_targeting(&self) -> Result<serde_json::Value, SourceError> {
        self.collection("targeting").await
    }

    async fn fetch_ip_libraries(&self) -> Result<serde_json::Value, SourceError> {
        self.collection("ip_libraries").await
    }

    async fn fetch_settings(&self, service: &str) -> Result<BTreeMap<String, String>, SourceError> {
        let mut settings: BTreeMap<String, BTreeMap<String, String>> =
            self.collection("settings").await?;
        Ok(settings.remove(service).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn document(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_collections_fail_independently() {
        let file = document(
            r#"{
                "codes": [{"media": 1, "code": "pre", "target": {"kind": "position", "id": 10}}],
                "positions": "not a list",
                "settings": {"spotline-dispatch": {"readCacheIntervalMinutes": "2"}}
            }"#,
        );
        let source = FileConfigSource::new(file.path());

        let codes = source.fetch_code_tables().await.unwrap();
        assert_eq!(codes[0].code, "pre");
        assert!(matches!(
            source.fetch_positions().await,
            Err(SourceError::Malformed { .. })
        ));
        assert!(matches!(
            source.fetch_groups().await,
            Err(SourceError::Unavailable { .. })
        ));

        let settings = source.fetch_settings("spotline-dispatch").await.unwrap();
        assert_eq!(settings.get("readCacheIntervalMinutes").map(String::as_str), Some("2"));
        assert!(source.fetch_settings("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let source = FilePlanSource::new("/nonexistent/plan.json");
        assert!(matches!(
            source.fetch_snapshot().await,
            Err(SourceError::Io { .. })
        ));
    }
}
