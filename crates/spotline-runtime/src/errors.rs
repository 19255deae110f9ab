//! Runtime error types
//!
//! Three layers of failure with different blast radii:
//!
//! - [`SourceError`]: an external collaborator could not be read; callers
//!   keep their previous state
//! - [`DeliveryError`]: one position of one request failed; siblings carry on
//! - [`RuntimeError`]: start-up or lifecycle failure of the runtime itself

use std::path::PathBuf;

use thiserror::Error;

use spotline_core::{ConfigError, MediaId, PositionOrGroup};
use spotline_plan::PlanError;
use spotline_plugin::{PluginError, PluginId};

use crate::orchestrator::Stage;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failures reading from an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The collaborator could not serve the request
    #[error("{collection} unavailable: {reason}")]
    Unavailable {
        /// Collection or resource requested
        collection: String,
        /// Reported cause
        reason: String,
    },

    /// Backing file could not be read
    #[error("Failed to read {path}: {reason}")]
    Io {
        /// File path
        path: PathBuf,
        /// Rendered I/O error
        reason: String,
    },

    /// Payload did not match the expected shape
    #[error("Malformed {collection}: {reason}")]
    Malformed {
        /// Collection or resource requested
        collection: String,
        /// Rendered parse error
        reason: String,
    },
}

impl SourceError {
    /// Create an unavailable error
    pub fn unavailable(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            collection: collection.into(),
            reason: reason.into(),
        }
    }

    /// Create a malformed payload error
    pub fn malformed(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            collection: collection.into(),
            reason: reason.into(),
        }
    }
}

/// Failure of one position code within one request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeliveryError {
    /// No pipeline binds the media and target
    #[error("No pipeline for {target} in media {media}")]
    UnknownPipeline {
        /// Requesting media
        media: MediaId,
        /// Resolved position or group
        target: PositionOrGroup,
    },

    /// Plugin resolution or a plugin call failed
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// A plugin panicked
    #[error("Plugin '{plugin}' panicked: {message}")]
    PluginPanicked {
        /// Panicking plugin
        plugin: PluginId,
        /// Panic payload, if it was a string
        message: String,
    },

    /// The request was cancelled before the stage began
    #[error("Request cancelled before {stage}")]
    Cancelled {
        /// Stage that did not run
        stage: Stage,
    },
}

/// Runtime lifecycle errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration was rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dispatch plan could not be loaded
    #[error("Dispatch plan error: {0}")]
    Plan(#[from] PlanError),

    /// External collaborator failure
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Upstream planning service never reported `Running`
    #[error("Upstream service '{service}' not ready after {attempts} attempts")]
    UpstreamNotReady {
        /// Upstream service name
        service: String,
        /// Polls made
        attempts: u32,
    },

    /// Start-up was cancelled
    #[error("Start-up cancelled")]
    Cancelled,
}

impl RuntimeError {
    /// Returns true if the error came from cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RuntimeError::Cancelled)
    }
}
