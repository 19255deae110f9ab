//! Plugin errors

use thiserror::Error;

use crate::version::{PluginId, PluginKind, PluginVersion};

/// Result type for plugin operations
pub type PluginResult<T> = std::result::Result<T, PluginError>;

/// Errors raised by plugin resolution and plugin calls
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    /// No registered version of the plugin satisfies the minimum
    #[error("No {kind} plugin '{id}' registered at version >= {minimum}")]
    NotFound {
        /// Requested kind
        kind: PluginKind,
        /// Requested plugin id
        id: PluginId,
        /// Requested minimum version
        minimum: PluginVersion,
    },

    /// A reference was resolved through the accessor of another kind
    #[error("Plugin reference '{id}' is a {found} plugin, expected {expected}")]
    KindMismatch {
        /// Plugin id of the reference
        id: PluginId,
        /// Kind the caller asked for
        expected: PluginKind,
        /// Kind the reference carries
        found: PluginKind,
    },

    /// A version string could not be parsed
    #[error("Invalid plugin version '{input}': {reason}")]
    InvalidVersion {
        /// Rejected input
        input: String,
        /// Why it was rejected
        reason: String,
    },

    /// A plugin call reported a failure
    #[error("Plugin '{id}' failed: {reason}")]
    Failed {
        /// Failing plugin
        id: PluginId,
        /// Reported cause
        reason: String,
    },
}

impl PluginError {
    /// Create a plugin call failure
    pub fn failed(id: impl Into<PluginId>, reason: impl Into<String>) -> Self {
        Self::Failed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid version error
    pub fn invalid_version(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidVersion {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error is a resolution miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
