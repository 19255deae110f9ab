//! Error types shared across Spotline crates

use std::path::PathBuf;

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Errors raised by shared core helpers
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration could not be loaded or validated
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A value failed validation
    #[error("Invalid value: {0}")]
    Invalid(String),
}

impl CoreError {
    /// Create an invalid value error
    pub fn invalid(message: impl Into<String>) -> Self {
        CoreError::Invalid(message.into())
    }
}

/// Errors raised while loading or validating [`crate::RuntimeConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}")]
    Read {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the schema
    #[error("Failed to parse config file {path}")]
    Parse {
        /// Path that was parsed
        path: PathBuf,
        /// Underlying TOML error
        #[source]
        source: toml::de::Error,
    },

    /// An environment override could not be applied
    #[error("Invalid override {key}={value}: {reason}")]
    Override {
        /// Configuration key
        key: String,
        /// Offending value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A field failed validation
    #[error("Invalid configuration field {field}: {reason}")]
    Invalid {
        /// Dotted field path
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    /// Create a field validation error
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
