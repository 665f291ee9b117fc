//! Error types shared across roomctl crates.
//!
//! Configuration and I/O failures are wrapped in `RoomctlError`. All variants
//! are serializable so they can be logged as structured data.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Result type alias using RoomctlError as the error type.
pub type Result<T> = std::result::Result<T, RoomctlError>;

/// Top-level error type for roomctl operations.
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum RoomctlError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

/// Errors related to configuration.
///
/// These errors occur when loading, parsing, or validating configuration files.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// No device categories configured
    #[error("No device categories configured")]
    NoCategories,

    /// Two categories share a service type
    #[error("Duplicate category service type: {service_type}")]
    DuplicateCategory { service_type: String },
}

impl ConfigError {
    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Wrapper for I/O errors to make them serializable.
#[derive(Debug, Error, Serialize, Deserialize)]
#[error("I/O error: {kind}: {message}")]
pub struct IoError {
    pub kind: String,
    pub message: String,
}

impl From<io::Error> for IoError {
    fn from(err: io::Error) -> Self {
        Self {
            kind: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }
}

impl From<io::Error> for RoomctlError {
    fn from(err: io::Error) -> Self {
        RoomctlError::Io(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = RoomctlError::Config(ConfigError::DuplicateCategory {
            service_type: "_bedroom._tcp.local.".to_string(),
        });
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("Config"));
        assert!(json.contains("_bedroom._tcp.local."));
    }

    #[test]
    fn test_config_error_helpers() {
        let err = ConfigError::file_not_found("/etc/roomctl/roomctl.yaml");
        assert!(matches!(err, ConfigError::FileNotFound { .. }));

        let err = ConfigError::invalid_value("logging.level", "unknown level");
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: RoomctlError = io_err.into();
        assert!(matches!(err, RoomctlError::Io(_)));
        assert!(err.to_string().contains("NotFound"));
    }
}
