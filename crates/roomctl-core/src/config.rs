//! Configuration management for roomctl.
//!
//! This module provides the application configuration:
//! - Loading from YAML files
//! - Environment variable overrides (`ROOMCTL__*`)
//! - Validation of the category list and discovery settings

use crate::category::CategoryDescriptor;
use crate::discovery_config::DiscoveryConfig;
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::Level;

/// Main application configuration.
///
/// # Examples
///
/// ```no_run
/// use roomctl_core::config::AppConfig;
///
/// let config = AppConfig::from_file("roomctl.yaml").unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Device categories to browse for, fixed for the process lifetime
    #[serde(default = "CategoryDescriptor::defaults")]
    pub categories: Vec<CategoryDescriptor>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()).into());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration using the `config` crate, layering
    /// `ROOMCTL__*` environment variables over the file.
    pub fn from_config_builder<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix("ROOMCTL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    ///
    /// Checks for at least one category, unique service types, non-empty
    /// display names and sane discovery settings.
    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(ConfigError::NoCategories.into());
        }

        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.display_name().trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    "categories.display_name",
                    format!("empty display name for {}", category.service_type()),
                )
                .into());
            }

            if !seen.insert(category.service_type()) {
                return Err(ConfigError::DuplicateCategory {
                    service_type: category.service_type().to_string(),
                }
                .into());
            }
        }

        self.discovery
            .validate()
            .map_err(|reason| ConfigError::invalid_value("discovery", reason))?;

        self.logging.parse_level()?;

        Ok(())
    }

    /// Looks up a category by (possibly un-normalised) service type.
    pub fn category(&self, service_type: &str) -> Option<&CategoryDescriptor> {
        self.categories.iter().find(|c| c.matches(service_type))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            categories: CategoryDescriptor::defaults(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default)]
    pub format: LogFormat,

    /// Whether to include file/line info
    #[serde(default)]
    pub file_line: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            file_line: false,
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                reason: format!("Invalid log level: {}", self.level),
            }
            .into()
        })
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
}
