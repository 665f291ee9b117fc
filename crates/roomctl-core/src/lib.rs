//! # roomctl core
//!
//! Shared building blocks for the roomctl device-control client:
//!
//! - **Categories**: `CategoryDescriptor`, the static description of one class
//!   of controllable device and the DNS-SD service type it is advertised under.
//! - **Types**: `DeviceInstance`, one advertised service instance and its
//!   resolved endpoint.
//! - **Configuration**: YAML + environment configuration with validation.
//! - **Errors**: `thiserror` error types for configuration and I/O failures.
//!
//! ## Example
//!
//! ```
//! use roomctl_core::{AppConfig, CategoryDescriptor};
//!
//! let config = AppConfig {
//!     categories: vec![CategoryDescriptor::new("bed._ctrl._tcp", "Bed")],
//!     ..Default::default()
//! };
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.categories[0].service_type(), "bed._ctrl._tcp.local.");
//! ```

pub mod category;
pub mod config;
pub mod discovery_config;
pub mod error;
pub mod types;

pub use category::{normalize_service_type, CategoryDescriptor};
pub use config::{AppConfig, LogFormat, LoggingConfig};
pub use discovery_config::DiscoveryConfig;
pub use error::{ConfigError, Result, RoomctlError};
pub use types::DeviceInstance;
