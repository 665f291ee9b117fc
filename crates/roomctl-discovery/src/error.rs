//! Error types for the discovery coordinator

use thiserror::Error;

/// Result type alias for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Errors that can occur during service discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The discovery mechanism could not be created (e.g. no usable interface)
    #[error("Discovery transport unavailable: {0}")]
    TransportUnavailable(String),

    /// An event referenced a service type with no configured category
    #[error("Unknown category for service type '{0}'")]
    UnknownCategory(String),

    /// A removal for a name that is not tracked, or is still live
    #[error("Stale removal of '{name}' for service type '{service_type}'")]
    StaleRemoval { service_type: String, name: String },

    /// Registry state broke its own invariants
    #[error("Registry invariant violated for '{service_type}': {details}")]
    InvariantViolation {
        service_type: String,
        details: String,
    },

    /// Selection of an instance that is unknown or not yet resolved
    #[error("Instance '{name}' of '{service_type}' is not available for control")]
    InstanceUnavailable { service_type: String, name: String },

    /// Failed to subscribe to a service type
    #[error("Failed to subscribe to service type '{service_type}': {reason}")]
    SubscribeFailed {
        service_type: String,
        reason: String,
    },

    /// Service resolution could not be requested
    #[error("Failed to resolve service '{name}': {reason}")]
    ResolutionFailed { name: String, reason: String },

    /// Invalid coordinator configuration
    #[error("Invalid discovery configuration: {0}")]
    InvalidConfig(String),

    /// Discovery already started
    #[error("Discovery coordinator is already running")]
    AlreadyStarted,

    /// Discovery not started
    #[error("Discovery coordinator has not been started")]
    NotStarted,

    /// Internal error
    #[error("Internal discovery error: {0}")]
    Internal(String),
}

impl DiscoveryError {
    /// Returns true if this error must stop startup.
    ///
    /// Everything raised while handling events is contained by the coordinator.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DiscoveryError::TransportUnavailable(_))
    }
}
