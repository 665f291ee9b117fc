//! Configuration types for service discovery

use serde::{Deserialize, Serialize};

/// Configuration for the discovery coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Enable automatic service discovery
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Capacity of the transport event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Record unresolved placeholders as soon as an instance is announced
    #[serde(default)]
    pub track_unresolved: bool,

    /// Check the transport's live list before acting on a removal
    #[serde(default = "default_verify_removals")]
    pub verify_removals: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            event_channel_capacity: default_event_channel_capacity(),
            track_unresolved: false,
            verify_removals: default_verify_removals(),
        }
    }
}

impl DiscoveryConfig {
    /// Validates the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity cannot be 0".to_string());
        }

        Ok(())
    }
}

// Default configuration values
fn default_enabled() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_verify_removals() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DiscoveryConfig::default();
        assert!(config.enabled);
        assert!(config.verify_removals);
        assert!(!config.track_unresolved);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = DiscoveryConfig {
            event_channel_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
