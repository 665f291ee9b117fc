//! Common test utilities and helpers for integration tests

use std::path::PathBuf;

/// Path to the shipped example configuration
pub fn example_config() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .join("config")
        .join("roomctl.example.yaml")
}
