//! Device discovery and failover for roomctl
//!
//! This crate keeps track of device-control services advertised on the local
//! segment and decides which instance of each device category receives
//! control commands:
//! - Browse for every configured category's DNS-SD service type
//! - Track one-or-more instances per category
//! - Designate a current instance and fail over when it disappears
//! - Tell the presentation layer when a category's panel comes and goes
//!
//! # Architecture
//!
//! A [`DiscoveryTransport`] (the `mdns-sd` backed [`MdnsTransport`] in
//! production) pushes raw events into a channel. The [`DiscoveryCoordinator`]
//! drains that channel on a single task, routes each event to the
//! [`CategoryRegistry`] for its service type, and forwards the resulting
//! [`Transition`] to a [`Presentation`] implementation.
//!
//! # Example
//!
//! ```no_run
//! use roomctl_core::AppConfig;
//! use roomctl_discovery::{DiscoveryCoordinator, MdnsTransport, PresentationDispatcher};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default();
//!     let (presentation, panels) = PresentationDispatcher::new();
//!
//!     let coordinator = Arc::new(DiscoveryCoordinator::from_config(
//!         &config,
//!         Arc::new(presentation),
//!         MdnsTransport::connector(),
//!     )?);
//!     coordinator.start()?;
//!
//!     while let Ok(command) = panels.recv().await {
//!         println!("{:?}", command);
//!     }
//!
//!     coordinator.stop();
//!     Ok(())
//! }
//! ```

pub mod control;
pub mod coordinator;
pub mod error;
pub mod mdns;
pub mod presentation;
pub mod registry;
pub mod transport;

pub use control::{ControlHandle, ControlTarget};
pub use coordinator::DiscoveryCoordinator;
pub use error::{DiscoveryError, Result};
pub use mdns::MdnsTransport;
pub use presentation::{PanelCommand, Presentation, PresentationDispatcher};
pub use registry::{CategoryRegistry, CategorySnapshot, Transition};
pub use transport::{DiscoveryTransport, InstanceRecord, TransportConnector, TransportEvent};
