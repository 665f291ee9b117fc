//! Discovery transport seam
//!
//! The coordinator only talks to the network through this trait: subscribe to
//! a service type, ask for an instance to be resolved, and list what is
//! currently live. Events are pushed into the listener channel handed to
//! `subscribe`.

use crate::error::Result;
use async_channel::Sender;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

/// Raw event delivered by a transport
///
/// Ordering is guaranteed per name within a service type, not across types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransportEvent {
    /// An instance exists but has not been resolved
    Added { service_type: String, name: String },

    /// An instance is gone
    Removed { service_type: String, name: String },

    /// An instance resolved to an endpoint
    Resolved {
        service_type: String,
        name: String,
        endpoint: SocketAddr,
    },
}

impl TransportEvent {
    /// Service type the event belongs to
    pub fn service_type(&self) -> &str {
        match self {
            TransportEvent::Added { service_type, .. }
            | TransportEvent::Removed { service_type, .. }
            | TransportEvent::Resolved { service_type, .. } => service_type,
        }
    }

    /// Instance name the event refers to
    pub fn name(&self) -> &str {
        match self {
            TransportEvent::Added { name, .. }
            | TransportEvent::Removed { name, .. }
            | TransportEvent::Resolved { name, .. } => name,
        }
    }
}

/// One entry of a transport's live instance list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Instance name
    pub name: String,

    /// Endpoint, if the transport has resolved it
    pub endpoint: Option<SocketAddr>,
}

/// Multicast-DNS style discovery mechanism
pub trait DiscoveryTransport: Send + Sync {
    /// Starts delivering events for `service_type` into `listener`
    fn subscribe(&self, service_type: &str, listener: Sender<TransportEvent>) -> Result<()>;

    /// Asks for `name` to be resolved
    ///
    /// The answer arrives later as a `Resolved` event on the subscribed
    /// listener, ordered with the other events for that name.
    fn request_resolution(&self, service_type: &str, name: &str) -> Result<()>;

    /// Instances of `service_type` the transport currently believes are live
    fn list_instances(&self, service_type: &str) -> Vec<InstanceRecord>;

    /// Releases all subscriptions and the underlying socket
    fn shutdown(&self) -> Result<()>;
}

/// Creates the transport when the coordinator starts
pub type TransportConnector = Box<dyn Fn() -> Result<Arc<dyn DiscoveryTransport>> + Send + Sync>;
