//! Per-category control handle
//!
//! The handle is what the presentation layer receives when a panel is
//! attached. Commands issued from the panel read the target from it, so the
//! coordinator can redirect control traffic to a new instance without
//! re-attaching the panel. Only the owning registry moves the target; a panel
//! switches instances through `DiscoveryCoordinator::select`.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

/// Instance currently receiving control commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlTarget {
    /// Instance name
    pub instance: String,

    /// Resolved endpoint of the instance
    pub endpoint: SocketAddr,
}

/// Shared, cheaply clonable handle to a category's control target
#[derive(Clone)]
pub struct ControlHandle {
    id: Uuid,
    service_type: Arc<str>,
    target: Arc<RwLock<Option<ControlTarget>>>,
}

impl ControlHandle {
    /// Creates a disabled handle for a category
    pub fn new(service_type: impl Into<Arc<str>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_type: service_type.into(),
            target: Arc::new(RwLock::new(None)),
        }
    }

    /// Identifier used by the presentation layer to match attach/detach
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Service type of the owning category
    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Current target, if any
    pub fn target(&self) -> Option<ControlTarget> {
        self.target.read().clone()
    }

    /// Current endpoint, if any
    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.target.read().as_ref().map(|t| t.endpoint)
    }

    /// Points the handle at a new instance
    pub(crate) fn redirect(&self, instance: impl Into<String>, endpoint: SocketAddr) {
        *self.target.write() = Some(ControlTarget {
            instance: instance.into(),
            endpoint,
        });
    }

    /// Drops the target; commands have nowhere to go until the next redirect
    pub(crate) fn disable(&self) {
        *self.target.write() = None;
    }

    /// Whether commands currently have a target
    pub fn is_enabled(&self) -> bool {
        self.target.read().is_some()
    }
}

impl PartialEq for ControlHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ControlHandle {}

impl fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlHandle")
            .field("id", &self.id)
            .field("service_type", &self.service_type)
            .field("target", &*self.target.read())
            .finish()
    }
}
