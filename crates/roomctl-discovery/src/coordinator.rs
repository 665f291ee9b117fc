//! Discovery coordinator
//!
//! Owns one [`CategoryRegistry`] per configured category, subscribes the
//! transport to every category's service type and turns transport events into
//! registry mutations plus presentation calls.
//!
//! Transport events are funnelled through a single pump task, so registry
//! mutations are applied one at a time. Each registry also sits behind its own
//! mutex so snapshots and direct `handle_*` calls from other threads stay
//! serialized with the pump.

use crate::control::ControlHandle;
use crate::error::{DiscoveryError, Result};
use crate::presentation::Presentation;
use crate::registry::{CategoryRegistry, CategorySnapshot, Transition};
use crate::transport::{DiscoveryTransport, TransportConnector, TransportEvent};
use parking_lot::{Mutex, RwLock};
use roomctl_core::{normalize_service_type, AppConfig, CategoryDescriptor, DiscoveryConfig};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Top-level discovery state for the process
pub struct DiscoveryCoordinator {
    config: DiscoveryConfig,

    /// Registries keyed by normalised service type
    registries: HashMap<String, Arc<Mutex<CategoryRegistry>>>,

    /// Service types in configuration order
    order: Vec<String>,

    presentation: Arc<dyn Presentation>,

    connector: TransportConnector,

    /// Live transport, present between `start` and `stop`
    transport: RwLock<Option<Arc<dyn DiscoveryTransport>>>,

    running: AtomicBool,

    pump: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryCoordinator {
    /// Creates a coordinator for a fixed set of categories
    pub fn new(
        config: DiscoveryConfig,
        categories: Vec<CategoryDescriptor>,
        presentation: Arc<dyn Presentation>,
        connector: TransportConnector,
    ) -> Result<Self> {
        config.validate().map_err(DiscoveryError::InvalidConfig)?;

        if categories.is_empty() {
            return Err(DiscoveryError::InvalidConfig(
                "at least one category must be configured".to_string(),
            ));
        }

        let mut registries = HashMap::with_capacity(categories.len());
        let mut order = Vec::with_capacity(categories.len());
        for descriptor in categories {
            let service_type = descriptor.service_type().to_string();
            if registries.contains_key(&service_type) {
                return Err(DiscoveryError::InvalidConfig(format!(
                    "duplicate category service type '{}'",
                    service_type
                )));
            }
            order.push(service_type.clone());
            registries.insert(
                service_type,
                Arc::new(Mutex::new(CategoryRegistry::new(descriptor))),
            );
        }

        info!(
            categories = order.len(),
            enabled = config.enabled,
            "Discovery coordinator created"
        );

        Ok(Self {
            config,
            registries,
            order,
            presentation,
            connector,
            transport: RwLock::new(None),
            running: AtomicBool::new(false),
            pump: Mutex::new(None),
        })
    }

    /// Creates a coordinator from the application configuration
    pub fn from_config(
        config: &AppConfig,
        presentation: Arc<dyn Presentation>,
        connector: TransportConnector,
    ) -> Result<Self> {
        Self::new(
            config.discovery.clone(),
            config.categories.clone(),
            presentation,
            connector,
        )
    }

    /// Creates the transport and subscribes to every category
    ///
    /// Fails with `TransportUnavailable` if the transport cannot be created.
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(DiscoveryError::AlreadyStarted);
        }

        if !self.config.enabled {
            info!("Discovery is disabled in configuration");
            return Ok(());
        }

        info!("Starting discovery coordinator");

        let transport = (self.connector)()?;
        *self.transport.write() = Some(Arc::clone(&transport));

        let (event_tx, event_rx) = async_channel::bounded(self.config.event_channel_capacity);

        for service_type in &self.order {
            if let Err(e) = transport.subscribe(service_type, event_tx.clone()) {
                error!(service_type = %service_type, error = %e, "Subscription failed");
                self.stop();
                return Err(e);
            }
            debug!(service_type = %service_type, "Subscribed");
        }

        let coordinator = Arc::downgrade(self);
        let pump = tokio::spawn(async move {
            while let Ok(event) = event_rx.recv().await {
                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                coordinator.handle_event(event);
            }
            debug!("Discovery event pump stopped");
        });
        *self.pump.lock() = Some(pump);

        self.running.store(true, Ordering::SeqCst);
        info!("Discovery coordinator started");
        Ok(())
    }

    /// Releases the transport and forgets every instance; safe to call at any point
    ///
    /// Attached panels are detached, so a later `start` begins from a clean
    /// slate.
    pub fn stop(&self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }

        if let Some(transport) = self.transport.write().take() {
            info!("Stopping discovery coordinator");
            if let Err(e) = transport.shutdown() {
                error!(error = %e, "Failed to shut down discovery transport");
            }
        }

        for service_type in &self.order {
            if let Some(registry) = self.registries.get(service_type) {
                let mut registry = registry.lock();
                let transition = registry.reset();
                self.apply(&mut registry, transition);
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }

    /// Returns whether the coordinator is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Routes one transport event, containing any error it raises
    pub fn handle_event(&self, event: TransportEvent) {
        let result = match &event {
            TransportEvent::Added { service_type, name } => self.handle_added(service_type, name),
            TransportEvent::Removed { service_type, name } => {
                self.handle_removed(service_type, name)
            }
            TransportEvent::Resolved {
                service_type,
                name,
                endpoint,
            } => self.handle_resolved(service_type, name, *endpoint),
        };

        match result {
            Ok(()) => {}
            Err(DiscoveryError::UnknownCategory(service_type)) => {
                warn!(
                    service_type = %service_type,
                    instance = event.name(),
                    "Ignoring event for unknown category"
                );
            }
            Err(e @ DiscoveryError::StaleRemoval { .. }) => {
                debug!(error = %e, "Ignoring stale removal");
            }
            Err(e) => {
                warn!(error = %e, ?event, "Failed to handle discovery event");
            }
        }
    }

    /// An instance exists; ask the transport to resolve it
    ///
    /// A failed resolution request is logged; the instance stays unresolved
    /// until the transport reports it.
    pub fn handle_added(&self, service_type: &str, name: &str) -> Result<()> {
        let registry = self.registry(service_type)?;
        let transport = self.transport()?;

        let mut registry = registry.lock();
        let service_type = registry.descriptor().service_type().to_string();

        if self.config.track_unresolved {
            let transition = registry.on_instance_added(name);
            self.apply(&mut registry, transition);
        }

        debug!(
            service_type = %service_type,
            instance = name,
            "Instance added, requesting resolution"
        );
        if let Err(e) = transport.request_resolution(&service_type, name) {
            warn!(
                service_type = %service_type,
                instance = name,
                error = %e,
                "Resolution request failed"
            );
        }

        Ok(())
    }

    /// An instance disappeared; fail over or detach if it was current
    pub fn handle_removed(&self, service_type: &str, name: &str) -> Result<()> {
        let registry = self.registry(service_type)?;
        let mut registry = registry.lock();

        if self.config.verify_removals {
            if let Some(transport) = self.transport.read().as_ref() {
                let still_live = transport
                    .list_instances(registry.descriptor().service_type())
                    .iter()
                    .any(|record| record.name == name);
                if still_live {
                    return Err(DiscoveryError::StaleRemoval {
                        service_type: registry.descriptor().service_type().to_string(),
                        name: name.to_string(),
                    });
                }
            }
        }

        let transition = registry.on_instance_removed(name)?;
        self.apply(&mut registry, transition);
        Ok(())
    }

    /// An instance resolved to an endpoint
    pub fn handle_resolved(&self, service_type: &str, name: &str, endpoint: SocketAddr) -> Result<()> {
        let registry = self.registry(service_type)?;
        let mut registry = registry.lock();

        let transition = registry.on_instance_resolved(name, endpoint);
        self.apply(&mut registry, transition);
        Ok(())
    }

    /// Makes `name` the current instance of a category
    ///
    /// Called when the panel picks one of its registered choices. Fails with
    /// `InstanceUnavailable` unless `name` is a resolved instance.
    pub fn select(&self, service_type: &str, name: &str) -> Result<()> {
        let registry = self.registry(service_type)?;
        let mut registry = registry.lock();

        let transition = registry.select(name)?;
        self.apply(&mut registry, transition);
        Ok(())
    }

    /// Forwards a registry transition to the presentation layer
    ///
    /// Runs with the registry locked so attach/detach ordering matches the
    /// order of mutations.
    fn apply(&self, registry: &mut CategoryRegistry, transition: Transition) {
        let display_name = registry.descriptor().display_name().to_string();
        let service_type = registry.descriptor().service_type().to_string();

        match transition {
            Transition::Unchanged => {}
            Transition::Attach { instance } => {
                info!(
                    service_type = %service_type,
                    display_name = %display_name,
                    instance = %instance,
                    endpoint = ?registry.control().endpoint(),
                    "Attaching panel"
                );
                self.presentation
                    .attach_panel(&display_name, registry.control().clone());
            }
            Transition::AddChoice { instance } => {
                info!(
                    service_type = %service_type,
                    instance = %instance,
                    "Registering additional choice"
                );
                self.presentation.register_choice(&display_name, &instance);
            }
            Transition::RemoveChoice { instance } => {
                info!(
                    service_type = %service_type,
                    instance = %instance,
                    "Withdrawing choice"
                );
                self.presentation.unregister_choice(&display_name, &instance);
            }
            Transition::Failover { from, to } => {
                info!(
                    service_type = %service_type,
                    from = %from,
                    to = %to,
                    endpoint = ?registry.control().endpoint(),
                    "Current instance gone, failing over"
                );
                self.presentation.unregister_choice(&display_name, &from);
            }
            Transition::Redirect { from, to } => {
                info!(
                    service_type = %service_type,
                    from = %from,
                    to = %to,
                    endpoint = ?registry.control().endpoint(),
                    "Redirecting control traffic"
                );
            }
            Transition::Detach { instance } => {
                info!(
                    service_type = %service_type,
                    display_name = %display_name,
                    instance = %instance,
                    "Detaching panel"
                );
                self.presentation.detach_panel(registry.control());
            }
        }

        if let Some(repair) = registry.enforce_invariants() {
            self.apply(registry, repair);
        }
    }

    fn registry(&self, service_type: &str) -> Result<&Arc<Mutex<CategoryRegistry>>> {
        let key = normalize_service_type(service_type);
        self.registries
            .get(&key)
            .ok_or(DiscoveryError::UnknownCategory(key))
    }

    fn transport(&self) -> Result<Arc<dyn DiscoveryTransport>> {
        self.transport
            .read()
            .as_ref()
            .cloned()
            .ok_or(DiscoveryError::NotStarted)
    }

    /// Configured categories, in configuration order
    pub fn categories(&self) -> Vec<CategoryDescriptor> {
        self.order
            .iter()
            .filter_map(|st| self.registries.get(st))
            .map(|registry| registry.lock().descriptor().clone())
            .collect()
    }

    /// Snapshot of one category
    pub fn snapshot(&self, service_type: &str) -> Option<CategorySnapshot> {
        self.registry(service_type)
            .ok()
            .map(|registry| registry.lock().snapshot())
    }

    /// Snapshots of all categories, in configuration order
    pub fn snapshots(&self) -> Vec<CategorySnapshot> {
        self.order
            .iter()
            .filter_map(|st| self.registries.get(st))
            .map(|registry| registry.lock().snapshot())
            .collect()
    }

    /// Control handle of a category
    pub fn control(&self, service_type: &str) -> Option<ControlHandle> {
        self.registry(service_type)
            .ok()
            .map(|registry| registry.lock().control().clone())
    }

    /// Endpoint control commands for a category should currently go to
    pub fn current_endpoint(&self, service_type: &str) -> Option<SocketAddr> {
        self.control(service_type).and_then(|control| control.endpoint())
    }
}

impl Drop for DiscoveryCoordinator {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            warn!("Discovery coordinator dropped while still running");
            self.stop();
        }
    }
}
