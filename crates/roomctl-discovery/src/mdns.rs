//! mDNS transport backed by `mdns-sd`

use crate::error::{DiscoveryError, Result};
use crate::transport::{DiscoveryTransport, InstanceRecord, TransportConnector, TransportEvent};
use async_channel::Sender;
use dashmap::DashMap;
use mdns_sd::{ServiceDaemon, ServiceEvent as MdnsEvent, ServiceInfo};
use roomctl_core::types::primary_address;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Live instances of one service type, keyed by instance name
type LiveTable = DashMap<String, InstanceRecord>;

/// Discovery transport browsing the local segment with multicast DNS
pub struct MdnsTransport {
    /// mDNS service daemon
    mdns: Arc<ServiceDaemon>,

    /// Instances currently advertised, per service type
    live: Arc<DashMap<String, LiveTable>>,

    /// Listener per subscribed service type
    listeners: DashMap<String, Sender<TransportEvent>>,

    /// Browser task per subscribed service type
    tasks: DashMap<String, JoinHandle<()>>,
}

impl MdnsTransport {
    /// Creates the mDNS daemon
    ///
    /// Fails with `TransportUnavailable` if no socket can be bound.
    pub fn new() -> Result<Self> {
        let mdns = ServiceDaemon::new().map_err(|e| {
            DiscoveryError::TransportUnavailable(format!("Failed to create mDNS daemon: {}", e))
        })?;

        info!("mDNS transport created");

        Ok(Self {
            mdns: Arc::new(mdns),
            live: Arc::new(DashMap::new()),
            listeners: DashMap::new(),
            tasks: DashMap::new(),
        })
    }

    /// Connector creating a fresh mDNS transport on every start
    pub fn connector() -> TransportConnector {
        Box::new(|| -> Result<Arc<dyn DiscoveryTransport>> { Ok(Arc::new(MdnsTransport::new()?)) })
    }

    /// Converts one mDNS event, keeping the live table in step
    fn translate(
        event: MdnsEvent,
        service_type: &str,
        live: &DashMap<String, LiveTable>,
    ) -> Option<TransportEvent> {
        match event {
            MdnsEvent::ServiceFound(ty_domain, fullname) => {
                let name = instance_name(&fullname, &ty_domain);
                debug!(service_type, instance = %name, "Service found");

                live.entry(service_type.to_string())
                    .or_default()
                    .entry(name.clone())
                    .or_insert_with(|| InstanceRecord {
                        name: name.clone(),
                        endpoint: None,
                    });

                Some(TransportEvent::Added {
                    service_type: service_type.to_string(),
                    name,
                })
            }

            MdnsEvent::ServiceResolved(info) => {
                let name = instance_name(info.get_fullname(), info.get_type());
                let Some(endpoint) = resolved_endpoint(&info) else {
                    debug!(service_type, instance = %name, "Resolved without an address, waiting");
                    return None;
                };

                debug!(
                    service_type,
                    instance = %name,
                    hostname = info.get_hostname(),
                    %endpoint,
                    "Service resolved"
                );

                live.entry(service_type.to_string()).or_default().insert(
                    name.clone(),
                    InstanceRecord {
                        name: name.clone(),
                        endpoint: Some(endpoint),
                    },
                );

                Some(TransportEvent::Resolved {
                    service_type: service_type.to_string(),
                    name,
                    endpoint,
                })
            }

            MdnsEvent::ServiceRemoved(ty_domain, fullname) => {
                let name = instance_name(&fullname, &ty_domain);
                debug!(service_type, instance = %name, "Service removed");

                if let Some(table) = live.get(service_type) {
                    table.remove(&name);
                }

                Some(TransportEvent::Removed {
                    service_type: service_type.to_string(),
                    name,
                })
            }

            MdnsEvent::SearchStarted(ty) => {
                debug!(ty, "Search started");
                None
            }

            MdnsEvent::SearchStopped(ty) => {
                debug!(ty, "Search stopped");
                None
            }

            _ => None,
        }
    }
}

impl DiscoveryTransport for MdnsTransport {
    fn subscribe(&self, service_type: &str, listener: Sender<TransportEvent>) -> Result<()> {
        info!(service_type, "Starting browser");

        let receiver = self
            .mdns
            .browse(service_type)
            .map_err(|e| DiscoveryError::SubscribeFailed {
                service_type: service_type.to_string(),
                reason: e.to_string(),
            })?;

        self.listeners
            .insert(service_type.to_string(), listener.clone());

        let live = self.live.clone();
        let svc_type = service_type.to_string();

        let task = tokio::spawn(async move {
            loop {
                match receiver.recv_async().await {
                    Ok(event) => {
                        let Some(event) = Self::translate(event, &svc_type, &live) else {
                            continue;
                        };
                        if listener.send(event).await.is_err() {
                            debug!(service_type = %svc_type, "Listener closed");
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "mDNS browse channel closed");
                        break;
                    }
                }
            }
            debug!("Browser task for {} stopped", svc_type);
        });

        if let Some(previous) = self.tasks.insert(service_type.to_string(), task) {
            previous.abort();
        }

        Ok(())
    }

    fn request_resolution(&self, service_type: &str, name: &str) -> Result<()> {
        // The daemon resolves every browsed instance itself and reports it on
        // the browse stream. Nothing is sent from here, so events for one name
        // keep the order the browser produced them in.
        if !self.listeners.contains_key(service_type) {
            return Err(DiscoveryError::ResolutionFailed {
                name: name.to_string(),
                reason: format!("not subscribed to {}", service_type),
            });
        }

        debug!(service_type, instance = name, "Resolution pending");
        Ok(())
    }

    fn list_instances(&self, service_type: &str) -> Vec<InstanceRecord> {
        self.live
            .get(service_type)
            .map(|table| table.iter().map(|entry| entry.value().clone()).collect())
            .unwrap_or_default()
    }

    fn shutdown(&self) -> Result<()> {
        for entry in self.listeners.iter() {
            if let Err(e) = self.mdns.stop_browse(entry.key()) {
                warn!(service_type = %entry.key(), error = %e, "Failed to stop browse");
            }
        }
        self.listeners.clear();

        let tasks = self
            .tasks
            .iter()
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();
        for task_name in tasks {
            if let Some((_, handle)) = self.tasks.remove(&task_name) {
                handle.abort();
            }
        }

        self.mdns.shutdown().map_err(|e| {
            error!(error = %e, "mDNS daemon shutdown failed");
            DiscoveryError::Internal(format!("Failed to shutdown mDNS daemon: {}", e))
        })?;

        info!("mDNS transport stopped");
        Ok(())
    }
}

/// Strips the service type from a full instance name
///
/// `bed-1._bedroom._tcp.local.` under `_bedroom._tcp.local.` becomes `bed-1`.
pub fn instance_name(fullname: &str, service_type: &str) -> String {
    fullname
        .strip_suffix(service_type)
        .map(|name| name.trim_end_matches('.'))
        .unwrap_or(fullname)
        .to_string()
}

/// Endpoint of a resolved record, preferring IPv4
fn resolved_endpoint(info: &ServiceInfo) -> Option<SocketAddr> {
    primary_address(info.get_addresses().iter())
        .map(|address| SocketAddr::new(address, info.get_port()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_instance_name() {
        assert_eq!(
            instance_name("bed-1._bedroom._tcp.local.", "_bedroom._tcp.local."),
            "bed-1"
        );
        assert_eq!(
            instance_name("Living Room Lamp._livingroom._tcp.local.", "_livingroom._tcp.local."),
            "Living Room Lamp"
        );
        // Foreign suffix is left alone
        assert_eq!(
            instance_name("oven._kitchen._tcp.local.", "_bedroom._tcp.local."),
            "oven._kitchen._tcp.local."
        );
    }

    #[test]
    fn test_translate_tracks_live_table() {
        let live = DashMap::new();
        let ty = "_bedroom._tcp.local.";

        let added = MdnsTransport::translate(
            MdnsEvent::ServiceFound(ty.to_string(), format!("bed-1.{}", ty)),
            ty,
            &live,
        );
        assert_eq!(
            added,
            Some(TransportEvent::Added {
                service_type: ty.to_string(),
                name: "bed-1".to_string(),
            })
        );
        assert_eq!(live.get(ty).unwrap().len(), 1);

        let removed = MdnsTransport::translate(
            MdnsEvent::ServiceRemoved(ty.to_string(), format!("bed-1.{}", ty)),
            ty,
            &live,
        );
        assert!(matches!(removed, Some(TransportEvent::Removed { .. })));
        assert!(live.get(ty).unwrap().is_empty());

        let ignored = MdnsTransport::translate(MdnsEvent::SearchStarted(ty.to_string()), ty, &live);
        assert_eq!(ignored, None);
    }

    #[test]
    fn test_translate_resolved() {
        let live = DashMap::new();
        let ty = "_bedroom._tcp.local.";
        let info = ServiceInfo::new(
            ty,
            "bed-1",
            "bed-1.local.",
            "10.0.0.5",
            9000,
            HashMap::<String, String>::new(),
        )
        .unwrap();

        let resolved = MdnsTransport::translate(MdnsEvent::ServiceResolved(info), ty, &live);
        assert_eq!(
            resolved,
            Some(TransportEvent::Resolved {
                service_type: ty.to_string(),
                name: "bed-1".to_string(),
                endpoint: "10.0.0.5:9000".parse().unwrap(),
            })
        );
        assert_eq!(
            live.get(ty).unwrap().get("bed-1").unwrap().endpoint,
            Some("10.0.0.5:9000".parse().unwrap())
        );
    }
}
