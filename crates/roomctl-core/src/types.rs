//! Types for discovered device instances

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// A single advertised service instance belonging to a category
///
/// Created as a placeholder when the transport reports the name, and filled in
/// with an endpoint once resolution completes. Only resolved instances can be
/// used as a control target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInstance {
    /// Advertisement name, unique within its category
    pub name: String,

    /// Resolved address, absent until resolution completes
    pub address: Option<IpAddr>,

    /// Resolved port, absent until resolution completes
    pub port: Option<u16>,

    /// First seen timestamp
    pub discovered_at: DateTime<Utc>,

    /// Last seen timestamp (updated on every add or resolve)
    pub last_seen_at: DateTime<Utc>,

    /// Number of add/resolve events observed for this name
    pub seen_count: u64,

    /// Registry-assigned ordering; higher means seen more recently
    pub seen_seq: u64,
}

impl DeviceInstance {
    /// Creates an unresolved placeholder
    pub fn placeholder(name: impl Into<String>, seen_seq: u64) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            address: None,
            port: None,
            discovered_at: now,
            last_seen_at: now,
            seen_count: 1,
            seen_seq,
        }
    }

    /// Creates an instance that is already resolved
    pub fn resolved(name: impl Into<String>, endpoint: SocketAddr, seen_seq: u64) -> Self {
        let mut instance = Self::placeholder(name, seen_seq);
        instance.address = Some(endpoint.ip());
        instance.port = Some(endpoint.port());
        instance
    }

    /// Records another sighting without touching the endpoint
    pub fn mark_seen(&mut self, seen_seq: u64) {
        self.last_seen_at = Utc::now();
        self.seen_count += 1;
        self.seen_seq = seen_seq;
    }

    /// Stores the resolved endpoint, returning true if it changed
    pub fn resolve(&mut self, endpoint: SocketAddr, seen_seq: u64) -> bool {
        let changed = self.endpoint() != Some(endpoint);
        self.address = Some(endpoint.ip());
        self.port = Some(endpoint.port());
        self.mark_seen(seen_seq);
        changed
    }

    /// Whether both address and port are known
    pub fn is_resolved(&self) -> bool {
        self.address.is_some() && self.port.is_some()
    }

    /// Returns the resolved endpoint
    pub fn endpoint(&self) -> Option<SocketAddr> {
        match (self.address, self.port) {
            (Some(address), Some(port)) => Some(SocketAddr::new(address, port)),
            _ => None,
        }
    }

    /// Returns the connection string (host:port), if resolved
    pub fn connection_string(&self) -> Option<String> {
        self.endpoint().map(|endpoint| endpoint.to_string())
    }
}

/// Picks the address to use from a resolved record's address set
///
/// IPv4 is preferred; otherwise the first address wins.
pub fn primary_address<'a, I>(addresses: I) -> Option<IpAddr>
where
    I: IntoIterator<Item = &'a IpAddr>,
{
    let mut first = None;
    for address in addresses {
        if address.is_ipv4() {
            return Some(*address);
        }
        first.get_or_insert(*address);
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn endpoint(last: u8, port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), port)
    }

    #[test]
    fn test_placeholder_is_unresolved() {
        let instance = DeviceInstance::placeholder("bed-1", 1);
        assert_eq!(instance.name, "bed-1");
        assert!(!instance.is_resolved());
        assert_eq!(instance.endpoint(), None);
        assert_eq!(instance.connection_string(), None);
    }

    #[test]
    fn test_resolve_in_place() {
        let mut instance = DeviceInstance::placeholder("bed-1", 1);
        assert!(instance.resolve(endpoint(5, 9000), 2));
        assert!(instance.is_resolved());
        assert_eq!(instance.connection_string().as_deref(), Some("10.0.0.5:9000"));
        assert_eq!(instance.seen_count, 2);
        assert_eq!(instance.seen_seq, 2);

        // Same endpoint again is not a change
        assert!(!instance.resolve(endpoint(5, 9000), 3));
        assert!(instance.resolve(endpoint(6, 9000), 4));
    }

    #[test]
    fn test_primary_address_prefers_ipv4() {
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);
        let v4 = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));

        assert_eq!(primary_address(&[v6, v4]), Some(v4));
        assert_eq!(primary_address(&[v6]), Some(v6));
        assert_eq!(primary_address(&[]), None);
    }
}
