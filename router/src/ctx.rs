//! Router context: interfaces, routing table, and the ARP lock.
//!
//! A [`Router`] is assembled once, during the controller's configuration
//! phase, via [`RouterBuilder`].  After [`RouterBuilder::build`] the interface
//! list and routing table are immutable; only the [`ArpState`] behind the ARP
//! lock changes at runtime.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard};

use log::info;
use rudder_wire::types::MacAddr;
use thiserror::Error;

use crate::arp::ArpState;
use crate::route::{RouteEntry, RouteTable};

// =============================================================================
// Interface
// =============================================================================

/// Stable handle to one of a router's interfaces.
///
/// Indexes into [`Router::interfaces`]; cannot be confused with a controller
/// router ID or any other `usize`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IfaceId(pub usize);

impl fmt::Debug for IfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IfaceId({})", self.0)
    }
}

impl fmt::Display for IfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single Ethernet interface.  Immutable after configuration.
#[derive(Clone, Debug)]
pub struct Interface {
    /// Controller-assigned interface ID (dense, zero-based per router).
    pub id: u8,
    /// Interface name (eth0, eth1, ...).
    pub name: String,
    /// MAC address.
    pub mac: MacAddr,
    /// IPv4 address.
    pub ip: Ipv4Addr,
}

// =============================================================================
// Router
// =============================================================================

/// All state belonging to one router.
///
/// The interface list and routing table are frozen at configuration time; the
/// ARP cache and pending-request list are shared between the forwarding
/// engine and the timer task and must only be touched through [`arp_lock`].
///
/// [`arp_lock`]: Router::arp_lock
pub struct Router {
    /// Controller-assigned router ID (dense, zero-based).
    pub id: u8,
    /// Router name.
    pub name: String,
    interfaces: Vec<Interface>,
    pub routes: RouteTable,
    arp: Mutex<ArpState>,
}

impl Router {
    /// Look up an interface by handle.
    pub fn iface(&self, id: IfaceId) -> Option<&Interface> {
        self.interfaces.get(id.0)
    }

    /// Look up an interface handle by name.
    pub fn iface_by_name(&self, name: &str) -> Option<IfaceId> {
        self.interfaces.iter().position(|i| i.name == name).map(IfaceId)
    }

    /// All interfaces, in controller order.
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// `true` if `ip` is assigned to any of this router's interfaces.
    ///
    /// Datagrams whose destination satisfies this are delivered locally, no
    /// matter which interface they arrived on.
    pub fn owns_ip(&self, ip: Ipv4Addr) -> bool {
        self.interfaces.iter().any(|i| i.ip == ip)
    }

    /// Acquire the ARP lock.
    ///
    /// Covers both the cache and the pending-request list.  A poisoned lock
    /// is recovered rather than propagated: the protected state is plain data
    /// and remains usable.
    pub fn arp_lock(&self) -> MutexGuard<'_, ArpState> {
        self.arp.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Log the configured interfaces and routing table.
    pub fn log_config(&self) {
        info!("router {}: {} interface(s)", self.name, self.interfaces.len());
        for iface in &self.interfaces {
            info!("  {} {} {}", iface.name, iface.mac, iface.ip);
        }
        if self.routes.is_empty() {
            info!("router {}: routing table is empty", self.name);
            return;
        }
        info!(
            "  {:<16}{:<16}{:<16}{:<16}",
            "Destination", "Gateway", "Mask", "Iface"
        );
        for entry in self.routes.iter() {
            let iface_name = self
                .iface(entry.iface)
                .map(|i| i.name.as_str())
                .unwrap_or("?");
            info!(
                "  {:<16}{:<16}{:<16}{:<16}",
                entry.dest.to_string(),
                entry.gateway.to_string(),
                entry.mask.to_string(),
                iface_name
            );
        }
    }
}

// =============================================================================
// RouterBuilder
// =============================================================================

/// Configuration-phase error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("routing table entry references unknown interface {0}")]
    UnknownInterface(String),
    #[error("router has no interfaces")]
    NoInterfaces,
}

/// Accumulates configuration messages and freezes them into a [`Router`].
pub struct RouterBuilder {
    pub id: u8,
    pub name: String,
    interfaces: Vec<Interface>,
    routes: Vec<RouteEntry>,
}

impl RouterBuilder {
    pub fn new(id: u8, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            interfaces: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Register the next interface.  Interfaces arrive in ID order, so the
    /// vector index doubles as the [`IfaceId`].
    pub fn add_interface(&mut self, id: u8, name: impl Into<String>, mac: MacAddr, ip: Ipv4Addr) {
        self.interfaces.push(Interface {
            id,
            name: name.into(),
            mac,
            ip,
        });
    }

    /// Append a routing table entry whose egress interface is already known
    /// by handle.
    pub fn add_route(
        &mut self,
        dest: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
        metric: u16,
        iface: IfaceId,
    ) -> Result<(), ConfigError> {
        if self.interfaces.get(iface.0).is_none() {
            return Err(ConfigError::UnknownInterface(iface.to_string()));
        }
        self.routes.push(RouteEntry {
            dest,
            mask,
            gateway,
            metric,
            iface,
        });
        Ok(())
    }

    /// Append a routing table entry naming its egress interface.  Used by the
    /// routing-table-file configuration mode, after all interfaces are known.
    pub fn add_route_by_name(
        &mut self,
        dest: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
        metric: u16,
        iface_name: &str,
    ) -> Result<(), ConfigError> {
        let iface = self
            .interfaces
            .iter()
            .position(|i| i.name == iface_name)
            .map(IfaceId)
            .ok_or_else(|| ConfigError::UnknownInterface(iface_name.to_string()))?;
        self.add_route(dest, mask, gateway, metric, iface)
    }

    /// Discard any controller-supplied routes (the routing-table-file mode
    /// replaces them wholesale).
    pub fn clear_routes(&mut self) {
        self.routes.clear();
    }

    /// Number of interfaces registered so far.
    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    /// Freeze into an immutable [`Router`] with an empty ARP state.
    pub fn build(self) -> Result<Router, ConfigError> {
        if self.interfaces.is_empty() {
            return Err(ConfigError::NoInterfaces);
        }
        Ok(Router {
            id: self.id,
            name: self.name,
            interfaces: self.interfaces,
            routes: RouteTable::new(self.routes),
            arp: Mutex::new(ArpState::new()),
        })
    }
}
