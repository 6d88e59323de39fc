//! ARP cache, pending-request list, and ARP frame construction.
//!
//! The cache is a fixed table of [`ARP_CACHE_SIZE`] slots mapping an IPv4
//! address to a MAC with a creation timestamp.  The pending list holds one
//! entry per unresolved next-hop IP, each carrying the datagrams withheld
//! until resolution.  Both live inside [`ArpState`], behind the single ARP
//! lock in the router context — every method here expects the caller to hold
//! that lock.
//!
//! Lifecycle: the forwarding engine creates a pending request when it needs a
//! MAC it does not have, and destroys it when the matching ARP reply arrives
//! (flushing the withheld frames).  The timer task destroys it instead after
//! [`ARP_MAX_SENDS`] unanswered transmissions, answering each withheld frame
//! with ICMP Host Unreachable.

use std::net::Ipv4Addr;
use std::time::Instant;

use rudder_wire::arp::ArpPacket;
use rudder_wire::ethernet::EthernetHeader;
use rudder_wire::types::MacAddr;
use rudder_wire::{
    ARP_HLEN_ETHERNET, ARP_HTYPE_ETHERNET, ARP_OPER_REPLY, ARP_OPER_REQUEST, ARP_PLEN_IPV4,
    ARP_PTYPE_IPV4, ETHERTYPE_ARP,
};
use thiserror::Error;

use crate::ctx::{IfaceId, Interface};
use crate::{ARP_CACHE_SIZE, ARP_CACHE_TTL};

// =============================================================================
// Cache
// =============================================================================

/// The cache has no free slot left.  The caller drops the insert; the timer
/// will reap stale entries eventually.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("ARP cache full")]
pub struct CacheFull;

/// One occupied cache slot.
#[derive(Clone, Copy, Debug)]
struct CacheEntry {
    ip: Ipv4Addr,
    mac: MacAddr,
    added: Instant,
}

/// Fixed-capacity IP → MAC table.
///
/// At most one entry exists per IPv4 address.  An entry is valid for
/// [`ARP_CACHE_TTL`] after creation; the timer task reaps entries whose age
/// strictly exceeds that, so an entry aged exactly 15 s still answers.
pub struct ArpCache {
    slots: Vec<Option<CacheEntry>>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self {
            slots: vec![None; ARP_CACHE_SIZE],
        }
    }

    /// Look up `ip`.  Returns the MAC only while the entry is within its
    /// lifetime; lookups never mutate — clearing stale slots is the timer
    /// task's job.
    pub fn lookup(&self, ip: Ipv4Addr, now: Instant) -> Option<MacAddr> {
        self.slots.iter().flatten().find_map(|entry| {
            (entry.ip == ip && now.duration_since(entry.added) <= ARP_CACHE_TTL)
                .then_some(entry.mac)
        })
    }

    /// Insert or refresh the binding for `ip`.
    ///
    /// An existing entry for the same address is overwritten in place (MAC
    /// and creation time), so the cache never holds two entries for one IP.
    /// Otherwise the first free slot is used; with no free slot the insert
    /// fails.
    pub fn insert(&mut self, ip: Ipv4Addr, mac: MacAddr, now: Instant) -> Result<(), CacheFull> {
        if let Some(entry) = self.slots.iter_mut().flatten().find(|e| e.ip == ip) {
            entry.mac = mac;
            entry.added = now;
            return Ok(());
        }
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(CacheEntry { ip, mac, added: now });
                Ok(())
            }
            None => Err(CacheFull),
        }
    }

    /// Clear every entry whose age strictly exceeds [`ARP_CACHE_TTL`].
    /// Returns how many were cleared.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut cleared = 0;
        for slot in &mut self.slots {
            let stale = matches!(slot, Some(e) if now.duration_since(e.added) > ARP_CACHE_TTL);
            if stale {
                *slot = None;
                cleared += 1;
            }
        }
        cleared
    }

    /// Number of occupied slots (diagnostic).
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Pending requests
// =============================================================================

/// A datagram held back until its next hop resolves.  An owned deep copy of
/// the inbound frame, tagged with the interface it arrived on.
#[derive(Clone, Debug)]
pub struct WithheldFrame {
    pub iface: IfaceId,
    pub bytes: Vec<u8>,
}

/// An outstanding ARP resolution: the target IP, the interface the requests
/// go out on, the transmission budget, and the withheld datagrams in arrival
/// order.
#[derive(Debug)]
pub struct PendingRequest {
    pub ip: Ipv4Addr,
    pub out_iface: IfaceId,
    pub times_sent: u32,
    pub last_sent: Instant,
    pub withheld: Vec<WithheldFrame>,
}

impl PendingRequest {
    /// Deep-copy `frame` onto the withheld list.
    pub fn attach(&mut self, iface: IfaceId, frame: &[u8]) {
        self.withheld.push(WithheldFrame {
            iface,
            bytes: frame.to_vec(),
        });
    }
}

// =============================================================================
// ArpState — everything behind the ARP lock
// =============================================================================

/// The cache plus the pending-request list.  One mutex in the router context
/// protects the whole struct; both the forwarding engine and the timer task
/// go through it.
pub struct ArpState {
    pub cache: ArpCache,
    pub pending: Vec<PendingRequest>,
}

impl ArpState {
    pub fn new() -> Self {
        Self {
            cache: ArpCache::new(),
            pending: Vec::new(),
        }
    }

    /// Pending request targeting `ip`, if any.  At most one exists.
    pub fn find_pending_mut(&mut self, ip: Ipv4Addr) -> Option<&mut PendingRequest> {
        self.pending.iter_mut().find(|req| req.ip == ip)
    }

    /// Append a new pending request with an empty withheld list.
    ///
    /// `times_sent` starts at zero; the caller bumps it after transmitting
    /// the initial request.  The caller must have checked that no request for
    /// `ip` exists.
    pub fn add_pending(
        &mut self,
        ip: Ipv4Addr,
        out_iface: IfaceId,
        now: Instant,
    ) -> &mut PendingRequest {
        let idx = self.pending.len();
        self.pending.push(PendingRequest {
            ip,
            out_iface,
            times_sent: 0,
            last_sent: now,
            withheld: Vec::new(),
        });
        &mut self.pending[idx]
    }

    /// Remove and return the pending request for `ip`, if any.  Used by the
    /// engine when the matching reply arrives.
    pub fn take_pending(&mut self, ip: Ipv4Addr) -> Option<PendingRequest> {
        let pos = self.pending.iter().position(|req| req.ip == ip)?;
        Some(self.pending.remove(pos))
    }
}

impl Default for ArpState {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Frame construction
// =============================================================================

/// Build a broadcast ARP request for `target_ip`, sent as `iface`.
pub fn request_frame(iface: &Interface, target_ip: Ipv4Addr) -> Vec<u8> {
    build_frame(
        iface,
        MacAddr::BROADCAST,
        ARP_OPER_REQUEST,
        MacAddr::ZERO,
        target_ip,
    )
}

/// Build a unicast ARP reply answering `target_mac`/`target_ip`, with
/// `iface` as the sender.
pub fn reply_frame(iface: &Interface, target_mac: MacAddr, target_ip: Ipv4Addr) -> Vec<u8> {
    build_frame(iface, target_mac, ARP_OPER_REPLY, target_mac, target_ip)
}

fn build_frame(
    iface: &Interface,
    eth_dst: MacAddr,
    oper: u16,
    tha: MacAddr,
    tpa: Ipv4Addr,
) -> Vec<u8> {
    let eth = EthernetHeader {
        dst: eth_dst,
        src: iface.mac,
        ethertype: ETHERTYPE_ARP,
    };
    let arp = ArpPacket {
        htype: ARP_HTYPE_ETHERNET,
        ptype: ARP_PTYPE_IPV4,
        hlen: ARP_HLEN_ETHERNET,
        plen: ARP_PLEN_IPV4,
        oper,
        sha: iface.mac,
        spa: iface.ip,
        tha,
        tpa,
    };
    let mut frame = Vec::with_capacity(rudder_wire::ETH_HEADER_LEN + rudder_wire::ARP_PACKET_LEN);
    frame.extend_from_slice(&eth.to_bytes());
    frame.extend_from_slice(&arp.to_bytes());
    frame
}
