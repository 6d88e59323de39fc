//! Static IPv4 routing table with longest-prefix-match lookup.
//!
//! The table is an ordered sequence of [`RouteEntry`] values, scanned in full
//! for every lookup.  Among matching entries the winner has the longest mask;
//! ties go to the lowest metric, then to table order.  The table is built at
//! configuration time and never changes, so lookups take no lock.

use std::fmt;
use std::net::Ipv4Addr;

use crate::ctx::IfaceId;

// =============================================================================
// RouteEntry
// =============================================================================

/// A single entry in the routing table.
#[derive(Clone, Copy)]
pub struct RouteEntry {
    /// Destination subnet.
    pub dest: Ipv4Addr,
    /// Destination subnet mask.
    pub mask: Ipv4Addr,
    /// Gateway to the destination.  `0.0.0.0` means directly connected —
    /// the destination itself is the next hop.
    pub gateway: Ipv4Addr,
    /// Route metric (lower = preferred) for same-length matches.
    pub metric: u16,
    /// Interface connected to this subnet.
    pub iface: IfaceId,
}

impl RouteEntry {
    /// Returns `true` if `dst` falls within this entry's subnet.
    #[inline]
    pub fn matches(&self, dst: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask);
        (u32::from(dst) & mask) == (u32::from(self.dest) & mask)
    }

    /// Returns the next-hop address for a destination matching this entry:
    /// the gateway when one is set, otherwise the destination itself.
    #[inline]
    pub fn next_hop(&self, dst: Ipv4Addr) -> Ipv4Addr {
        if self.gateway.is_unspecified() {
            dst
        } else {
            self.gateway
        }
    }

    /// Number of set bits in the mask; the specificity used for
    /// longest-prefix comparison.
    #[inline]
    pub fn prefix_len(&self) -> u32 {
        u32::from(self.mask).count_ones()
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.gateway.is_unspecified() {
            write!(
                f,
                "{}/{} dev {} metric {} (connected)",
                self.dest,
                self.prefix_len(),
                self.iface,
                self.metric
            )
        } else {
            write!(
                f,
                "{}/{} via {} dev {} metric {}",
                self.dest,
                self.prefix_len(),
                self.gateway,
                self.iface,
                self.metric
            )
        }
    }
}

// =============================================================================
// RouteTable
// =============================================================================

/// Ordered, immutable routing table.
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new(entries: Vec<RouteEntry>) -> Self {
        Self { entries }
    }

    /// Longest-prefix-match lookup.
    ///
    /// Scans every entry; the best match is the one with the most mask bits,
    /// with the metric and then table order breaking ties.  Returns `None`
    /// when nothing matches, which the engine answers with ICMP Destination
    /// Net Unreachable.
    pub fn lookup(&self, dst: Ipv4Addr) -> Option<&RouteEntry> {
        let mut best: Option<&RouteEntry> = None;
        for entry in &self.entries {
            if !entry.matches(dst) {
                continue;
            }
            let better = match best {
                None => true,
                Some(current) => {
                    entry.prefix_len() > current.prefix_len()
                        || (entry.prefix_len() == current.prefix_len()
                            && entry.metric < current.metric)
                }
            };
            if better {
                best = Some(entry);
            }
        }
        best
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter()
    }
}
