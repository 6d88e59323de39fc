//! Type-safe link-layer primitives.
//!
//! Newtype wrappers that eliminate byte-order mixups and raw numeric
//! comparisons for protocol discriminants.  IPv4 addresses use
//! [`std::net::Ipv4Addr`] directly; the link layer has no std equivalent, so
//! [`MacAddr`] fills that gap.

use std::fmt;

// =============================================================================
// MacAddr
// =============================================================================

/// Ethernet MAC address (6 bytes).
///
/// Distinct type prevents confusion with other 6-byte arrays.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// `ff:ff:ff:ff:ff:ff` — the broadcast address.
    pub const BROADCAST: Self = Self([0xff; 6]);
    /// `00:00:00:00:00:00` — the zero / unset address.
    pub const ZERO: Self = Self([0; 6]);

    /// `true` if the address is `ff:ff:ff:ff:ff:ff`.
    #[inline]
    pub const fn is_broadcast(&self) -> bool {
        self.0[0] == 0xff
            && self.0[1] == 0xff
            && self.0[2] == 0xff
            && self.0[3] == 0xff
            && self.0[4] == 0xff
            && self.0[5] == 0xff
    }

    /// `true` if the least-significant bit of the first octet is set (multicast).
    #[inline]
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// `true` if the address is all zeros.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0[0] == 0
            && self.0[1] == 0
            && self.0[2] == 0
            && self.0[3] == 0
            && self.0[4] == 0
            && self.0[5] == 0
    }

    /// Return the raw bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

// =============================================================================
// EtherType
// =============================================================================

/// Ethernet frame type field values.
///
/// Pattern matching on this enum replaces raw `0x0800` / `0x0806` comparisons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EtherType {
    /// IPv4 (`0x0800`).
    Ipv4 = 0x0800,
    /// ARP (`0x0806`).
    Arp = 0x0806,
    /// IPv6 (`0x86DD`).
    Ipv6 = 0x86DD,
}

impl EtherType {
    /// Parse from a raw big-endian `u16` value.  Returns `None` for unknown types.
    #[inline]
    pub const fn from_u16(val: u16) -> Option<Self> {
        match val {
            0x0800 => Some(Self::Ipv4),
            0x0806 => Some(Self::Arp),
            0x86DD => Some(Self::Ipv6),
            _ => None,
        }
    }

    /// Return the raw `u16` value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => write!(f, "IPv4"),
            Self::Arp => write!(f, "ARP"),
            Self::Ipv6 => write!(f, "IPv6"),
        }
    }
}

// =============================================================================
// IpProtocol
// =============================================================================

/// IP protocol number field values.
///
/// Pattern matching on this enum replaces raw `6` / `17` comparisons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IpProtocol {
    /// ICMP (`1`).
    Icmp = 1,
    /// TCP (`6`).
    Tcp = 6,
    /// UDP (`17`).
    Udp = 17,
}

impl IpProtocol {
    /// Parse from a raw `u8` value.  Returns `None` for unknown protocols.
    #[inline]
    pub const fn from_u8(val: u8) -> Option<Self> {
        match val {
            1 => Some(Self::Icmp),
            6 => Some(Self::Tcp),
            17 => Some(Self::Udp),
            _ => None,
        }
    }

    /// Return the raw `u8` value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Icmp => write!(f, "ICMP"),
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
        }
    }
}
