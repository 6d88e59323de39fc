//! ARP packet codec (RFC 826, Ethernet/IPv4 only).

use std::net::Ipv4Addr;

use crate::types::MacAddr;
use crate::{ARP_PACKET_LEN, ParseError};

/// A complete ARP packet as carried in an Ethernet payload.
///
/// The `htype`/`ptype`/`hlen`/`plen` fields are carried verbatim so the
/// caller can reject anything that is not Ethernet/IPv4.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArpPacket {
    /// Hardware address space (1 = Ethernet).
    pub htype: u16,
    /// Protocol address space (0x0800 = IPv4).
    pub ptype: u16,
    /// Hardware address length (6 for Ethernet).
    pub hlen: u8,
    /// Protocol address length (4 for IPv4).
    pub plen: u8,
    /// Opcode: 1 = request, 2 = reply.
    pub oper: u16,
    /// Sender hardware address.
    pub sha: MacAddr,
    /// Sender protocol address.
    pub spa: Ipv4Addr,
    /// Target hardware address (zero in requests).
    pub tha: MacAddr,
    /// Target protocol address.
    pub tpa: Ipv4Addr,
}

impl ArpPacket {
    /// Parse the first [`ARP_PACKET_LEN`] bytes of `data`.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < ARP_PACKET_LEN {
            return Err(ParseError::Truncated {
                needed: ARP_PACKET_LEN,
                have: data.len(),
            });
        }
        Ok(Self {
            htype: u16::from_be_bytes([data[0], data[1]]),
            ptype: u16::from_be_bytes([data[2], data[3]]),
            hlen: data[4],
            plen: data[5],
            oper: u16::from_be_bytes([data[6], data[7]]),
            sha: MacAddr([data[8], data[9], data[10], data[11], data[12], data[13]]),
            spa: Ipv4Addr::new(data[14], data[15], data[16], data[17]),
            tha: MacAddr([data[18], data[19], data[20], data[21], data[22], data[23]]),
            tpa: Ipv4Addr::new(data[24], data[25], data[26], data[27]),
        })
    }

    /// `true` if the fixed fields describe an Ethernet/IPv4 ARP packet.
    pub fn is_ethernet_ipv4(&self) -> bool {
        self.htype == crate::ARP_HTYPE_ETHERNET
            && self.ptype == crate::ARP_PTYPE_IPV4
            && self.hlen == crate::ARP_HLEN_ETHERNET
            && self.plen == crate::ARP_PLEN_IPV4
    }

    /// Serialize into a packed 28-byte packet.
    pub fn to_bytes(&self) -> [u8; ARP_PACKET_LEN] {
        let mut buf = [0u8; ARP_PACKET_LEN];
        buf[0..2].copy_from_slice(&self.htype.to_be_bytes());
        buf[2..4].copy_from_slice(&self.ptype.to_be_bytes());
        buf[4] = self.hlen;
        buf[5] = self.plen;
        buf[6..8].copy_from_slice(&self.oper.to_be_bytes());
        buf[8..14].copy_from_slice(&self.sha.0);
        buf[14..18].copy_from_slice(&self.spa.octets());
        buf[18..24].copy_from_slice(&self.tha.0);
        buf[24..28].copy_from_slice(&self.tpa.octets());
        buf
    }
}
