//! ICMP reply and error synthesis.
//!
//! Builders return complete Ethernet frames, ready for the sink.  Every
//! message goes back the way the offending datagram came: out the ingress
//! interface, addressed to the Ethernet source of the original frame.
//!
//! Source-address selection: error messages use the ingress interface's IP;
//! an echo reply uses the address the request was sent to.  Replies always
//! leave with a fresh TTL of 64.

use std::net::Ipv4Addr;

use rudder_wire::ethernet::EthernetHeader;
use rudder_wire::ipv4::Ipv4Header;
use rudder_wire::types::MacAddr;
use rudder_wire::{ETHERTYPE_IPV4, IPPROTO_ICMP, IPV4_HEADER_LEN, icmp};

use crate::ctx::Interface;

/// TTL stamped on every synthesized datagram.
pub const REPLY_TTL: u8 = 64;

/// The error messages the forwarding engine can synthesize.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IcmpError {
    /// Type 3 code 0 — no routing table entry matched.
    NetUnreachable,
    /// Type 3 code 1 — ARP resolution gave up after its retry budget.
    HostUnreachable,
    /// Type 3 code 3 — TCP or UDP addressed to the router itself.
    PortUnreachable,
    /// Type 11 code 0 — TTL would reach zero.
    TimeExceeded,
}

impl IcmpError {
    fn type_code(self) -> (u8, u8) {
        match self {
            Self::NetUnreachable => (icmp::TYPE_DEST_UNREACHABLE, icmp::CODE_NET_UNREACHABLE),
            Self::HostUnreachable => (icmp::TYPE_DEST_UNREACHABLE, icmp::CODE_HOST_UNREACHABLE),
            Self::PortUnreachable => (icmp::TYPE_DEST_UNREACHABLE, icmp::CODE_PORT_UNREACHABLE),
            Self::TimeExceeded => (icmp::TYPE_TIME_EXCEEDED, 0),
        }
    }
}

/// Build an echo reply to a request that arrived on `iface` from `req_src`
/// (Ethernet) / `req_ip` (IP).  Identifier, sequence number, and payload are
/// echoed verbatim.
pub fn echo_reply_frame(
    iface: &Interface,
    req_eth_src: MacAddr,
    req_ip: &Ipv4Header,
    ident: u16,
    seq: u16,
    payload: &[u8],
) -> Vec<u8> {
    let message = icmp::echo_message(icmp::TYPE_ECHO_REPLY, ident, seq, payload);
    // Reply from the address the request targeted, back to its sender.
    build_frame(iface, req_eth_src, req_ip.dst, req_ip.src, &message)
}

/// Build an ICMP error for `original` (an IPv4 datagram starting at its
/// header) that arrived on `iface` from `orig_eth_src`.
pub fn error_frame(
    error: IcmpError,
    iface: &Interface,
    orig_eth_src: MacAddr,
    original: &[u8],
) -> Option<Vec<u8>> {
    let orig = Ipv4Header::parse(original).ok()?;
    let (icmp_type, code) = error.type_code();
    let message = icmp::error_message(icmp_type, code, original);
    Some(build_frame(iface, orig_eth_src, iface.ip, orig.src, &message))
}

fn build_frame(
    iface: &Interface,
    eth_dst: MacAddr,
    ip_src: Ipv4Addr,
    ip_dst: Ipv4Addr,
    message: &[u8],
) -> Vec<u8> {
    let eth = EthernetHeader {
        dst: eth_dst,
        src: iface.mac,
        ethertype: ETHERTYPE_IPV4,
    };
    let ip = Ipv4Header {
        ihl: 5,
        tos: 0,
        total_len: (IPV4_HEADER_LEN + message.len()) as u16,
        ident: 0,
        flags_frag: 0,
        ttl: REPLY_TTL,
        proto: IPPROTO_ICMP,
        checksum: 0,
        src: ip_src,
        dst: ip_dst,
    };
    let mut frame =
        Vec::with_capacity(rudder_wire::ETH_HEADER_LEN + IPV4_HEADER_LEN + message.len());
    frame.extend_from_slice(&eth.to_bytes());
    frame.extend_from_slice(&ip.to_bytes());
    frame.extend_from_slice(message);
    frame
}
