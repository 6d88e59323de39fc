//! One-line frame summaries and hex dumps for the log.
//!
//! Every frame crossing the controller channel gets a summary at DEBUG and,
//! when TRACE is on, a classic offset/hex dump.  Summaries never fail: a
//! frame too short to parse is summarized as such.

use std::fmt::Write as _;

use log::{Level, debug, log_enabled, trace};
use rudder_core::ctx::Interface;
use rudder_core::ctx::Router;
use rudder_wire::arp::ArpPacket;
use rudder_wire::ethernet::{self, EthernetHeader};
use rudder_wire::ipv4::Ipv4Header;
use rudder_wire::types::EtherType;
use rudder_wire::{ARP_OPER_REPLY, ARP_OPER_REQUEST, icmp};

pub fn inbound(router: &Router, iface: &Interface, frame: &[u8]) {
    log("received", router, iface, frame);
}

pub fn outbound(router: &Router, iface: &Interface, frame: &[u8]) {
    log("sending", router, iface, frame);
}

fn log(verb: &str, router: &Router, iface: &Interface, frame: &[u8]) {
    if !log_enabled!(Level::Debug) {
        return;
    }
    debug!(
        "{verb} frame on {}-{}: {}",
        router.name,
        iface.name,
        summary(frame)
    );
    if log_enabled!(Level::Trace) {
        for line in hexdump(frame) {
            trace!("  {line}");
        }
    }
}

/// A single human-readable line describing a frame.
pub fn summary(frame: &[u8]) -> String {
    let Ok(eth) = EthernetHeader::parse(frame) else {
        return format!("{}-byte runt", frame.len());
    };
    let payload = ethernet::payload(frame);
    match EtherType::from_u16(eth.ethertype) {
        Some(EtherType::Arp) => match ArpPacket::parse(payload) {
            Ok(arp) if arp.oper == ARP_OPER_REQUEST => {
                format!("ARP who-has {} tell {} ({})", arp.tpa, arp.spa, arp.sha)
            }
            Ok(arp) if arp.oper == ARP_OPER_REPLY => {
                format!("ARP {} is-at {}", arp.spa, arp.sha)
            }
            Ok(arp) => format!("ARP op={} {} -> {}", arp.oper, arp.spa, arp.tpa),
            Err(_) => "truncated ARP".to_string(),
        },
        Some(EtherType::Ipv4) => match Ipv4Header::parse(payload) {
            Ok(ip) => {
                let proto = ip_proto_summary(&ip, &payload[ip.header_len().min(payload.len())..]);
                format!("IPv4 {} -> {} ttl={} {}", ip.src, ip.dst, ip.ttl, proto)
            }
            Err(_) => "truncated IPv4".to_string(),
        },
        Some(EtherType::Ipv6) => format!("IPv6 {} -> {}", eth.src, eth.dst),
        None => format!(
            "ethertype 0x{:04x} {} -> {} ({} bytes)",
            eth.ethertype,
            eth.src,
            eth.dst,
            frame.len()
        ),
    }
}

fn ip_proto_summary(ip: &Ipv4Header, body: &[u8]) -> String {
    match ip.proto {
        rudder_wire::IPPROTO_ICMP => match icmp::IcmpHeader::parse(body) {
            Ok((header, _)) => format!("ICMP type={} code={}", header.icmp_type, header.code),
            Err(_) => "ICMP (truncated)".to_string(),
        },
        rudder_wire::IPPROTO_TCP => "TCP".to_string(),
        rudder_wire::IPPROTO_UDP => "UDP".to_string(),
        other => format!("proto={other}"),
    }
}

/// Render `data` as 16-byte offset/hex lines.
pub fn hexdump(data: &[u8]) -> Vec<String> {
    data.chunks(16)
        .enumerate()
        .map(|(i, chunk)| {
            let mut line = format!("{:04x}  ", i * 16);
            for byte in chunk {
                let _ = write!(line, "{byte:02x} ");
            }
            line.trim_end().to_string()
        })
        .collect()
}
