//! Forwarding engine — per-frame dispatch for everything the router receives.
//!
//! [`handle_frame`] is the single entry point for inbound frames.  It runs on
//! the controller's I/O thread, one frame at a time, and either emits its
//! responses synchronously through the [`FrameSink`] or parks the datagram on
//! a pending ARP request to be emitted later (by the timer task or by the
//! matching reply).
//!
//! # Processing steps
//!
//! 1. Frame sanity: length bounds and destination-MAC filtering
//! 2. Dispatch by EtherType: ARP and IPv4; everything else is dropped
//! 3. ARP: answer requests for our address; replies feed the cache and flush
//!    withheld frames
//! 4. IPv4: deliver locally (echo reply / port unreachable) or forward
//!    (TTL, longest-prefix match, ARP resolution, MAC rewrite)
//!
//! Synthesized ICMP always leaves through the ingress interface, addressed to
//! the Ethernet source of the offending frame.

use std::time::Instant;

use log::{debug, trace, warn};
use rudder_wire::arp::ArpPacket;
use rudder_wire::ethernet::{self, EthernetHeader};
use rudder_wire::ipv4::{self, Ipv4Header};
use rudder_wire::types::{EtherType, IpProtocol};
use rudder_wire::{
    ARP_OPER_REPLY, ARP_OPER_REQUEST, ARP_PACKET_LEN, ETH_FRAME_MAX_LEN, ETH_FRAME_MIN_LEN,
    ETH_HEADER_LEN, icmp,
};

use crate::arp;
use crate::ctx::{IfaceId, Interface, Router};
use crate::icmp::{IcmpError, echo_reply_frame, error_frame};
use crate::sink::FrameSink;

/// Process one inbound Ethernet frame.
pub fn handle_frame(router: &Router, sink: &dyn FrameSink, iface_id: IfaceId, frame: &[u8]) {
    let Some(iface) = router.iface(iface_id) else {
        warn!("engine: frame on unknown interface {iface_id}, dropping");
        return;
    };

    if frame.len() < ETH_HEADER_LEN {
        debug!(
            "engine: frame on {} is {} bytes, shorter than an Ethernet header",
            iface.name,
            frame.len()
        );
        return;
    }
    let Ok(eth) = EthernetHeader::parse(frame) else {
        return;
    };

    // Multicast that is not the all-ones broadcast is not for us.
    if eth.dst.is_multicast() && !eth.dst.is_broadcast() {
        trace!("engine: multicast frame on {}, ignoring", iface.name);
        return;
    }

    if !eth.dst.is_broadcast() && eth.dst != iface.mac {
        warn!(
            "engine: frame on {} addressed to {} (interface has {}), dropping",
            iface.name, eth.dst, iface.mac
        );
        return;
    }

    if frame.len() > ETH_FRAME_MAX_LEN {
        warn!(
            "engine: frame on {} is {} bytes, larger than the maximum Ethernet frame",
            iface.name,
            frame.len()
        );
        return;
    }
    if frame.len() < ETH_FRAME_MIN_LEN {
        trace!(
            "engine: frame on {} is {} bytes, shorter than the Ethernet minimum",
            iface.name,
            frame.len()
        );
    }

    match EtherType::from_u16(eth.ethertype) {
        Some(EtherType::Arp) => handle_arp(router, sink, iface_id, iface, frame),
        Some(EtherType::Ipv4) => handle_ipv4(router, sink, iface_id, iface, &eth, frame),
        Some(EtherType::Ipv6) => {
            trace!("engine: IPv6 frame on {}, ignoring", iface.name);
        }
        None => {
            trace!(
                "engine: unknown ethertype 0x{:04x} on {}, dropping",
                eth.ethertype, iface.name
            );
        }
    }
}

// =============================================================================
// ARP
// =============================================================================

fn handle_arp(
    router: &Router,
    sink: &dyn FrameSink,
    iface_id: IfaceId,
    iface: &Interface,
    frame: &[u8],
) {
    let payload = ethernet::payload(frame);
    if payload.len() < ARP_PACKET_LEN {
        debug!(
            "arp: packet on {} is {} bytes, need {}",
            iface.name,
            payload.len(),
            ARP_PACKET_LEN
        );
        return;
    }
    let Ok(packet) = ArpPacket::parse(payload) else {
        return;
    };
    if !packet.is_ethernet_ipv4() {
        debug!(
            "arp: non-Ethernet/IPv4 packet on {} (htype={}, ptype=0x{:04x})",
            iface.name, packet.htype, packet.ptype
        );
        return;
    }

    match packet.oper {
        ARP_OPER_REQUEST => {
            if packet.tpa != iface.ip {
                trace!(
                    "arp: request on {} for {} is not ours, ignoring",
                    iface.name, packet.tpa
                );
                return;
            }
            debug!(
                "arp: request for {} from {} ({}), sending reply",
                packet.tpa, packet.spa, packet.sha
            );
            let reply = arp::reply_frame(iface, packet.sha, packet.spa);
            if let Err(e) = sink.send_frame(router, iface_id, &reply) {
                debug!("arp: reply send failed: {e}");
            }
        }
        ARP_OPER_REPLY => {
            debug!("arp: reply {} is-at {} on {}", packet.spa, packet.sha, iface.name);
            let mut state = router.arp_lock();
            let now = Instant::now();
            if let Err(e) = state.cache.insert(packet.spa, packet.sha, now) {
                debug!("arp: {e}, dropping binding for {}", packet.spa);
            }
            let Some(request) = state.take_pending(packet.spa) else {
                return;
            };
            debug!(
                "arp: flushing {} withheld frame(s) for {}",
                request.withheld.len(),
                request.ip
            );
            let Some(out_iface) = router.iface(request.out_iface) else {
                return;
            };
            for withheld in request.withheld {
                let mut bytes = withheld.bytes;
                ethernet::set_dst(&mut bytes, packet.sha);
                ethernet::set_src(&mut bytes, out_iface.mac);
                if let Err(e) = sink.send_frame(router, request.out_iface, &bytes) {
                    debug!("arp: withheld frame send failed: {e}");
                }
            }
        }
        other => {
            debug!("arp: unknown opcode {other} on {}", iface.name);
        }
    }
}

// =============================================================================
// IPv4
// =============================================================================

fn handle_ipv4(
    router: &Router,
    sink: &dyn FrameSink,
    iface_id: IfaceId,
    iface: &Interface,
    eth: &EthernetHeader,
    frame: &[u8],
) {
    let datagram = ethernet::payload(frame);
    let ip = match Ipv4Header::parse(datagram) {
        Ok(ip) => ip,
        Err(e) => {
            debug!("ipv4: bad header on {}: {e}", iface.name);
            return;
        }
    };
    if !ipv4::verify_checksum(&datagram[..ip.header_len()]) {
        debug!("ipv4: bad header checksum on {}, dropping", iface.name);
        return;
    }
    // Trim link-layer padding: everything past the IP total length is not
    // part of the datagram.
    let total_len = usize::from(ip.total_len);
    if total_len < ip.header_len() || total_len > datagram.len() {
        debug!("ipv4: bad total length {total_len} on {}, dropping", iface.name);
        return;
    }
    let datagram = &datagram[..total_len];

    if router.owns_ip(ip.dst) {
        deliver_local(router, sink, iface_id, iface, eth, &ip, datagram);
    } else {
        forward(router, sink, iface_id, iface, eth, &ip, datagram);
    }
}

/// A datagram addressed to one of the router's own interfaces (not
/// necessarily the one it arrived on).
fn deliver_local(
    router: &Router,
    sink: &dyn FrameSink,
    iface_id: IfaceId,
    iface: &Interface,
    eth: &EthernetHeader,
    ip: &Ipv4Header,
    datagram: &[u8],
) {
    match IpProtocol::from_u8(ip.proto) {
        Some(IpProtocol::Icmp) => {
            let body = &datagram[ip.header_len()..];
            let Ok((header, rest)) = icmp::IcmpHeader::parse(body) else {
                debug!("icmp: truncated message for {} on {}", ip.dst, iface.name);
                return;
            };
            if header.icmp_type != icmp::TYPE_ECHO_REQUEST {
                trace!(
                    "icmp: type {} for {} on {}, ignoring",
                    header.icmp_type, ip.dst, iface.name
                );
                return;
            }
            let Ok((ident, seq, payload)) = icmp::echo_fields(rest) else {
                debug!("icmp: truncated echo request on {}", iface.name);
                return;
            };
            debug!(
                "icmp: echo request for {} (id={ident:#06x} seq={seq}), replying",
                ip.dst
            );
            let reply = echo_reply_frame(iface, eth.src, ip, ident, seq, payload);
            if let Err(e) = sink.send_frame(router, iface_id, &reply) {
                debug!("icmp: echo reply send failed: {e}");
            }
        }
        Some(proto @ (IpProtocol::Tcp | IpProtocol::Udp)) => {
            debug!(
                "ipv4: {} datagram for {} on {}, sending port unreachable",
                proto, ip.dst, iface.name
            );
            send_error(router, sink, iface_id, iface, IcmpError::PortUnreachable, eth, datagram);
        }
        _ => {
            trace!(
                "ipv4: protocol {} for {} on {}, dropping",
                ip.proto, ip.dst, iface.name
            );
        }
    }
}

/// A datagram in transit: decrement, match, resolve, emit (or withhold).
fn forward(
    router: &Router,
    sink: &dyn FrameSink,
    iface_id: IfaceId,
    iface: &Interface,
    eth: &EthernetHeader,
    ip: &Ipv4Header,
    datagram: &[u8],
) {
    if ip.ttl <= 1 {
        debug!(
            "ipv4: TTL expired for {} -> {} on {}",
            ip.src, ip.dst, iface.name
        );
        send_error(router, sink, iface_id, iface, IcmpError::TimeExceeded, eth, datagram);
        return;
    }

    let Some(route) = router.routes.lookup(ip.dst) else {
        debug!("ipv4: no route to {} (from {})", ip.dst, ip.src);
        send_error(router, sink, iface_id, iface, IcmpError::NetUnreachable, eth, datagram);
        return;
    };
    let next_hop = route.next_hop(ip.dst);
    let egress_id = route.iface;
    let Some(egress) = router.iface(egress_id) else {
        return;
    };

    // The forwarded copy: TTL down by one, checksum refreshed.  Only the
    // Ethernet addresses remain to be filled in.
    let mut out = frame_with_decremented_ttl(eth, ip, datagram);

    let mut state = router.arp_lock();
    let now = Instant::now();
    if let Some(mac) = state.cache.lookup(next_hop, now) {
        ethernet::set_dst(&mut out, mac);
        ethernet::set_src(&mut out, egress.mac);
        trace!(
            "ipv4: forwarding {} -> {} via {} ({}) on {}",
            ip.src, ip.dst, next_hop, mac, egress.name
        );
        if let Err(e) = sink.send_frame(router, egress_id, &out) {
            debug!("ipv4: forward send failed: {e}");
        }
        return;
    }

    // No binding for the next hop: withhold the datagram and make sure an
    // ARP request is in flight.
    if let Some(request) = state.find_pending_mut(next_hop) {
        request.attach(iface_id, &out);
        trace!(
            "arp: withholding frame for {} ({} now queued)",
            next_hop,
            request.withheld.len()
        );
        return;
    }

    debug!("arp: sending request for {} on {}", next_hop, egress.name);
    let request = state.add_pending(next_hop, egress_id, now);
    request.attach(iface_id, &out);
    request.times_sent = 1;
    request.last_sent = now;
    let query = arp::request_frame(egress, next_hop);
    if let Err(e) = sink.send_frame(router, egress_id, &query) {
        debug!("arp: request send failed: {e}");
    }
}

/// Rebuild the frame with the IP header's TTL decremented and checksum
/// recomputed.  Ethernet addresses are left as received; the caller rewrites
/// them once the next hop's MAC is known.
fn frame_with_decremented_ttl(eth: &EthernetHeader, ip: &Ipv4Header, datagram: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ETH_HEADER_LEN + datagram.len());
    out.extend_from_slice(&eth.to_bytes());
    out.extend_from_slice(datagram);
    ipv4::decrement_ttl(&mut out[ETH_HEADER_LEN..ETH_HEADER_LEN + ip.header_len()]);
    out
}

fn send_error(
    router: &Router,
    sink: &dyn FrameSink,
    iface_id: IfaceId,
    iface: &Interface,
    error: IcmpError,
    eth: &EthernetHeader,
    datagram: &[u8],
) {
    let Some(reply) = error_frame(error, iface, eth.src, datagram) else {
        return;
    };
    if let Err(e) = sink.send_frame(router, iface_id, &reply) {
        debug!("icmp: {error:?} send failed: {e}");
    }
}
