//! ARP timer task — cache aging and pending-request retries.
//!
//! One dedicated thread per router.  Each cycle sleeps [`ARP_TICK`], checks
//! the shutdown flag, then takes the ARP lock and does two sweeps: clear
//! cache entries past their lifetime, and advance every pending request —
//! re-transmit while the send budget lasts, otherwise answer each withheld
//! frame with ICMP Host Unreachable and drop the request.
//!
//! Retries are not gated on `last_sent`: the tick cadence is the retry
//! cadence, giving at most [`ARP_MAX_SENDS`] transmissions roughly one second
//! apart.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, trace};
use rudder_wire::ETH_HEADER_LEN;
use rudder_wire::ethernet::EthernetHeader;

use crate::arp;
use crate::ctx::Router;
use crate::icmp::{IcmpError, error_frame};
use crate::sink::FrameSink;
use crate::{ARP_MAX_SENDS, ARP_TICK};

/// Run one timer cycle against `router`.
///
/// Takes and releases the ARP lock internally; emissions happen under the
/// lock, which is fine — the only other lock taker is the forwarding thread.
pub fn arp_tick(router: &Router, sink: &dyn FrameSink, now: Instant) {
    let mut state = router.arp_lock();

    let cleared = state.cache.expire(now);
    if cleared > 0 {
        trace!("arp: expired {cleared} cache entr(ies)");
    }

    state.pending.retain_mut(|request| {
        if request.times_sent < ARP_MAX_SENDS {
            let Some(egress) = router.iface(request.out_iface) else {
                return false;
            };
            request.times_sent += 1;
            request.last_sent = now;
            trace!(
                "arp: re-sending request for {} on {} ({}/{})",
                request.ip, egress.name, request.times_sent, ARP_MAX_SENDS
            );
            let query = arp::request_frame(egress, request.ip);
            if let Err(e) = sink.send_frame(router, request.out_iface, &query) {
                debug!("arp: retry send failed: {e}");
            }
            return true;
        }

        // Budget spent: give the senders their bad news and drop the request.
        debug!(
            "arp: giving up on {} after {} request(s), {} withheld frame(s)",
            request.ip,
            request.times_sent,
            request.withheld.len()
        );
        for withheld in &request.withheld {
            send_host_unreachable(router, sink, withheld);
        }
        false
    });
}

fn send_host_unreachable(router: &Router, sink: &dyn FrameSink, withheld: &arp::WithheldFrame) {
    let Some(in_iface) = router.iface(withheld.iface) else {
        return;
    };
    if withheld.bytes.len() < ETH_HEADER_LEN {
        return;
    }
    let Ok(eth) = EthernetHeader::parse(&withheld.bytes) else {
        return;
    };
    let datagram = &withheld.bytes[ETH_HEADER_LEN..];
    let Some(reply) = error_frame(IcmpError::HostUnreachable, in_iface, eth.src, datagram) else {
        return;
    };
    if let Err(e) = sink.send_frame(router, withheld.iface, &reply) {
        debug!("arp: host-unreachable send failed: {e}");
    }
}

/// Spawn the timer thread for `router`.
///
/// The thread exits on the next tick after `shutdown` becomes true; the
/// front end sets the flag and joins when tearing a router down.
pub fn spawn_arp_timer(
    router: Arc<Router>,
    sink: Arc<dyn FrameSink>,
    shutdown: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("arp-timer-{}", router.name))
        .spawn(move || {
            loop {
                thread::sleep(ARP_TICK);
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                arp_tick(&router, sink.as_ref(), Instant::now());
            }
            trace!("arp: timer for {} shut down", router.name);
        })
}
