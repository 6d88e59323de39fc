//! Router core — the forwarding engine and its supporting state.
//!
//! This crate is the data plane of a small user-space IPv4 router.  It is
//! driven entirely from the outside: a controller front end (see the `rudderd`
//! binary) feeds inbound Ethernet frames to [`engine::handle_frame`] one at a
//! time and supplies a [`sink::FrameSink`] that carries outbound frames away.
//! The only other actor is the per-router ARP timer task ([`timer`]), which
//! shares the ARP cache and pending-request list with the engine through a
//! single mutex (the "ARP lock").
//!
//! # Concurrency
//!
//! Frame handling is serial: the controller delivers one frame at a time and
//! [`engine::handle_frame`] never runs concurrently with itself.  The timer
//! task wakes once per second.  Everything either task mutates lives in
//! [`arp::ArpState`] behind [`ctx::Router::arp_lock`]; the interface list and
//! routing table are immutable after configuration and need no lock.

use std::time::Duration;

pub mod arp;
pub mod ctx;
pub mod engine;
pub mod icmp;
pub mod route;
pub mod sink;
pub mod timer;


/// Number of slots in the ARP cache.
pub const ARP_CACHE_SIZE: usize = 100;

/// How long a cache entry stays valid after creation.  The timer uses a
/// strict comparison, so an entry lives through second 15 and is reaped on
/// the first tick where its age exceeds this.
pub const ARP_CACHE_TTL: Duration = Duration::from_secs(15);

/// Total ARP request transmissions per pending resolution (the initial send
/// plus retries).  When this budget is spent the pending request is cancelled
/// and every withheld datagram is answered with ICMP Host Unreachable.
pub const ARP_MAX_SENDS: u32 = 5;

/// Cadence of the ARP timer task.
pub const ARP_TICK: Duration = Duration::from_secs(1);
