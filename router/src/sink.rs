//! The boundary between the router core and whatever carries its frames.
//!
//! The core never owns a socket: every outbound frame is handed to a
//! [`FrameSink`], and the front end decides what that means (write it to the
//! controller, capture it, count it).  Tests substitute a recording sink.

use std::io;

use crate::ctx::{IfaceId, Router};

/// Carrier for outbound Ethernet frames.
///
/// `send_frame` may be called while the ARP lock is held, so implementations
/// must not call back into the router core.  Errors are the carrier's own
/// (broken controller connection, capture file I/O); the engine logs them and
/// keeps going — a failed emission never aborts frame processing.
pub trait FrameSink: Send + Sync {
    /// Emit `frame` on the given interface of `router`.
    fn send_frame(&self, router: &Router, iface: IfaceId, frame: &[u8]) -> io::Result<()>;
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Shared fixtures for the engine and timer tests.

    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    use rudder_wire::types::MacAddr;

    use super::FrameSink;
    use crate::ctx::{IfaceId, Router, RouterBuilder};

    /// Sink that records every emission for later inspection.
    #[derive(Default)]
    pub struct RecordingSink {
        frames: Mutex<Vec<(IfaceId, Vec<u8>)>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// All emissions so far, in order.
        pub fn frames(&self) -> Vec<(IfaceId, Vec<u8>)> {
            self.frames.lock().unwrap().clone()
        }

        pub fn count(&self) -> usize {
            self.frames.lock().unwrap().len()
        }
    }

    impl FrameSink for RecordingSink {
        fn send_frame(
            &self,
            _router: &Router,
            iface: IfaceId,
            frame: &[u8],
        ) -> std::io::Result<()> {
            self.frames.lock().unwrap().push((iface, frame.to_vec()));
            Ok(())
        }
    }

    pub const ETH0_MAC: MacAddr = MacAddr([0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x01]);
    pub const ETH1_MAC: MacAddr = MacAddr([0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x02]);

    pub fn eth0_ip() -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, 1)
    }

    pub fn eth1_ip() -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 2, 1)
    }

    /// Two-interface router with one route:
    /// `192.168.1.0/24 via 10.0.0.2 dev eth0`.
    pub fn two_port_router() -> Router {
        let mut builder = RouterBuilder::new(0, "r1");
        builder.add_interface(0, "eth0", ETH0_MAC, eth0_ip());
        builder.add_interface(1, "eth1", ETH1_MAC, eth1_ip());
        builder
            .add_route(
                Ipv4Addr::new(192, 168, 1, 0),
                Ipv4Addr::new(255, 255, 255, 0),
                Ipv4Addr::new(10, 0, 0, 2),
                1,
                IfaceId(0),
            )
            .unwrap();
        builder.build().unwrap()
    }
}
