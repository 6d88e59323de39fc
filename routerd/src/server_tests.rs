//! Controller-session tests over a loopback socket pair.
//!
//! These drive `handle_connection` exactly as the controller would: hello
//! handshake, configuration, then Ethernet frames, asserting on the frames
//! the router writes back.

use std::io::BufReader;
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;

use rudder_wire::arp::ArpPacket;
use rudder_wire::ethernet::EthernetHeader;
use rudder_wire::types::MacAddr;
use rudder_wire::{ARP_OPER_REPLY, ARP_OPER_REQUEST, ETH_HEADER_LEN};

use crate::proto::{Message, SUBTYPE_TO_ROUTER, read_message};
use crate::server::{SessionEnd, handle_connection};

const ROUTER_MAC: MacAddr = MacAddr([0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x01]);
const NEIGHBOR_MAC: MacAddr = MacAddr([0xbb, 0xbb, 0xbb, 0xbb, 0xbb, 0x02]);

fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server_side, _) = listener.accept().unwrap();
    (client, server_side)
}

fn send(client: &TcpStream, msg: &Message) {
    use std::io::Write;
    (&*client).write_all(&msg.encode()).unwrap();
}

fn single_router_config() -> Vec<Message> {
    vec![
        Message::Routers { count: 1 },
        Message::Router {
            id: 0,
            num_interfaces: 1,
            rtable_len: 1,
            name: "r1".into(),
        },
        Message::Interface {
            router: 0,
            id: 0,
            mac: ROUTER_MAC,
            ip: Ipv4Addr::new(10, 0, 0, 1),
            name: "eth0".into(),
        },
        Message::RtableEntry {
            router: 0,
            iface: 0,
            metric: 1,
            dest: Ipv4Addr::new(10, 0, 0, 0),
            mask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(0, 0, 0, 0),
        },
        Message::EndConfig,
    ]
}

fn arp_request_frame() -> Vec<u8> {
    let eth = EthernetHeader {
        dst: MacAddr::BROADCAST,
        src: NEIGHBOR_MAC,
        ethertype: rudder_wire::ETHERTYPE_ARP,
    };
    let arp = ArpPacket {
        htype: rudder_wire::ARP_HTYPE_ETHERNET,
        ptype: rudder_wire::ARP_PTYPE_IPV4,
        hlen: rudder_wire::ARP_HLEN_ETHERNET,
        plen: rudder_wire::ARP_PLEN_IPV4,
        oper: ARP_OPER_REQUEST,
        sha: NEIGHBOR_MAC,
        spa: Ipv4Addr::new(10, 0, 0, 2),
        tha: MacAddr::ZERO,
        tpa: Ipv4Addr::new(10, 0, 0, 1),
    };
    let mut frame = eth.to_bytes().to_vec();
    frame.extend_from_slice(&arp.to_bytes());
    frame
}

#[test]
fn full_session_answers_arp_through_the_wire() {
    let (client, server_side) = socket_pair();
    let shutdown = Arc::new(AtomicBool::new(false));

    let session = {
        let shutdown = Arc::clone(&shutdown);
        thread::spawn(move || handle_connection(server_side, None, None, &shutdown))
    };

    let mut replies = BufReader::new(client.try_clone().unwrap());

    // Hello handshake.
    send(&client, &Message::Hello { subtype: SUBTYPE_TO_ROUTER });
    let hello = read_message(&mut replies).unwrap().unwrap();
    assert!(matches!(hello, Message::Hello { .. }));

    // Configuration.
    for msg in single_router_config() {
        send(&client, &msg);
    }

    // A frame with an out-of-range router ID is logged and dropped, not
    // fatal.
    send(
        &client,
        &Message::Frame {
            subtype: SUBTYPE_TO_ROUTER,
            router: 7,
            iface: 0,
            bytes: arp_request_frame(),
        },
    );

    // A valid ARP request still gets its reply.
    send(
        &client,
        &Message::Frame {
            subtype: SUBTYPE_TO_ROUTER,
            router: 0,
            iface: 0,
            bytes: arp_request_frame(),
        },
    );

    let reply = read_message(&mut replies).unwrap().unwrap();
    let Message::Frame { router, iface, bytes, .. } = reply else {
        panic!("expected a frame message, got {reply:?}");
    };
    assert_eq!((router, iface), (0, 0));

    let eth = EthernetHeader::parse(&bytes).unwrap();
    assert_eq!(eth.dst, NEIGHBOR_MAC);
    assert_eq!(eth.src, ROUTER_MAC);
    let arp = ArpPacket::parse(&bytes[ETH_HEADER_LEN..]).unwrap();
    assert_eq!(arp.oper, ARP_OPER_REPLY);
    assert_eq!(arp.sha, ROUTER_MAC);
    assert_eq!(arp.spa, Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(arp.tha, NEIGHBOR_MAC);
    assert_eq!(arp.tpa, Ipv4Addr::new(10, 0, 0, 2));

    // Disconnecting resets the session cleanly.
    drop(replies);
    drop(client);
    let end = session.join().unwrap().unwrap();
    assert_eq!(end, SessionEnd::Disconnected);
}

#[test]
fn out_of_sequence_router_id_is_fatal() {
    let (client, server_side) = socket_pair();
    let shutdown = Arc::new(AtomicBool::new(false));

    let session = {
        let shutdown = Arc::clone(&shutdown);
        thread::spawn(move || handle_connection(server_side, None, None, &shutdown))
    };

    let mut replies = BufReader::new(client.try_clone().unwrap());
    send(&client, &Message::Hello { subtype: SUBTYPE_TO_ROUTER });
    read_message(&mut replies).unwrap().unwrap();

    send(&client, &Message::Routers { count: 2 });
    send(
        &client,
        &Message::Router {
            id: 5,
            num_interfaces: 1,
            rtable_len: 0,
            name: "r9".into(),
        },
    );

    assert!(session.join().unwrap().is_err());
}

#[test]
fn frame_before_hello_is_fatal() {
    let (client, server_side) = socket_pair();
    let shutdown = Arc::new(AtomicBool::new(false));

    let session = {
        let shutdown = Arc::clone(&shutdown);
        thread::spawn(move || handle_connection(server_side, None, None, &shutdown))
    };

    send(
        &client,
        &Message::Frame {
            subtype: SUBTYPE_TO_ROUTER,
            router: 0,
            iface: 0,
            bytes: arp_request_frame(),
        },
    );
    assert!(session.join().unwrap().is_err());
}
