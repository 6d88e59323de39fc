//! Tests for the ICMP codec and message builders.

use crate::icmp::{
    CODE_HOST_UNREACHABLE, IcmpHeader, TYPE_DEST_UNREACHABLE, TYPE_ECHO_REPLY, TYPE_ECHO_REQUEST,
    echo_fields, echo_message, error_message,
};
use crate::ipv4::Ipv4Header;
use crate::{IPPROTO_UDP, checksum_ok};

fn sample_datagram() -> Vec<u8> {
    let header = Ipv4Header {
        ihl: 5,
        tos: 0,
        total_len: 36,
        ident: 7,
        flags_frag: 0,
        ttl: 63,
        proto: IPPROTO_UDP,
        checksum: 0,
        src: "192.168.2.5".parse().unwrap(),
        dst: "192.168.1.5".parse().unwrap(),
    };
    let mut datagram = header.to_bytes().to_vec();
    datagram.extend_from_slice(&[0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19]);
    datagram
}

#[test]
fn echo_message_round_trips() {
    let msg = echo_message(TYPE_ECHO_REQUEST, 0x1234, 1, b"ABCDEFGH");
    assert!(checksum_ok(&msg));

    let (header, body) = IcmpHeader::parse(&msg).unwrap();
    assert_eq!(header.icmp_type, TYPE_ECHO_REQUEST);
    assert_eq!(header.code, 0);

    let (ident, seq, payload) = echo_fields(body).unwrap();
    assert_eq!(ident, 0x1234);
    assert_eq!(seq, 1);
    assert_eq!(payload, b"ABCDEFGH");
}

#[test]
fn echo_reply_echoes_payload_verbatim() {
    let msg = echo_message(TYPE_ECHO_REPLY, 9, 42, &[0xde, 0xad, 0xbe, 0xef]);
    let (header, body) = IcmpHeader::parse(&msg).unwrap();
    assert_eq!(header.icmp_type, TYPE_ECHO_REPLY);
    let (_, _, payload) = echo_fields(body).unwrap();
    assert_eq!(payload, &[0xde, 0xad, 0xbe, 0xef]);
}

#[test]
fn error_message_carries_header_plus_eight_bytes() {
    let datagram = sample_datagram();
    let msg = error_message(TYPE_DEST_UNREACHABLE, CODE_HOST_UNREACHABLE, &datagram);

    assert!(checksum_ok(&msg));
    assert_eq!(msg[0], TYPE_DEST_UNREACHABLE);
    assert_eq!(msg[1], CODE_HOST_UNREACHABLE);
    // 4 unused bytes after the checksum.
    assert_eq!(&msg[4..8], &[0, 0, 0, 0]);
    // Then the IPv4 header + first 8 payload bytes of the offending datagram.
    assert_eq!(&msg[8..], &datagram[..28]);
}

#[test]
fn error_message_truncates_short_datagrams() {
    let datagram = sample_datagram();
    let msg = error_message(TYPE_DEST_UNREACHABLE, CODE_HOST_UNREACHABLE, &datagram[..24]);
    // Only 4 payload bytes exist; the excerpt stops there.
    assert_eq!(&msg[8..], &datagram[..24]);
    assert!(checksum_ok(&msg));
}

#[test]
fn truncated_icmp_header_is_rejected() {
    assert!(IcmpHeader::parse(&[8, 0, 0]).is_err());
    assert!(echo_fields(&[0x12]).is_err());
}
