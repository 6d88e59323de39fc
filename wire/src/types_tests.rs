//! Tests for the link-layer primitive types.

use crate::types::{EtherType, IpProtocol, MacAddr};

#[test]
fn mac_broadcast_predicate() {
    assert!(MacAddr::BROADCAST.is_broadcast());
    assert!(MacAddr::BROADCAST.is_multicast());
    assert!(!MacAddr([0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]).is_broadcast());
}

#[test]
fn mac_multicast_is_low_bit_of_first_octet() {
    assert!(MacAddr([0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]).is_multicast());
    assert!(!MacAddr([0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x01]).is_multicast());
}

#[test]
fn mac_zero_predicate() {
    assert!(MacAddr::ZERO.is_zero());
    assert!(!MacAddr([0, 0, 0, 0, 0, 1]).is_zero());
}

#[test]
fn mac_display_is_colon_hex() {
    let mac = MacAddr([0xaa, 0xbb, 0xcc, 0x00, 0x01, 0x02]);
    assert_eq!(mac.to_string(), "aa:bb:cc:00:01:02");
}

#[test]
fn ethertype_from_u16() {
    assert_eq!(EtherType::from_u16(0x0800), Some(EtherType::Ipv4));
    assert_eq!(EtherType::from_u16(0x0806), Some(EtherType::Arp));
    assert_eq!(EtherType::from_u16(0x86DD), Some(EtherType::Ipv6));
    assert_eq!(EtherType::from_u16(0x88CC), None);
    assert_eq!(EtherType::Arp.as_u16(), 0x0806);
}

#[test]
fn ip_protocol_from_u8() {
    assert_eq!(IpProtocol::from_u8(1), Some(IpProtocol::Icmp));
    assert_eq!(IpProtocol::from_u8(6), Some(IpProtocol::Tcp));
    assert_eq!(IpProtocol::from_u8(17), Some(IpProtocol::Udp));
    assert_eq!(IpProtocol::from_u8(89), None);
}
