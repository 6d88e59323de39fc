//! Tests for the pcapng writer.

use rudder_wire::types::MacAddr;

use crate::pcap::{Direction, PcapWriter};

fn u32_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// Walk the blocks in `buf`, returning (block_type, block_bytes) pairs.
fn blocks(buf: &[u8]) -> Vec<(u32, &[u8])> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < buf.len() {
        let block_type = u32_at(buf, offset);
        let total = u32_at(buf, offset + 4) as usize;
        assert_eq!(total % 4, 0, "block length must be 32-bit aligned");
        let block = &buf[offset..offset + total];
        // Trailing length must mirror the leading one.
        assert_eq!(u32_at(block, total - 4), total as u32);
        out.push((block_type, block));
        offset += total;
    }
    out
}

#[test]
fn section_header_comes_first() {
    let writer = PcapWriter::new(Vec::new()).unwrap();
    let buf = writer_into_inner(writer);

    let blocks = blocks(&buf);
    assert_eq!(blocks.len(), 1);
    let (block_type, shb) = blocks[0];
    assert_eq!(block_type, 0x0A0D_0D0A);
    assert_eq!(shb.len(), 28);
    assert_eq!(u32_at(shb, 8), 0x1A2B_3C4D);
}

#[test]
fn interfaces_get_sequential_ids() {
    let mut writer = PcapWriter::new(Vec::new()).unwrap();
    let id0 = writer.add_interface("r1-eth0", MacAddr([1, 2, 3, 4, 5, 6])).unwrap();
    let id1 = writer.add_interface("r1-eth1", MacAddr([1, 2, 3, 4, 5, 7])).unwrap();
    assert_eq!((id0, id1), (0, 1));

    let buf = writer_into_inner(writer);
    let blocks = blocks(&buf);
    assert_eq!(blocks.len(), 3);
    for (block_type, block) in &blocks[1..] {
        assert_eq!(*block_type, 1, "interface description block");
        let link_type = u16::from_ne_bytes([block[8], block[9]]);
        assert_eq!(link_type, 1, "LINKTYPE_ETHERNET");
    }
    // The interface name travels in the if_name option.
    let idb = blocks[1].1;
    assert!(
        idb.windows(7).any(|w| w == b"r1-eth0"),
        "if_name option should carry the interface name"
    );
}

#[test]
fn packet_blocks_carry_length_padding_and_direction() {
    let mut writer = PcapWriter::new(Vec::new()).unwrap();
    writer.add_interface("r1-eth0", MacAddr([1, 2, 3, 4, 5, 6])).unwrap();

    let frame = [0xabu8; 15]; // odd length forces padding
    writer.write_frame(0, Direction::Outbound, &frame).unwrap();

    let buf = writer_into_inner(writer);
    let blocks = blocks(&buf);
    let (block_type, epb) = blocks[2];
    assert_eq!(block_type, 6);

    assert_eq!(u32_at(epb, 8), 0, "interface id");
    assert_eq!(u32_at(epb, 20), 15, "captured length");
    assert_eq!(u32_at(epb, 24), 15, "original length");
    assert_eq!(&epb[28..43], &frame);
    assert_eq!(epb[43], 0, "pad byte");

    // epb_flags option: code 2, length 4, value 2 (outbound).
    let options = &epb[44..];
    assert_eq!(u16::from_ne_bytes([options[0], options[1]]), 2);
    assert_eq!(u16::from_ne_bytes([options[2], options[3]]), 4);
    assert_eq!(u32_at(options, 4), 2);
}

fn writer_into_inner(mut writer: PcapWriter<Vec<u8>>) -> Vec<u8> {
    writer.flush().unwrap();
    writer.into_inner()
}
