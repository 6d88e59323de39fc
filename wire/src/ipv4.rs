//! IPv4 header codec.
//!
//! Parsing accepts any IHL ≥ 5 with the options bytes present; serialization
//! always emits a bare 20-byte header (IHL = 5), which is all the router ever
//! generates.

use std::net::Ipv4Addr;

use crate::{IPV4_HEADER_LEN, ParseError, checksum, checksum_ok};

/// Parsed IPv4 header fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Header length in 32-bit words (5–15).
    pub ihl: u8,
    /// Type of service.
    pub tos: u8,
    /// Total datagram length (header + payload).
    pub total_len: u16,
    /// Identification.
    pub ident: u16,
    /// Flags (3 bits) + fragment offset (13 bits).
    pub flags_frag: u16,
    /// Time to live.
    pub ttl: u8,
    /// Payload protocol number.
    pub proto: u8,
    /// Header checksum as stored on the wire.
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    /// Parse an IPv4 header from the start of `data`.
    ///
    /// Validates version = 4, IHL ≥ 5, and that the buffer covers the full
    /// header (IHL × 4 bytes).  The checksum is carried, not verified — use
    /// [`verify_checksum`] on the raw bytes for that.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < IPV4_HEADER_LEN {
            return Err(ParseError::Truncated {
                needed: IPV4_HEADER_LEN,
                have: data.len(),
            });
        }
        let version = data[0] >> 4;
        if version != 4 {
            return Err(ParseError::BadVersion(version));
        }
        let ihl = data[0] & 0x0f;
        let header_len = usize::from(ihl) * 4;
        if header_len < IPV4_HEADER_LEN {
            return Err(ParseError::BadHeaderLen(header_len));
        }
        if data.len() < header_len {
            return Err(ParseError::Truncated {
                needed: header_len,
                have: data.len(),
            });
        }
        Ok(Self {
            ihl,
            tos: data[1],
            total_len: u16::from_be_bytes([data[2], data[3]]),
            ident: u16::from_be_bytes([data[4], data[5]]),
            flags_frag: u16::from_be_bytes([data[6], data[7]]),
            ttl: data[8],
            proto: data[9],
            checksum: u16::from_be_bytes([data[10], data[11]]),
            src: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            dst: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
        })
    }

    /// Header length in bytes (IHL × 4).
    #[inline]
    pub fn header_len(&self) -> usize {
        usize::from(self.ihl) * 4
    }

    /// Serialize into a packed 20-byte header (IHL forced to 5) with the
    /// checksum field freshly computed.
    pub fn to_bytes(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut buf = [0u8; IPV4_HEADER_LEN];
        buf[0] = 0x40 | 5; // version 4, IHL 5
        buf[1] = self.tos;
        buf[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        buf[4..6].copy_from_slice(&self.ident.to_be_bytes());
        buf[6..8].copy_from_slice(&self.flags_frag.to_be_bytes());
        buf[8] = self.ttl;
        buf[9] = self.proto;
        // checksum computed below over the zeroed field
        buf[12..16].copy_from_slice(&self.src.octets());
        buf[16..20].copy_from_slice(&self.dst.octets());
        let cksum = checksum(&buf);
        buf[10..12].copy_from_slice(&cksum.to_be_bytes());
        buf
    }
}

/// Verify the checksum of a raw IPv4 header (`header` must be exactly the
/// IHL × 4 header bytes).
pub fn verify_checksum(header: &[u8]) -> bool {
    checksum_ok(header)
}

/// Recompute and store the checksum of a raw IPv4 header in place.
pub fn update_checksum(header: &mut [u8]) {
    header[10] = 0;
    header[11] = 0;
    let cksum = checksum(header);
    header[10..12].copy_from_slice(&cksum.to_be_bytes());
}

/// Decrement the TTL of a raw IPv4 header in place and refresh the checksum.
///
/// The caller has already established that the TTL is at least 2; a datagram
/// that would reach zero is answered with Time Exceeded instead.
pub fn decrement_ttl(header: &mut [u8]) {
    header[8] = header[8].saturating_sub(1);
    update_checksum(header);
}
