//! ICMP message codec and builders.
//!
//! The router only speaks a small corner of ICMP: echo request/reply when it
//! is the addressed host, and the three error messages the forwarding engine
//! synthesizes.  Error messages carry 4 bytes of zero padding followed by the
//! offending datagram's IPv4 header plus its first 8 payload bytes.

use crate::{ICMP_HEADER_LEN, IPV4_HEADER_LEN, ParseError, checksum};

pub const TYPE_ECHO_REPLY: u8 = 0;
pub const TYPE_DEST_UNREACHABLE: u8 = 3;
pub const TYPE_ECHO_REQUEST: u8 = 8;
pub const TYPE_TIME_EXCEEDED: u8 = 11;

pub const CODE_NET_UNREACHABLE: u8 = 0;
pub const CODE_HOST_UNREACHABLE: u8 = 1;
pub const CODE_PORT_UNREACHABLE: u8 = 3;

/// Number of payload bytes of the offending datagram included in an error
/// message, beyond its IPv4 header.
pub const ERROR_PAYLOAD_BYTES: usize = 8;

/// The fixed leading fields of any ICMP message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IcmpHeader {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
}

impl IcmpHeader {
    /// Parse the leading fields and return them with the rest-of-header +
    /// body bytes that follow.
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), ParseError> {
        if data.len() < 4 {
            return Err(ParseError::Truncated {
                needed: 4,
                have: data.len(),
            });
        }
        let header = Self {
            icmp_type: data[0],
            code: data[1],
            checksum: u16::from_be_bytes([data[2], data[3]]),
        };
        Ok((header, &data[4..]))
    }
}

/// Identifier, sequence number, and payload of an echo message body (the
/// bytes following the 4-byte ICMP header).
pub fn echo_fields(body: &[u8]) -> Result<(u16, u16, &[u8]), ParseError> {
    if body.len() < 4 {
        return Err(ParseError::Truncated {
            needed: 4,
            have: body.len(),
        });
    }
    let ident = u16::from_be_bytes([body[0], body[1]]);
    let seq = u16::from_be_bytes([body[2], body[3]]);
    Ok((ident, seq, &body[4..]))
}

/// Build a complete echo message (request or reply) with its checksum.
pub fn echo_message(icmp_type: u8, ident: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(ICMP_HEADER_LEN + payload.len());
    msg.push(icmp_type);
    msg.push(0); // code
    msg.extend_from_slice(&[0, 0]); // checksum placeholder
    msg.extend_from_slice(&ident.to_be_bytes());
    msg.extend_from_slice(&seq.to_be_bytes());
    msg.extend_from_slice(payload);
    finish(msg)
}

/// Build a complete error message (destination unreachable or time exceeded).
///
/// `original` is the offending datagram starting at its IPv4 header; the
/// message carries that header plus up to [`ERROR_PAYLOAD_BYTES`] of payload.
pub fn error_message(icmp_type: u8, code: u8, original: &[u8]) -> Vec<u8> {
    let excerpt_len = error_excerpt_len(original);
    let mut msg = Vec::with_capacity(ICMP_HEADER_LEN + excerpt_len);
    msg.push(icmp_type);
    msg.push(code);
    msg.extend_from_slice(&[0, 0]); // checksum placeholder
    msg.extend_from_slice(&[0, 0, 0, 0]); // unused / next-hop MTU
    msg.extend_from_slice(&original[..excerpt_len]);
    finish(msg)
}

/// How much of the offending datagram an error message carries: its IPv4
/// header plus the first 8 payload bytes, capped at what is actually present.
fn error_excerpt_len(original: &[u8]) -> usize {
    let header_len = match original.first() {
        Some(&b) if (b >> 4) == 4 && (b & 0x0f) >= 5 => usize::from(b & 0x0f) * 4,
        _ => IPV4_HEADER_LEN,
    };
    (header_len + ERROR_PAYLOAD_BYTES).min(original.len())
}

/// Compute the checksum over the whole message and store it.
fn finish(mut msg: Vec<u8>) -> Vec<u8> {
    let cksum = checksum(&msg);
    msg[2..4].copy_from_slice(&cksum.to_be_bytes());
    msg
}
