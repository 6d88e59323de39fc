//! Controller wire protocol.
//!
//! The controller and the router exchange length-delimited binary messages
//! over TCP:
//!
//! ```text
//!  ------------------------------------------------------      ---
//! |   Type   |  Subtype  |  Payload Length  |   Payload           |
//! | (1 byte) |  (1 byte) |    (2 bytes)     |  (N bytes)   ...    |
//!  ------------------------------------------------------      ---
//! ```
//!
//! All integers are big-endian.  The configuration phase carries ROUTERS /
//! ROUTER / INTERFACE / RTABLE ENTRY / END CONFIG; the running phase carries
//! ETHERNET FRAME in both directions, tagged with dense zero-based router and
//! interface IDs.

use std::io::{self, ErrorKind, Read, Write};
use std::net::Ipv4Addr;

use rudder_wire::ETH_FRAME_MAX_LEN;
use rudder_wire::types::MacAddr;
use thiserror::Error;

pub const MSG_HELLO: u8 = 1;
pub const MSG_ROUTERS: u8 = 2;
pub const MSG_ROUTER: u8 = 3;
pub const MSG_INTERFACE: u8 = 4;
pub const MSG_RTABLE_ENTRY: u8 = 5;
pub const MSG_END_CONFIG: u8 = 6;
pub const MSG_ETHERNET_FRAME: u8 = 7;

pub const SUBTYPE_NONE: u8 = 0;
pub const SUBTYPE_FROM_ROUTER: u8 = 1;
pub const SUBTYPE_TO_ROUTER: u8 = 2;

pub const MAX_ROUTER_NAMELEN: usize = 8;
pub const MAX_IFACE_NAMELEN: usize = 32;

/// Controller protocol decode failure.  Any of these tears the connection
/// down; the protocol has no way to resynchronize.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("unknown message type {0}")]
    UnknownType(u8),
    #[error("message type {msg_type} with bad payload length {len}")]
    BadLength { msg_type: u8, len: usize },
    #[error("message name field is empty, oversized, or not UTF-8")]
    BadName,
}

/// A decoded controller message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Hello {
        subtype: u8,
    },
    Routers {
        count: u8,
    },
    Router {
        id: u8,
        num_interfaces: u8,
        rtable_len: u8,
        name: String,
    },
    Interface {
        router: u8,
        id: u8,
        mac: MacAddr,
        ip: Ipv4Addr,
        name: String,
    },
    RtableEntry {
        router: u8,
        iface: u8,
        metric: u16,
        dest: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
    },
    EndConfig,
    Frame {
        subtype: u8,
        router: u8,
        iface: u8,
        bytes: Vec<u8>,
    },
}

impl Message {
    /// Serialize to the full wire form (header + payload).
    pub fn encode(&self) -> Vec<u8> {
        let (msg_type, subtype, payload) = match self {
            Message::Hello { subtype } => (MSG_HELLO, *subtype, Vec::new()),
            Message::Routers { count } => (MSG_ROUTERS, SUBTYPE_NONE, vec![*count]),
            Message::Router {
                id,
                num_interfaces,
                rtable_len,
                name,
            } => {
                let mut payload = vec![*id, *num_interfaces, *rtable_len];
                payload.extend_from_slice(name.as_bytes());
                (MSG_ROUTER, SUBTYPE_NONE, payload)
            }
            Message::Interface {
                router,
                id,
                mac,
                ip,
                name,
            } => {
                let mut payload = vec![*router, *id];
                payload.extend_from_slice(&mac.0);
                payload.extend_from_slice(&ip.octets());
                payload.extend_from_slice(name.as_bytes());
                (MSG_INTERFACE, SUBTYPE_NONE, payload)
            }
            Message::RtableEntry {
                router,
                iface,
                metric,
                dest,
                mask,
                gateway,
            } => {
                let mut payload = vec![*router, *iface];
                payload.extend_from_slice(&metric.to_be_bytes());
                payload.extend_from_slice(&dest.octets());
                payload.extend_from_slice(&mask.octets());
                payload.extend_from_slice(&gateway.octets());
                (MSG_RTABLE_ENTRY, SUBTYPE_NONE, payload)
            }
            Message::EndConfig => (MSG_END_CONFIG, SUBTYPE_NONE, Vec::new()),
            Message::Frame {
                subtype,
                router,
                iface,
                bytes,
            } => {
                let mut payload = vec![*router, *iface];
                payload.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                payload.extend_from_slice(bytes);
                (MSG_ETHERNET_FRAME, *subtype, payload)
            }
        };
        let mut wire = Vec::with_capacity(4 + payload.len());
        wire.push(msg_type);
        wire.push(subtype);
        wire.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        wire.extend_from_slice(&payload);
        wire
    }
}

/// Read one message.  Returns `None` on a clean end-of-stream at a message
/// boundary; an EOF mid-message is an error.
pub fn read_message(reader: &mut impl Read) -> Result<Option<Message>, ProtoError> {
    let mut header = [0u8; 4];
    if !fill_or_eof(reader, &mut header)? {
        return Ok(None);
    }
    let payload_len = usize::from(u16::from_be_bytes([header[2], header[3]]));
    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload)?;
    decode(header[0], header[1], &payload).map(Some)
}

/// Send the HELLO (From Router) handshake reply.
pub fn write_hello(writer: &mut impl Write) -> io::Result<()> {
    let msg = Message::Hello {
        subtype: SUBTYPE_FROM_ROUTER,
    };
    writer.write_all(&msg.encode())
}

/// Send an outbound Ethernet frame as ETHERNET FRAME (From Router).
pub fn write_frame(writer: &mut impl Write, router: u8, iface: u8, frame: &[u8]) -> io::Result<()> {
    let msg = Message::Frame {
        subtype: SUBTYPE_FROM_ROUTER,
        router,
        iface,
        bytes: frame.to_vec(),
    };
    writer.write_all(&msg.encode())
}

// =============================================================================
// Decoding
// =============================================================================

fn decode(msg_type: u8, subtype: u8, payload: &[u8]) -> Result<Message, ProtoError> {
    let bad_len = || ProtoError::BadLength {
        msg_type,
        len: payload.len(),
    };
    match msg_type {
        MSG_HELLO => {
            if !payload.is_empty() {
                return Err(bad_len());
            }
            Ok(Message::Hello { subtype })
        }
        MSG_ROUTERS => {
            if payload.len() != 1 {
                return Err(bad_len());
            }
            Ok(Message::Routers { count: payload[0] })
        }
        MSG_ROUTER => {
            if payload.len() < 4 {
                return Err(bad_len());
            }
            Ok(Message::Router {
                id: payload[0],
                num_interfaces: payload[1],
                rtable_len: payload[2],
                name: parse_name(&payload[3..], MAX_ROUTER_NAMELEN)?,
            })
        }
        MSG_INTERFACE => {
            if payload.len() < 13 {
                return Err(bad_len());
            }
            Ok(Message::Interface {
                router: payload[0],
                id: payload[1],
                mac: MacAddr([
                    payload[2], payload[3], payload[4], payload[5], payload[6], payload[7],
                ]),
                ip: Ipv4Addr::new(payload[8], payload[9], payload[10], payload[11]),
                name: parse_name(&payload[12..], MAX_IFACE_NAMELEN)?,
            })
        }
        MSG_RTABLE_ENTRY => {
            if payload.len() != 16 {
                return Err(bad_len());
            }
            Ok(Message::RtableEntry {
                router: payload[0],
                iface: payload[1],
                metric: u16::from_be_bytes([payload[2], payload[3]]),
                dest: Ipv4Addr::new(payload[4], payload[5], payload[6], payload[7]),
                mask: Ipv4Addr::new(payload[8], payload[9], payload[10], payload[11]),
                gateway: Ipv4Addr::new(payload[12], payload[13], payload[14], payload[15]),
            })
        }
        MSG_END_CONFIG => {
            if !payload.is_empty() {
                return Err(bad_len());
            }
            Ok(Message::EndConfig)
        }
        MSG_ETHERNET_FRAME => {
            if payload.len() < 4 {
                return Err(bad_len());
            }
            let frame_len = usize::from(u16::from_be_bytes([payload[2], payload[3]]));
            if payload.len() != 4 + frame_len || frame_len > ETH_FRAME_MAX_LEN {
                return Err(bad_len());
            }
            Ok(Message::Frame {
                subtype,
                router: payload[0],
                iface: payload[1],
                bytes: payload[4..].to_vec(),
            })
        }
        other => Err(ProtoError::UnknownType(other)),
    }
}

fn parse_name(bytes: &[u8], max: usize) -> Result<String, ProtoError> {
    if bytes.is_empty() || bytes.len() > max {
        return Err(ProtoError::BadName);
    }
    String::from_utf8(bytes.to_vec()).map_err(|_| ProtoError::BadName)
}

/// Fill `buf` completely, retrying interrupted reads.  Returns `false` if the
/// stream ended before the first byte.
fn fill_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool, ProtoError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(ProtoError::Io(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "stream ended mid-message",
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}
