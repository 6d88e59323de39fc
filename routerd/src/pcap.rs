//! pcapng capture writer.
//!
//! Writes a Section Header Block, one Interface Description Block per router
//! interface, and an Enhanced Packet Block per frame.  Blocks are encoded in
//! host byte order; the byte-order magic in the section header tells readers
//! which end is up.  Every EPB carries a nanosecond timestamp
//! (`if_tsresol` = 9) and a direction flag (1 = inbound, 2 = outbound).

use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use rudder_wire::types::MacAddr;

const BLOCK_TYPE_SHB: u32 = 0x0A0D_0D0A;
const BLOCK_TYPE_IDB: u32 = 0x0000_0001;
const BLOCK_TYPE_EPB: u32 = 0x0000_0006;
const BYTEORDER_MAGIC: u32 = 0x1A2B_3C4D;
const PCAPNG_VERSION_MAJOR: u16 = 1;
const PCAPNG_VERSION_MINOR: u16 = 0;
const LINKTYPE_ETHERNET: u16 = 1;
const SNAPLEN: u32 = 65535;

const OPT_END: u16 = 0;
const OPT_IF_NAME: u16 = 2;
const OPT_IF_MACADDR: u16 = 6;
const OPT_IF_TSRESOL: u16 = 9;
const OPT_EPB_FLAGS: u16 = 2;

/// Direction flag stored in `epb_flags`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    fn flags(self) -> u32 {
        match self {
            Self::Inbound => 1,
            Self::Outbound => 2,
        }
    }
}

/// Streaming pcapng writer.  Interface IDs are handed out in registration
/// order, matching the `interface_id` field of later packet blocks.
pub struct PcapWriter<W: Write> {
    out: W,
    next_iface: u32,
}

impl<W: Write> PcapWriter<W> {
    /// Create a writer and emit the Section Header Block.
    pub fn new(out: W) -> io::Result<Self> {
        let mut writer = Self { out, next_iface: 0 };
        writer.write_section_header()?;
        Ok(writer)
    }

    fn write_section_header(&mut self) -> io::Result<()> {
        // Fixed-size block: 28 bytes including both length fields.
        let total: u32 = 28;
        let mut block = Vec::with_capacity(total as usize);
        block.extend_from_slice(&BLOCK_TYPE_SHB.to_ne_bytes());
        block.extend_from_slice(&total.to_ne_bytes());
        block.extend_from_slice(&BYTEORDER_MAGIC.to_ne_bytes());
        block.extend_from_slice(&PCAPNG_VERSION_MAJOR.to_ne_bytes());
        block.extend_from_slice(&PCAPNG_VERSION_MINOR.to_ne_bytes());
        block.extend_from_slice(&u64::MAX.to_ne_bytes()); // section length unknown
        block.extend_from_slice(&total.to_ne_bytes());
        self.out.write_all(&block)
    }

    /// Register an interface and return its pcapng interface ID.
    pub fn add_interface(&mut self, name: &str, mac: MacAddr) -> io::Result<u32> {
        let mut options = Vec::new();
        push_option(&mut options, OPT_IF_NAME, name.as_bytes());
        push_option(&mut options, OPT_IF_MACADDR, &mac.0);
        push_option(&mut options, OPT_IF_TSRESOL, &[9]); // nanoseconds
        push_option(&mut options, OPT_END, &[]);

        let total = (16 + options.len() + 4) as u32;
        let mut block = Vec::with_capacity(total as usize);
        block.extend_from_slice(&BLOCK_TYPE_IDB.to_ne_bytes());
        block.extend_from_slice(&total.to_ne_bytes());
        block.extend_from_slice(&LINKTYPE_ETHERNET.to_ne_bytes());
        block.extend_from_slice(&0u16.to_ne_bytes()); // reserved
        block.extend_from_slice(&SNAPLEN.to_ne_bytes());
        block.extend_from_slice(&options);
        block.extend_from_slice(&total.to_ne_bytes());
        self.out.write_all(&block)?;

        let id = self.next_iface;
        self.next_iface += 1;
        Ok(id)
    }

    /// Append one captured frame.
    pub fn write_frame(&mut self, iface: u32, dir: Direction, frame: &[u8]) -> io::Result<()> {
        let ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        let mut options = Vec::new();
        push_option(&mut options, OPT_EPB_FLAGS, &dir.flags().to_ne_bytes());
        push_option(&mut options, OPT_END, &[]);

        let total = (28 + padded_len(frame.len()) + options.len() + 4) as u32;
        let mut block = Vec::with_capacity(total as usize);
        block.extend_from_slice(&BLOCK_TYPE_EPB.to_ne_bytes());
        block.extend_from_slice(&total.to_ne_bytes());
        block.extend_from_slice(&iface.to_ne_bytes());
        block.extend_from_slice(&((ns >> 32) as u32).to_ne_bytes());
        block.extend_from_slice(&(ns as u32).to_ne_bytes());
        block.extend_from_slice(&(frame.len() as u32).to_ne_bytes());
        block.extend_from_slice(&(frame.len() as u32).to_ne_bytes());
        block.extend_from_slice(frame);
        block.resize(block.len() + pad_len(frame.len()), 0);
        block.extend_from_slice(&options);
        block.extend_from_slice(&total.to_ne_bytes());
        self.out.write_all(&block)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// Consume the writer and return the underlying sink.
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Append one option (code, length, value, padding to 32 bits).
fn push_option(buf: &mut Vec<u8>, code: u16, value: &[u8]) {
    buf.extend_from_slice(&code.to_ne_bytes());
    buf.extend_from_slice(&(value.len() as u16).to_ne_bytes());
    buf.extend_from_slice(value);
    buf.resize(buf.len() + pad_len(value.len()), 0);
}

fn pad_len(len: usize) -> usize {
    (4 - len % 4) % 4
}

fn padded_len(len: usize) -> usize {
    len + pad_len(len)
}
