//! Routing-table file loader (alternate configuration mode).
//!
//! One entry per line, whitespace-separated dotted quads plus an interface
//! name:
//!
//! ```text
//! DEST GATEWAY MASK INTERFACE_NAME
//! 192.168.1.0 10.0.0.2 255.255.255.0 eth0
//! ```
//!
//! Interface names are resolved against a router's interfaces only once the
//! configuration phase has delivered them all; until then entries stay raw.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::Ipv4Addr;
use std::path::Path;

use rudder_core::ctx::{ConfigError, RouterBuilder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RtableError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("routing table line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// One parsed line, interface still unresolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRoute {
    pub dest: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub iface_name: String,
}

/// Load and parse a routing-table file.
pub fn load(path: &Path) -> Result<Vec<RawRoute>, RtableError> {
    parse(BufReader::new(File::open(path)?))
}

/// Parse routing-table lines from any reader.  Blank lines are skipped.
pub fn parse<R: BufRead>(reader: R) -> Result<Vec<RawRoute>, RtableError> {
    let mut routes = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let mut fields = line.split_whitespace();
        let Some(dest) = fields.next() else {
            continue; // blank line
        };
        let (Some(gateway), Some(mask), Some(iface_name)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(parse_error(idx, "expected DEST GATEWAY MASK IFACE"));
        };
        if fields.next().is_some() {
            return Err(parse_error(idx, "trailing fields"));
        }
        routes.push(RawRoute {
            dest: parse_addr(idx, dest)?,
            gateway: parse_addr(idx, gateway)?,
            mask: parse_addr(idx, mask)?,
            iface_name: iface_name.to_string(),
        });
    }
    Ok(routes)
}

/// Replace `builder`'s routing table with `routes`, resolving interface
/// names.  File entries carry no metric; they all get zero.
pub fn apply(routes: &[RawRoute], builder: &mut RouterBuilder) -> Result<(), ConfigError> {
    builder.clear_routes();
    for route in routes {
        builder.add_route_by_name(route.dest, route.mask, route.gateway, 0, &route.iface_name)?;
    }
    Ok(())
}

fn parse_addr(idx: usize, field: &str) -> Result<Ipv4Addr, RtableError> {
    field
        .parse()
        .map_err(|_| parse_error(idx, &format!("cannot convert {field} to a valid IP")))
}

fn parse_error(idx: usize, reason: &str) -> RtableError {
    RtableError::Parse {
        line: idx + 1,
        reason: reason.to_string(),
    }
}
