//! rudderd — a user-space IPv4 router driven by an external controller.
//!
//! The router binds a TCP port, waits for the controller to connect and push
//! its configuration (routers, interfaces, routing tables), then forwards the
//! Ethernet frames the controller injects.  See the `rudder-core` crate for
//! the data plane and `server` for the controller protocol.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Context;
use clap::{ArgAction, Parser};
use log::LevelFilter;

mod framelog;
mod pcap;
mod proto;
mod rtable;
mod server;

#[cfg(test)]
mod pcap_tests;
#[cfg(test)]
mod server_tests;

#[derive(Parser)]
#[command(name = "rudderd", about = "User-space IPv4 router driven by an external controller")]
struct Args {
    /// Port to listen on for the controller connection.
    #[arg(short, long, default_value_t = 23300)]
    port: u16,

    /// Write a pcapng capture of every frame to FILE.
    #[arg(short, long, value_name = "FILE")]
    capture: Option<PathBuf>,

    /// Replace controller-supplied routing tables with the entries in FILE
    /// (one `DEST GATEWAY MASK IFACE` line per entry).
    #[arg(short, long, value_name = "FILE")]
    rtable: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Error,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    // First signal asks for a cooperative stop at the next idle point; a
    // second one exits immediately.
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register_conditional_shutdown(signal, 130, Arc::clone(&shutdown))
            .context("could not register signal handler")?;
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .context("could not register signal handler")?;
    }

    let rtable_override = match &args.rtable {
        Some(path) => Some(
            rtable::load(path)
                .with_context(|| format!("could not load routing table {}", path.display()))?,
        ),
        None => None,
    };

    let server = server::Server::bind(args.port, args.capture, rtable_override, shutdown)
        .context("could not start server")?;
    server.run().context("controller session failed")?;
    Ok(())
}
