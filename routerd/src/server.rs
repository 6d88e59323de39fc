//! Controller-facing TCP server.
//!
//! The server owns the listening socket and walks each controller connection
//! through three phases:
//!
//! 1. **Hello** — the controller opens with HELLO (To Router); we answer with
//!    HELLO (From Router).
//! 2. **Config** — ROUTERS declares the router count, then per router one
//!    ROUTER, its INTERFACE messages, and its RTABLE ENTRY messages, closed
//!    by END CONFIG.  IDs must be dense and zero-based; any inconsistency is
//!    fatal and the process exits nonzero.
//! 3. **Running** — ETHERNET FRAME messages flow both ways.  Frames with an
//!    out-of-range router or interface ID are logged and dropped.  A
//!    controller disconnect tears the routers down and returns the server to
//!    phase 1 for a fresh connection.
//!
//! The connection doubles as the router core's [`FrameSink`]: outbound frames
//! are validated, captured, and written back as ETHERNET FRAME (From Router).

use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use log::{error, info, warn};
use rudder_core::ctx::{IfaceId, Router, RouterBuilder};
use rudder_core::sink::FrameSink;
use rudder_core::{engine, timer};
use rudder_wire::ethernet::EthernetHeader;
use rudder_wire::{ETH_FRAME_MAX_LEN, ETH_HEADER_LEN};
use thiserror::Error;

use crate::framelog;
use crate::pcap::{Direction, PcapWriter};
use crate::proto::{self, Message, ProtoError, SUBTYPE_TO_ROUTER};
use crate::rtable::{self, RawRoute};

// =============================================================================
// Errors and outcomes
// =============================================================================

/// Fatal session error: the connection is torn down and the process exits
/// with a nonzero status.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Proto(#[from] ProtoError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<rudder_core::ctx::ConfigError> for ServerError {
    fn from(err: rudder_core::ctx::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// How a controller session ended.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The controller closed the connection; the server resets and waits for
    /// a new one.
    Disconnected,
    /// Process shutdown was requested; the accept loop should stop.
    ShutdownRequested,
}

// =============================================================================
// Server
// =============================================================================

pub struct Server {
    listener: TcpListener,
    capture: Option<PathBuf>,
    rtable_override: Option<Vec<RawRoute>>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    pub fn bind(
        port: u16,
        capture: Option<PathBuf>,
        rtable_override: Option<Vec<RawRoute>>,
        shutdown: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        info!("server: listening on port {port}");
        Ok(Self {
            listener,
            capture,
            rtable_override,
            shutdown,
        })
    }

    /// Accept controller connections until shutdown is requested or a fatal
    /// error occurs.
    pub fn run(&self) -> Result<(), ServerError> {
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return Ok(());
            }
            info!("server: waiting for connection from controller...");
            let (stream, peer) = match self.listener.accept() {
                Ok(pair) => pair,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            info!("server: controller connected from {peer}");
            let end = handle_connection(
                stream,
                self.capture.as_deref(),
                self.rtable_override.as_deref(),
                &self.shutdown,
            )?;
            match end {
                SessionEnd::Disconnected => {
                    info!("server: controller has disconnected");
                }
                SessionEnd::ShutdownRequested => {
                    info!("server: shutting down");
                    return Ok(());
                }
            }
        }
    }
}

// =============================================================================
// One controller session
// =============================================================================

/// Drive one controller connection through hello, config, and running.
pub(crate) fn handle_connection(
    stream: TcpStream,
    capture: Option<&Path>,
    rtable_override: Option<&[RawRoute]>,
    shutdown: &AtomicBool,
) -> Result<SessionEnd, ServerError> {
    let writer = Arc::new(Mutex::new(stream.try_clone()?));
    let mut reader = BufReader::new(stream);

    // Hello phase.
    match proto::read_message(&mut reader)? {
        None => return Ok(SessionEnd::Disconnected),
        Some(Message::Hello { subtype }) if subtype == SUBTYPE_TO_ROUTER => {
            proto::write_hello(&mut *lock(&writer))?;
        }
        Some(other) => {
            return Err(ServerError::Config(format!(
                "expected HELLO, got {other:?}"
            )));
        }
    }

    // Config phase.
    let Some(pending) = read_config(&mut reader)? else {
        return Ok(SessionEnd::Disconnected);
    };
    let running = start_running(pending, writer, capture, rtable_override)?;
    info!(
        "server: configuration complete, {} router(s) running",
        running.routers.len()
    );

    // Running phase.
    let end = run_frames(&mut reader, &running, shutdown);
    running.teardown();
    end
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Config phase
// =============================================================================

/// A router still being assembled, with the counts its ROUTER message
/// promised.
struct PendingRouter {
    builder: RouterBuilder,
    expected_interfaces: u8,
    expected_routes: u8,
    routes_received: u16,
}

/// Consume configuration messages until END CONFIG.  Returns `None` if the
/// controller disconnects mid-configuration.
fn read_config(
    reader: &mut impl io::BufRead,
) -> Result<Option<Vec<PendingRouter>>, ServerError> {
    let mut declared: Option<u8> = None;
    let mut pending: Vec<PendingRouter> = Vec::new();

    loop {
        let Some(msg) = proto::read_message(reader)? else {
            return Ok(None);
        };
        match msg {
            Message::Routers { count } => {
                if declared.is_some() {
                    return Err(ServerError::Config("duplicate ROUTERS message".into()));
                }
                if count == 0 {
                    return Err(ServerError::Config("controller declared zero routers".into()));
                }
                declared = Some(count);
            }
            Message::Router {
                id,
                num_interfaces,
                rtable_len,
                name,
            } => {
                let Some(total) = declared else {
                    return Err(ServerError::Config("ROUTER before ROUTERS".into()));
                };
                if usize::from(id) != pending.len() || id >= total {
                    return Err(ServerError::Config(format!(
                        "unexpected ROUTER message (router ID {id})"
                    )));
                }
                pending.push(PendingRouter {
                    builder: RouterBuilder::new(id, name),
                    expected_interfaces: num_interfaces,
                    expected_routes: rtable_len,
                    routes_received: 0,
                });
            }
            Message::Interface {
                router,
                id,
                mac,
                ip,
                name,
            } => {
                let entry = pending.get_mut(usize::from(router)).ok_or_else(|| {
                    ServerError::Config(format!("INTERFACE for invalid router ID {router}"))
                })?;
                if usize::from(id) != entry.builder.interface_count()
                    || id >= entry.expected_interfaces
                {
                    return Err(ServerError::Config(format!(
                        "unexpected INTERFACE message (interface ID {id})"
                    )));
                }
                entry.builder.add_interface(id, name, mac, ip);
            }
            Message::RtableEntry {
                router,
                iface,
                metric,
                dest,
                mask,
                gateway,
            } => {
                let entry = pending.get_mut(usize::from(router)).ok_or_else(|| {
                    ServerError::Config(format!("RTABLE ENTRY for invalid router ID {router}"))
                })?;
                if usize::from(iface) >= entry.builder.interface_count() {
                    return Err(ServerError::Config(format!(
                        "RTABLE ENTRY for invalid interface ID {iface}"
                    )));
                }
                entry
                    .builder
                    .add_route(dest, mask, gateway, metric, IfaceId(usize::from(iface)))?;
                entry.routes_received += 1;
            }
            Message::EndConfig => {
                let Some(total) = declared else {
                    return Err(ServerError::Config("END CONFIG before ROUTERS".into()));
                };
                if usize::from(total) != pending.len() {
                    return Err(ServerError::Config(format!(
                        "expected {total} routers but received {}",
                        pending.len()
                    )));
                }
                for entry in &pending {
                    if entry.builder.interface_count()
                        != usize::from(entry.expected_interfaces)
                    {
                        return Err(ServerError::Config(format!(
                            "router {}: expected {} interfaces but received {}",
                            entry.builder.name,
                            entry.expected_interfaces,
                            entry.builder.interface_count()
                        )));
                    }
                    if entry.routes_received != u16::from(entry.expected_routes) {
                        warn!(
                            "server: router {} declared {} routing table entries, received {}",
                            entry.builder.name, entry.expected_routes, entry.routes_received
                        );
                    }
                }
                return Ok(Some(pending));
            }
            other => {
                return Err(ServerError::Config(format!(
                    "unexpected message during configuration: {other:?}"
                )));
            }
        }
    }
}

// =============================================================================
// Running phase
// =============================================================================

struct Running {
    routers: Vec<Arc<Router>>,
    sink: Arc<ControllerSink>,
    timer_stop: Arc<AtomicBool>,
    timers: Vec<JoinHandle<()>>,
}

impl Running {
    /// Stop the timer tasks and flush the capture.  Withheld frames die with
    /// their routers.
    fn teardown(self) {
        self.timer_stop.store(true, Ordering::Relaxed);
        for handle in self.timers {
            let _ = handle.join();
        }
        if let Some(pcap) = &self.sink.pcap {
            if let Err(e) = lock(pcap).flush() {
                warn!("pcap: flush failed: {e}");
            }
        }
    }
}

/// Freeze the pending routers, set up capture, and start the timer tasks.
fn start_running(
    pending: Vec<PendingRouter>,
    writer: Arc<Mutex<TcpStream>>,
    capture: Option<&Path>,
    rtable_override: Option<&[RawRoute]>,
) -> Result<Running, ServerError> {
    let mut routers = Vec::with_capacity(pending.len());
    for mut entry in pending {
        if let Some(routes) = rtable_override {
            rtable::apply(routes, &mut entry.builder)?;
        }
        let router = entry.builder.build()?;
        router.log_config();
        routers.push(Arc::new(router));
    }

    let mut pcap = match capture {
        Some(path) => {
            info!("pcap: capturing to {}", path.display());
            Some(PcapWriter::new(BufWriter::new(File::create(path)?))?)
        }
        None => None,
    };
    let mut pcap_ids = Vec::with_capacity(routers.len());
    for router in &routers {
        let mut ids = Vec::with_capacity(router.interfaces().len());
        for iface in router.interfaces() {
            let id = match &mut pcap {
                Some(writer) => {
                    writer.add_interface(&format!("{}-{}", router.name, iface.name), iface.mac)?
                }
                None => 0,
            };
            ids.push(id);
        }
        pcap_ids.push(ids);
    }

    let sink = Arc::new(ControllerSink {
        writer,
        pcap: pcap.map(Mutex::new),
        pcap_ids,
    });

    let timer_stop = Arc::new(AtomicBool::new(false));
    let mut timers = Vec::with_capacity(routers.len());
    for router in &routers {
        let frame_sink: Arc<dyn FrameSink> = sink.clone();
        timers.push(timer::spawn_arp_timer(
            Arc::clone(router),
            frame_sink,
            Arc::clone(&timer_stop),
        )?);
    }

    Ok(Running {
        routers,
        sink,
        timer_stop,
        timers,
    })
}

/// Dispatch inbound frames until disconnect or shutdown.
fn run_frames(
    reader: &mut impl io::BufRead,
    running: &Running,
    shutdown: &AtomicBool,
) -> Result<SessionEnd, ServerError> {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return Ok(SessionEnd::ShutdownRequested);
        }
        let Some(msg) = proto::read_message(reader)? else {
            return Ok(SessionEnd::Disconnected);
        };
        let Message::Frame {
            router, iface, bytes, ..
        } = msg
        else {
            return Err(ServerError::Config(format!(
                "unexpected message in running state: {msg:?}"
            )));
        };

        let Some(ctx) = running.routers.get(usize::from(router)) else {
            error!("server: frame for invalid router ID {router}, dropping");
            continue;
        };
        let iface_id = IfaceId(usize::from(iface));
        let Some(ifc) = ctx.iface(iface_id) else {
            error!(
                "server: frame for invalid interface ID {iface} on router {}, dropping",
                ctx.name
            );
            continue;
        };

        framelog::inbound(ctx, ifc, &bytes);
        running.sink.capture(ctx, iface_id, Direction::Inbound, &bytes);
        engine::handle_frame(ctx, running.sink.as_ref(), iface_id, &bytes);
    }
}

// =============================================================================
// ControllerSink
// =============================================================================

/// The controller connection as seen by the router core: outbound frames are
/// validated, captured, and written back as ETHERNET FRAME messages.
struct ControllerSink {
    writer: Arc<Mutex<TcpStream>>,
    pcap: Option<Mutex<PcapWriter<BufWriter<File>>>>,
    /// pcapng interface IDs, indexed `[router.id][iface index]`.
    pcap_ids: Vec<Vec<u32>>,
}

impl ControllerSink {
    fn capture(&self, router: &Router, iface: IfaceId, dir: Direction, frame: &[u8]) {
        let Some(pcap) = &self.pcap else {
            return;
        };
        let id = self
            .pcap_ids
            .get(usize::from(router.id))
            .and_then(|ids| ids.get(iface.0))
            .copied()
            .unwrap_or(0);
        if let Err(e) = lock(pcap).write_frame(id, dir, frame) {
            warn!("pcap: frame write failed: {e}");
        }
    }
}

impl FrameSink for ControllerSink {
    fn send_frame(&self, router: &Router, iface_id: IfaceId, frame: &[u8]) -> io::Result<()> {
        let Some(iface) = router.iface(iface_id) else {
            error!("server: emission on unknown interface {iface_id}, dropping");
            return Ok(());
        };
        if frame.len() < ETH_HEADER_LEN {
            error!(
                "server: refusing to send a {}-byte frame on {} (shorter than an Ethernet header)",
                frame.len(),
                iface.name
            );
            return Ok(());
        }
        if frame.len() > ETH_FRAME_MAX_LEN {
            error!(
                "server: refusing to send a {}-byte frame on {} (larger than the Ethernet maximum)",
                frame.len(),
                iface.name
            );
            return Ok(());
        }
        match EthernetHeader::parse(frame) {
            Ok(eth) if eth.src != iface.mac => {
                error!(
                    "server: frame source {} does not match interface {} ({})",
                    eth.src, iface.name, iface.mac
                );
                return Ok(());
            }
            Err(_) => return Ok(()),
            Ok(_) => {}
        }

        framelog::outbound(router, iface, frame);
        self.capture(router, iface_id, Direction::Outbound, frame);

        let mut writer = lock(&self.writer);
        proto::write_frame(&mut *writer, router.id, iface.id, frame)?;
        writer.flush()
    }
}
