// Dual-transport client session with automatic reconnection.
//
// Architecture mirrors the server: blocking reads live on background threads,
// and one session thread owns the connection lifecycle.
//
// - `TransportSession::connect()` spawns the session thread and returns
//   immediately; the application talks to it through two channels — commands
//   in (`send_input`, `close`), `TransportEvent`s out (`poll`).
// - The session thread runs the reconnect loop: TCP connect, JOIN/WELCOME
//   handshake, optional data-channel negotiation, then the steady-state
//   multiplexing loop. A lost connection re-enters the loop after an
//   exponential backoff; retries continue until the application closes the
//   session.
// - Per connection, a TCP reader thread (and a UDP reader thread once the
//   data socket exists) funnel incoming payloads into one internal channel.
//
// Session identity: the WELCOME's `session_id` is kept as the resumption
// token and presented on the next JOIN, so a reconnect within the server's
// grace period gets the same player back. The token is taken (not copied)
// when presented — a handshake that dies before WELCOME does not retry a
// token the server may have consumed.
//
// The WELCOME also carries `server_instance_id`. If it differs from the one
// seen at first connect, the server process was replaced and every assumption
// about world and session state is void: the session emits `ReloadRequired`
// and stops. Reconnecting is the application's job after a full restart.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpStream, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use driftmere_protocol::{
    ClientSignal, InputReport, ServerSignal, is_json_payload, read_message, write_message,
};

use crate::backoff::Backoff;

/// Lifecycle of the transport, reported via `TransportEvent::StatusChanged`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    /// Not yet started.
    Idle,
    /// TCP connect + handshake in progress.
    Connecting,
    /// Signaling channel up, WELCOME received.
    SignalingOpen,
    /// Data-channel offer sent, waiting for the answer.
    Negotiating,
    /// Data channel negotiated and pinned; frames and input ride UDP.
    DataChannelOpen,
    /// Data channel unavailable; everything rides the signaling channel.
    SignalingOnly,
    /// Session over — closed by the application or by `ReloadRequired`.
    Closed,
}

/// Events delivered to the application via `poll()`.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    StatusChanged(TransportState),
    /// A session was granted or resumed under this id.
    SessionEstablished { session_id: String },
    /// One complete frame payload (still compressed).
    Frame(Vec<u8>),
    /// The server instance changed across a reconnect. The session has
    /// stopped; the application must fully reload.
    ReloadRequired,
}

pub struct TransportConfig {
    /// Server signaling address, e.g. `127.0.0.1:7878`.
    pub server_addr: String,
    /// Whether to negotiate the UDP data channel. Off means the signaling
    /// channel carries everything.
    pub use_data_channel: bool,
    pub backoff_base: Duration,
    pub backoff_multiplier: f64,
    pub backoff_cap: Duration,
    /// How long to wait for the negotiation answer before falling back to
    /// signaling-only delivery.
    pub negotiation_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:7878".into(),
            use_data_channel: true,
            backoff_base: Duration::from_millis(250),
            backoff_multiplier: 2.0,
            backoff_cap: Duration::from_secs(10),
            negotiation_timeout: Duration::from_secs(3),
        }
    }
}

enum Command {
    SendInput(InputReport),
    Close,
}

/// Payloads funneled from the per-connection reader threads.
enum ConnEvent {
    Tcp(Vec<u8>),
    Udp(Vec<u8>),
    ReaderClosed,
}

/// How one connection attempt ended.
enum ConnectionEnd {
    /// Connection lost; retry. `established` is true if WELCOME arrived.
    Lost { established: bool },
    /// Application asked to close.
    UserClosed,
    /// Server instance changed; do not retry.
    Reload,
}

/// A live (or reconnecting) client session.
pub struct TransportSession {
    cmd_tx: Sender<Command>,
    events: Receiver<TransportEvent>,
    thread: Option<JoinHandle<()>>,
}

impl TransportSession {
    /// Spawn the session thread. Returns immediately; connection progress
    /// arrives as `StatusChanged` events.
    pub fn connect(config: TransportConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let thread = thread::spawn(move || {
            run_session(config, &cmd_rx, &event_tx);
        });
        Self {
            cmd_tx,
            events: event_rx,
            thread: Some(thread),
        }
    }

    /// Drain all queued events (non-blocking).
    pub fn poll(&self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Block until the next event or the timeout elapses.
    pub fn wait_event(&self, timeout: Duration) -> Option<TransportEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Queue an input report for delivery. Reports sent while disconnected
    /// are dropped — key state is resent naturally by the next transition.
    pub fn send_input(&self, report: InputReport) {
        let _ = self.cmd_tx.send(Command::SendInput(report));
    }

    /// Close the session: BYE if connected, then stop the session thread.
    pub fn close(&mut self) {
        let _ = self.cmd_tx.send(Command::Close);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Close);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// The reconnect loop. Owns the resumption token and the remembered server
/// instance id across connection attempts.
fn run_session(
    config: TransportConfig,
    cmd_rx: &Receiver<Command>,
    events: &Sender<TransportEvent>,
) {
    let mut backoff = Backoff::new(
        config.backoff_base,
        config.backoff_multiplier,
        config.backoff_cap,
    );
    let mut resume_token: Option<String> = None;
    let mut instance_id: Option<String> = None;

    'reconnect: loop {
        let _ = events.send(TransportEvent::StatusChanged(TransportState::Connecting));
        match run_connection(&config, cmd_rx, events, &mut resume_token, &mut instance_id) {
            ConnectionEnd::UserClosed => break,
            ConnectionEnd::Reload => {
                let _ = events.send(TransportEvent::ReloadRequired);
                break;
            }
            ConnectionEnd::Lost { established } => {
                if established {
                    backoff.reset();
                }
                let delay = backoff.next_delay();
                log::info!("connection lost, retrying in {delay:?}");
                // Sleep, but stay responsive to Close.
                let deadline = Instant::now() + delay;
                loop {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    match cmd_rx.recv_timeout(remaining) {
                        Ok(Command::Close) | Err(RecvTimeoutError::Disconnected) => {
                            break 'reconnect;
                        }
                        Ok(Command::SendInput(_)) => {} // dropped while offline
                        Err(RecvTimeoutError::Timeout) => break,
                    }
                }
            }
        }
    }
    let _ = events.send(TransportEvent::StatusChanged(TransportState::Closed));
}

/// One connection: handshake, optional negotiation, steady-state multiplex.
fn run_connection(
    config: &TransportConfig,
    cmd_rx: &Receiver<Command>,
    events: &Sender<TransportEvent>,
    resume_token: &mut Option<String>,
    instance_id: &mut Option<String>,
) -> ConnectionEnd {
    let stream = match TcpStream::connect(&config.server_addr) {
        Ok(s) => s,
        Err(e) => {
            log::debug!("connect to {} failed: {e}", config.server_addr);
            return ConnectionEnd::Lost { established: false };
        }
    };
    stream.set_read_timeout(Some(Duration::from_secs(5))).ok();

    let mut writer = match stream.try_clone() {
        Ok(s) => BufWriter::new(s),
        Err(_) => return ConnectionEnd::Lost { established: false },
    };
    let mut reader = match stream.try_clone() {
        Ok(s) => BufReader::new(s),
        Err(_) => return ConnectionEnd::Lost { established: false },
    };

    // JOIN, presenting (and thereby consuming) any resumption token.
    let join = ClientSignal::Join {
        session_id: resume_token.take(),
    };
    if send_signal(&mut writer, &join).is_err() {
        return ConnectionEnd::Lost { established: false };
    }

    // WELCOME.
    let welcome_bytes = match read_message(&mut reader) {
        Ok(b) => b,
        Err(e) => {
            log::debug!("handshake read failed: {e}");
            return ConnectionEnd::Lost { established: false };
        }
    };
    let (session_id, server_instance) =
        match serde_json::from_slice::<ServerSignal>(&welcome_bytes) {
            Ok(ServerSignal::Welcome {
                session_id,
                server_instance_id,
            }) => (session_id, server_instance_id),
            Ok(other) => {
                log::warn!("expected WELCOME, got {other:?}");
                return ConnectionEnd::Lost { established: false };
            }
            Err(e) => {
                log::warn!("malformed WELCOME: {e}");
                return ConnectionEnd::Lost { established: false };
            }
        };

    if let Some(known) = instance_id.as_deref() {
        if known != server_instance {
            log::warn!("server instance changed ({known} -> {server_instance})");
            return ConnectionEnd::Reload;
        }
    }
    *instance_id = Some(server_instance);
    *resume_token = Some(session_id.clone());
    let _ = events.send(TransportEvent::SessionEstablished {
        session_id: session_id.clone(),
    });
    let _ = events.send(TransportEvent::StatusChanged(TransportState::SignalingOpen));

    stream.set_read_timeout(None).ok();

    // Per-connection reader threads share one internal channel and a
    // liveness flag checked by the UDP reader.
    let (conn_tx, conn_rx) = mpsc::channel();
    let conn_alive = Arc::new(AtomicBool::new(true));

    let tcp_tx = conn_tx.clone();
    thread::spawn(move || {
        while let Ok(bytes) = read_message(&mut reader) {
            if tcp_tx.send(ConnEvent::Tcp(bytes)).is_err() {
                return;
            }
        }
        let _ = tcp_tx.send(ConnEvent::ReaderClosed);
    });

    // Data-channel negotiation.
    let mut udp: Option<UdpSocket> = None;
    let mut server_udp: Option<SocketAddr> = None;
    let mut negotiation_deadline: Option<Instant> = None;
    if config.use_data_channel {
        match UdpSocket::bind("127.0.0.1:0") {
            Ok(sock) => {
                let port = sock.local_addr().map(|a| a.port()).unwrap_or(0);
                let offer = ClientSignal::Offer {
                    sdp: format!("udp:{port}"),
                };
                if send_signal(&mut writer, &offer).is_err() {
                    return finish(ConnectionEnd::Lost { established: true }, &stream, &conn_alive);
                }
                let _ = events.send(TransportEvent::StatusChanged(TransportState::Negotiating));
                negotiation_deadline = Some(Instant::now() + config.negotiation_timeout);

                if let Ok(udp_reader) = sock.try_clone() {
                    let udp_tx = conn_tx.clone();
                    let alive = conn_alive.clone();
                    thread::spawn(move || {
                        udp_reader
                            .set_read_timeout(Some(Duration::from_millis(50)))
                            .ok();
                        let mut buf = [0u8; 65536];
                        while alive.load(Ordering::SeqCst) {
                            match udp_reader.recv_from(&mut buf) {
                                Ok((n, _from)) => {
                                    if udp_tx.send(ConnEvent::Udp(buf[..n].to_vec())).is_err() {
                                        return;
                                    }
                                }
                                Err(ref e)
                                    if e.kind() == std::io::ErrorKind::WouldBlock
                                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                                Err(_) => return,
                            }
                        }
                    });
                }
                udp = Some(sock);
            }
            Err(e) => {
                log::warn!("data socket bind failed, staying on signaling: {e}");
                let _ = events.send(TransportEvent::StatusChanged(TransportState::SignalingOnly));
            }
        }
    } else {
        let _ = events.send(TransportEvent::StatusChanged(TransportState::SignalingOnly));
    }

    let mut data_open = false;

    // Steady state: multiplex commands, signals, frames.
    loop {
        loop {
            match cmd_rx.try_recv() {
                Ok(Command::Close) => {
                    let _ = send_signal(&mut writer, &ClientSignal::Bye);
                    return finish(ConnectionEnd::UserClosed, &stream, &conn_alive);
                }
                Ok(Command::SendInput(report)) => {
                    let sent = if data_open {
                        match (&udp, server_udp) {
                            (Some(sock), Some(addr)) => sock.send_to(&report.encode(), addr).is_ok(),
                            _ => false,
                        }
                    } else {
                        write_message(&mut writer, &report.encode()).is_ok()
                    };
                    if !sent {
                        log::debug!("input report dropped");
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return finish(ConnectionEnd::UserClosed, &stream, &conn_alive);
                }
            }
        }

        // Negotiation that never completes falls back to signaling-only.
        if let Some(deadline) = negotiation_deadline {
            if Instant::now() >= deadline {
                negotiation_deadline = None;
                log::warn!("data-channel negotiation timed out, staying on signaling");
                let _ = events.send(TransportEvent::StatusChanged(TransportState::SignalingOnly));
            }
        }

        match conn_rx.recv_timeout(Duration::from_millis(20)) {
            Ok(ConnEvent::Tcp(bytes)) if is_json_payload(&bytes) => {
                match serde_json::from_slice::<ServerSignal>(&bytes) {
                    Ok(ServerSignal::Answer { sdp }) => {
                        if let Some(addr) = answer_addr(&config.server_addr, &sdp) {
                            if let Some(sock) = &udp {
                                // Hello datagram pins our return address
                                // server-side; frames switch to UDP.
                                let _ = sock.send_to(session_id.as_bytes(), addr);
                                server_udp = Some(addr);
                                data_open = true;
                                negotiation_deadline = None;
                                let _ = events.send(TransportEvent::StatusChanged(
                                    TransportState::DataChannelOpen,
                                ));
                            }
                        } else {
                            log::warn!("unintelligible answer sdp: {sdp}");
                        }
                    }
                    Ok(ServerSignal::Candidate { candidate, .. }) => {
                        log::debug!("candidate: {candidate}");
                    }
                    Ok(ServerSignal::Welcome { .. }) => {
                        log::debug!("unexpected mid-stream WELCOME");
                    }
                    Err(e) => log::debug!("malformed signal: {e}"),
                }
            }
            Ok(ConnEvent::Tcp(bytes)) | Ok(ConnEvent::Udp(bytes)) => {
                let _ = events.send(TransportEvent::Frame(bytes));
            }
            Ok(ConnEvent::ReaderClosed) => {
                return finish(
                    ConnectionEnd::Lost { established: true },
                    &stream,
                    &conn_alive,
                );
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return finish(
                    ConnectionEnd::Lost { established: true },
                    &stream,
                    &conn_alive,
                );
            }
        }
    }
}

/// Tear down a connection's reader threads before returning its outcome.
fn finish(end: ConnectionEnd, stream: &TcpStream, conn_alive: &Arc<AtomicBool>) -> ConnectionEnd {
    conn_alive.store(false, Ordering::SeqCst);
    let _ = stream.shutdown(Shutdown::Both);
    end
}

fn send_signal(writer: &mut BufWriter<TcpStream>, signal: &ClientSignal) -> std::io::Result<()> {
    let json = serde_json::to_vec(signal)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    write_message(writer, &json)
}

/// Resolve an ANSWER's `udp:<port>` against the signaling host.
fn answer_addr(server_addr: &str, sdp: &str) -> Option<SocketAddr> {
    let port: u16 = sdp.strip_prefix("udp:")?.parse().ok()?;
    let host = server_addr.rsplit_once(':')?.0;
    format!("{host}:{port}").parse().ok()
}
