// Dual-transport server and main event loop.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections and sends `InternalEvent::NewConnection` to the main thread.
// - **Reader threads** (one per client): call `framing::read_message()` in a
//   loop. A payload starting with `{` is a JSON `ClientSignal`; anything else
//   is a binary input report. Both become events. On error/EOF, send
//   `InternalEvent::Disconnected`.
// - **UDP thread**: one shared data socket. Every received datagram becomes
//   `InternalEvent::Datagram` — the main thread decides whether it is a
//   session hello (pins the return address) or an input report.
// - **Main thread**: owns the game and the session registry, receives events
//   from the channel, and dispatches them. Uses `recv_timeout` with the tick
//   cadence as the timeout — when the timeout fires (no events waiting), it
//   runs the tick. This gives us a simple timer without a separate timer
//   thread.
//
// The main thread is the only writer to client streams and the only sender
// on the UDP socket. Reader threads only read. Per tick the main thread
// updates the sim once, then renders and sends one frame per attached
// session — datagram if the data channel is pinned, framed TCP otherwise.
//
// Shutdown: the main thread checks a `keep_running` flag (set to false by
// `ServerHandle::stop`) and breaks out of the event loop.

use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use driftmere_protocol::{
    ClientSignal, FrameBuilder, InputReport, ServerSignal, is_json_payload, read_message,
};
use driftmere_sim::{GameHooks, ProximityWorld, ScanIndex, SimConfig, Simulator};

use crate::session::SessionRegistry;

/// Events sent from listener/reader/UDP threads to the main thread.
enum InternalEvent {
    NewConnection {
        stream: TcpStream,
    },
    SignalFrom {
        session_id: String,
        signal: ClientSignal,
    },
    InputFrom {
        session_id: String,
        report: InputReport,
    },
    Datagram {
        addr: SocketAddr,
        bytes: Vec<u8>,
    },
    Disconnected {
        session_id: String,
        /// Attach generation of the reporting connection, so a disconnect
        /// from a superseded connection cannot detach a resumed session.
        generation: u64,
    },
}

/// Handle returned by `start_server` to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Signal the server to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a world server.
pub struct ServerConfig {
    pub port: u16,
    /// Data-channel socket port. 0 lets the OS pick; the bound port is
    /// announced to each client during negotiation.
    pub udp_port: u16,
    pub sim: SimConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 7878,
            udp_port: 0,
            sim: SimConfig::default(),
        }
    }
}

/// Start the server on a background thread. Returns a handle for stopping it
/// plus the bound TCP and UDP addresses (useful when port 0 lets the OS pick).
pub fn start_server(
    config: ServerConfig,
) -> std::io::Result<(ServerHandle, SocketAddr, SocketAddr)> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", config.port))?;
    let tcp_addr = listener.local_addr()?;
    let udp = UdpSocket::bind(format!("127.0.0.1:{}", config.udp_port))?;
    let udp_addr = udp.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    let thread = thread::spawn(move || {
        run_server(listener, udp, config, keep_running_clone);
    });

    Ok((
        ServerHandle {
            keep_running,
            thread: Some(thread),
        },
        tcp_addr,
        udp_addr,
    ))
}

/// Main server loop. Runs until `keep_running` is set to false.
fn run_server(
    listener: TcpListener,
    udp: UdpSocket,
    config: ServerConfig,
    keep_running: Arc<AtomicBool>,
) {
    let sim = Simulator::new(config.sim.clone(), Box::new(ScanIndex::new()));
    let mut game = ProximityWorld::new(sim);
    game.init();
    let mut registry = SessionRegistry::new();
    log::info!("server instance {} up", registry.instance_id());

    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    // Set the listener to non-blocking so the accept thread can check
    // keep_running periodically.
    listener.set_nonblocking(true).ok();

    // Listener thread: accepts new connections.
    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while keep_running_listener.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    stream.set_nonblocking(false).ok();
                    let _ = tx_listener.send(InternalEvent::NewConnection { stream });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(_) => break,
            }
        }
    });

    // UDP thread: receives data-channel traffic.
    let keep_running_udp = keep_running.clone();
    let tx_udp = tx.clone();
    let udp_reader = match udp.try_clone() {
        Ok(s) => s,
        Err(e) => {
            log::error!("cannot clone data socket: {e}");
            return;
        }
    };
    thread::spawn(move || {
        udp_reader
            .set_read_timeout(Some(Duration::from_millis(50)))
            .ok();
        let mut buf = [0u8; 2048];
        while keep_running_udp.load(Ordering::SeqCst) {
            match udp_reader.recv_from(&mut buf) {
                Ok((n, addr)) => {
                    let _ = tx_udp.send(InternalEvent::Datagram {
                        addr,
                        bytes: buf[..n].to_vec(),
                    });
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(_) => break,
            }
        }
    });

    let tick_duration = Duration::from_secs_f32(config.sim.tick_dt());
    let grace = Duration::from_secs_f64(config.sim.resume_grace);
    let udp_port = udp.local_addr().map(|a| a.port()).unwrap_or(0);
    let mut last_tick = Instant::now();

    // Main event loop.
    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(tick_duration) {
            Ok(event) => {
                handle_event(
                    &mut game,
                    &mut registry,
                    event,
                    &tx,
                    &keep_running,
                    udp_port,
                );
                // Drain any additional events that arrived during handling.
                while let Ok(event) = rx.try_recv() {
                    handle_event(
                        &mut game,
                        &mut registry,
                        event,
                        &tx,
                        &keep_running,
                        udp_port,
                    );
                }
                // A busy channel must not starve the tick.
                if last_tick.elapsed() >= tick_duration {
                    tick(&mut game, &mut registry, &udp, &config, grace);
                    last_tick = Instant::now();
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tick(&mut game, &mut registry, &udp, &config, grace);
                last_tick = Instant::now();
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// One tick: advance the game, reap expired sessions, render and deliver a
/// frame per attached session.
fn tick(
    game: &mut ProximityWorld,
    registry: &mut SessionRegistry,
    udp: &UdpSocket,
    config: &ServerConfig,
    grace: Duration,
) {
    game.update(config.sim.tick_dt());

    for id in registry.expire_stale(grace) {
        log::info!("session {id} grace expired, destroying player");
        game.on_disconnect(&id);
    }

    for id in registry.attached_ids() {
        let mut frame = FrameBuilder::new();
        game.draw(&id, &mut frame);
        if frame.is_empty() {
            continue;
        }
        match frame.finish() {
            Ok(payload) => registry.send_frame(udp, &id, &payload),
            Err(e) => log::error!("frame compression failed for {id}: {e}"),
        }
    }
}

/// Dispatch a single event.
fn handle_event(
    game: &mut ProximityWorld,
    registry: &mut SessionRegistry,
    event: InternalEvent,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
    udp_port: u16,
) {
    match event {
        InternalEvent::NewConnection { stream } => {
            handle_new_connection(game, registry, stream, tx, keep_running);
        }
        InternalEvent::SignalFrom { session_id, signal } => {
            handle_signal(registry, &session_id, signal, udp_port);
        }
        InternalEvent::InputFrom { session_id, report } => {
            game.on_input(&session_id, report.key_code, report.is_down);
        }
        InternalEvent::Datagram { addr, bytes } => {
            handle_datagram(game, registry, addr, &bytes);
        }
        InternalEvent::Disconnected {
            session_id,
            generation,
        } => {
            log::info!("session {session_id} detached, grace period running");
            registry.detach(&session_id, generation);
        }
    }
}

/// Handle a new TCP connection: read the JOIN handshake, grant or resume a
/// session, send WELCOME, and spawn a reader thread.
fn handle_new_connection(
    game: &mut ProximityWorld,
    registry: &mut SessionRegistry,
    stream: TcpStream,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    // Set a read timeout so the handshake doesn't block forever.
    stream.set_read_timeout(Some(Duration::from_secs(5))).ok();

    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });

    let join_bytes = match read_message(&mut reader) {
        Ok(bytes) => bytes,
        Err(_) => return,
    };

    let join: ClientSignal = match serde_json::from_slice(&join_bytes) {
        Ok(msg) => msg,
        Err(_) => return,
    };

    let ClientSignal::Join { session_id } = join else {
        // Expected JOIN as the first message — drop the connection.
        return;
    };

    let write_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    };

    // Resume when the presented token is still alive; otherwise grant fresh.
    let id = match session_id {
        Some(token) => {
            if registry.resume(&token, write_stream) {
                log::info!("session {token} resumed");
                token
            } else {
                // `resume` consumed the stale write half; clone another.
                let write_stream = match stream.try_clone() {
                    Ok(s) => s,
                    Err(_) => return,
                };
                let id = registry.create(write_stream);
                log::info!("token {token} not resumable, granted {id}");
                game.on_connect(&id);
                id
            }
        }
        None => {
            let id = registry.create(write_stream);
            log::info!("session {id} granted");
            game.on_connect(&id);
            id
        }
    };

    registry.send_signal(
        &id,
        &ServerSignal::Welcome {
            session_id: id.clone(),
            server_instance_id: registry.instance_id().to_string(),
        },
    );

    // Clear read timeout for the long-lived reader loop.
    stream.set_read_timeout(None).ok();

    let generation = registry.generation(&id);
    let tx_reader = tx.clone();
    let keep_running_reader = keep_running.clone();
    thread::spawn(move || {
        reader_loop(reader, id, generation, tx_reader, keep_running_reader);
    });
}

/// Reader loop for a single client. Runs in its own thread. Payloads are
/// JSON signals or binary input reports, discriminated by the first byte.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    session_id: String,
    generation: u64,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match read_message(&mut reader) {
            Ok(bytes) if is_json_payload(&bytes) => {
                match serde_json::from_slice::<ClientSignal>(&bytes) {
                    Ok(ClientSignal::Bye) => {
                        let _ = tx.send(InternalEvent::Disconnected {
                            session_id: session_id.clone(),
                            generation,
                        });
                        break;
                    }
                    Ok(signal) => {
                        let _ = tx.send(InternalEvent::SignalFrom {
                            session_id: session_id.clone(),
                            signal,
                        });
                    }
                    Err(_) => {
                        // Malformed signal — disconnect.
                        let _ = tx.send(InternalEvent::Disconnected {
                            session_id: session_id.clone(),
                            generation,
                        });
                        break;
                    }
                }
            }
            Ok(bytes) => match InputReport::decode(&bytes) {
                Some(report) => {
                    let _ = tx.send(InternalEvent::InputFrom {
                        session_id: session_id.clone(),
                        report,
                    });
                }
                None => {
                    log::debug!("ignoring {}-byte binary payload from {session_id}", bytes.len());
                }
            },
            Err(_) => {
                // Read error or EOF — disconnect.
                let _ = tx.send(InternalEvent::Disconnected {
                    session_id: session_id.clone(),
                    generation,
                });
                break;
            }
        }
    }
}

/// Handle a signaling message that isn't JOIN or BYE (those are handled
/// during connection setup and in the reader loop respectively).
fn handle_signal(
    registry: &mut SessionRegistry,
    session_id: &str,
    signal: ClientSignal,
    udp_port: u16,
) {
    match signal {
        ClientSignal::Offer { sdp } => {
            // The offer names the client's data socket; we don't dial it —
            // the client's hello datagram will pin the return address. Answer
            // with our socket so the client knows where to send.
            log::debug!("offer from {session_id}: {sdp}");
            registry.send_signal(
                session_id,
                &ServerSignal::Answer {
                    sdp: format!("udp:{udp_port}"),
                },
            );
            registry.send_signal(
                session_id,
                &ServerSignal::Candidate {
                    candidate: format!("127.0.0.1:{udp_port}"),
                    sdp_mid: "data".into(),
                    sdp_mline_index: 0,
                },
            );
        }
        ClientSignal::Answer { sdp } => {
            // The bundled server always answers, never offers.
            log::debug!("unexpected answer from {session_id}: {sdp}");
        }
        ClientSignal::Candidate { candidate, .. } => {
            log::debug!("candidate from {session_id}: {candidate}");
        }
        ClientSignal::Join { .. } | ClientSignal::Bye => {
            // JOIN is handled during connection setup, BYE in the reader loop.
        }
    }
}

/// Handle a datagram on the data socket. The first datagram from a client is
/// its session-id hello, which pins the return address; everything after is
/// input reports.
fn handle_datagram(
    game: &mut ProximityWorld,
    registry: &mut SessionRegistry,
    addr: SocketAddr,
    bytes: &[u8],
) {
    if let Some(id) = registry.session_for_datagram(addr) {
        let id = id.to_string();
        match InputReport::decode(bytes) {
            Some(report) => game.on_input(&id, report.key_code, report.is_down),
            None => log::debug!("ignoring {}-byte datagram from {id}", bytes.len()),
        }
        return;
    }
    // Unrouted source: only a hello naming a live session may pin it.
    match std::str::from_utf8(bytes) {
        Ok(id) if registry.contains(id) => {
            let id = id.to_string();
            registry.pin_udp(&id, addr);
        }
        _ => log::debug!("ignoring datagram from unknown source {addr}"),
    }
}
