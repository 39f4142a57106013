// Session registry for the world server.
//
// `SessionRegistry` is the central connection-state structure that `server.rs`
// drives. It tracks every granted session: the TCP write half for signaling
// and fallback frame delivery, the pinned UDP return address once the data
// channel is negotiated, and the disconnect timestamp that starts the
// resumption grace period. All mutation happens through methods called from
// the server's single-threaded main loop — no internal locking.
//
// Session identity outlives the TCP connection: a drop detaches the write
// half but keeps the session (and its player) alive until the grace period
// elapses, so a reconnecting client presenting the same id resumes where it
// left off. The `server_instance_id` is minted once per process — a client
// that sees it change knows the whole deployment was replaced.
//
// Writing to client streams: the registry holds cloned `TcpStream` write
// halves wrapped in `BufWriter`. Write errors on a single client are logged
// but never crash the server — that client's reader thread will detect the
// broken pipe and report the disconnect.

use std::collections::BTreeMap;
use std::io::BufWriter;
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use driftmere_protocol::{ServerSignal, write_message};
use driftmere_terrain::hash::hash_coords;

struct ClientState {
    /// Signaling/fallback write half. `None` while detached (in grace).
    writer: Option<BufWriter<TcpStream>>,
    /// Pinned data-channel return address, set by the client's hello datagram.
    udp_addr: Option<SocketAddr>,
    /// When the connection dropped; starts the resumption grace clock.
    disconnected_at: Option<Instant>,
    /// Which attach (create or resume) owns the current write half. A
    /// disconnect report carrying an older generation came from a superseded
    /// connection and must not detach the live one.
    generation: u64,
}

/// All granted sessions, alive or in their resumption grace period.
pub struct SessionRegistry {
    instance_id: String,
    sessions: BTreeMap<String, ClientState>,
    udp_routes: BTreeMap<SocketAddr, String>,
    counter: u64,
    attach_counter: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            instance_id: String::new(),
            sessions: BTreeMap::new(),
            udp_routes: BTreeMap::new(),
            counter: 0,
            attach_counter: 0,
        };
        registry.instance_id = registry.fresh_id();
        registry
    }

    /// Identifies this server process. Changes on every restart.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Grant a fresh session over a new connection's write half.
    pub fn create(&mut self, stream: TcpStream) -> String {
        let id = self.fresh_id();
        self.attach_counter += 1;
        self.sessions.insert(
            id.clone(),
            ClientState {
                writer: Some(BufWriter::new(stream)),
                udp_addr: None,
                disconnected_at: None,
                generation: self.attach_counter,
            },
        );
        id
    }

    /// Reattach a known session to a new connection. Returns false if the id
    /// is unknown (expired or never granted) — the caller grants a fresh one.
    pub fn resume(&mut self, id: &str, stream: TcpStream) -> bool {
        self.attach_counter += 1;
        let generation = self.attach_counter;
        match self.sessions.get_mut(id) {
            Some(state) => {
                state.writer = Some(BufWriter::new(stream));
                state.disconnected_at = None;
                state.generation = generation;
                // The old data channel died with the old connection; the
                // client renegotiates and re-pins.
                if let Some(addr) = state.udp_addr.take() {
                    self.udp_routes.remove(&addr);
                }
                true
            }
            None => false,
        }
    }

    /// The generation of a session's current attach. 0 for unknown ids.
    pub fn generation(&self, id: &str) -> u64 {
        self.sessions.get(id).map_or(0, |s| s.generation)
    }

    /// A connection dropped: detach the write half and start the grace clock,
    /// keeping the session resumable. The reporting connection names the
    /// generation it attached under; if the session has since been resumed on
    /// a newer connection the report is stale and is ignored.
    pub fn detach(&mut self, id: &str, generation: u64) {
        if let Some(state) = self.sessions.get_mut(id) {
            if state.generation != generation {
                log::debug!("ignoring stale disconnect for session {id}");
                return;
            }
            state.writer = None;
            state.disconnected_at = Some(Instant::now());
            if let Some(addr) = state.udp_addr.take() {
                self.udp_routes.remove(&addr);
            }
        }
    }

    /// Remove every session whose grace period has elapsed. Returns the
    /// removed ids so the caller can destroy their players.
    pub fn expire_stale(&mut self, grace: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.disconnected_at.is_some_and(|t| t.elapsed() > grace))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.remove(id);
        }
        expired
    }

    /// Drop a session entirely.
    pub fn remove(&mut self, id: &str) {
        if let Some(state) = self.sessions.remove(id) {
            if let Some(addr) = state.udp_addr {
                self.udp_routes.remove(&addr);
            }
        }
    }

    /// Pin a session's data-channel return address.
    pub fn pin_udp(&mut self, id: &str, addr: SocketAddr) {
        if let Some(state) = self.sessions.get_mut(id) {
            if let Some(old) = state.udp_addr.replace(addr) {
                self.udp_routes.remove(&old);
            }
            self.udp_routes.insert(addr, id.to_string());
            log::info!("session {id} data channel pinned to {addr}");
        }
    }

    /// Which session, if any, owns a datagram's source address.
    pub fn session_for_datagram(&self, addr: SocketAddr) -> Option<&str> {
        self.udp_routes.get(&addr).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Sessions with a live connection (not detached).
    pub fn attached_ids(&self) -> Vec<String> {
        self.sessions
            .iter()
            .filter(|(_, s)| s.disconnected_at.is_none())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Send a signaling message over a session's reliable channel. Silently
    /// ignores write errors (the reader thread will detect the broken pipe).
    pub fn send_signal(&mut self, id: &str, signal: &ServerSignal) {
        let Some(state) = self.sessions.get_mut(id) else {
            return;
        };
        let Some(writer) = &mut state.writer else {
            return;
        };
        match serde_json::to_vec(signal) {
            Ok(json) => {
                if let Err(e) = write_message(writer, &json) {
                    log::debug!("signal write to {id} failed: {e}");
                }
            }
            Err(e) => log::error!("signal serialization failed: {e}"),
        }
    }

    /// Deliver a frame payload: a bare datagram when the data channel is
    /// pinned, a framed binary message on the reliable channel otherwise.
    pub fn send_frame(&mut self, udp: &UdpSocket, id: &str, payload: &[u8]) {
        let Some(state) = self.sessions.get_mut(id) else {
            return;
        };
        if let Some(addr) = state.udp_addr {
            if let Err(e) = udp.send_to(payload, addr) {
                log::debug!("frame datagram to {id} failed: {e}");
            }
            return;
        }
        if let Some(writer) = &mut state.writer {
            if let Err(e) = write_message(writer, payload) {
                log::debug!("frame write to {id} failed: {e}");
            }
        }
    }

    /// Mint an id no other call of this process has produced: a hash of the
    /// process clock and a monotonic counter, rendered as 16 hex digits.
    fn fresh_id(&mut self) -> String {
        self.counter += 1;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        format!(
            "{:016x}",
            hash_coords(u64::from(nanos), self.counter, 0, 0)
        )
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
