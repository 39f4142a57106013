// driftmere_server — the authoritative Driftmere world server.
//
// The server owns the whole game: it runs the simulation, renders a frame
// per client per tick, and relays nothing — clients send raw input and
// receive drawn frames. Two transports serve each client: a reliable TCP
// signaling channel (JOIN/WELCOME handshake, data-channel negotiation, frame
// fallback) and an unreliable UDP data channel for the steady-state frame
// and input traffic once negotiated.
//
// Module overview:
// - `session.rs`: `SessionRegistry` — session grants, resumption grace,
//                 pinned UDP routes, the per-client write halves. The core
//                 data structure that `server.rs` drives.
// - `server.rs`:  TCP listener, reader threads (one per client), the shared
//                 UDP socket, and the main event loop. Uses `std::net` with
//                 a thread-per-reader architecture and an `mpsc` channel to
//                 funnel events into the single-threaded tick loop.
//
// Dependencies: `driftmere_protocol` (framing, signals, frames, input),
// `driftmere_sim` (the game), `driftmere_terrain` (id hashing).
//
// The server can run as a standalone binary (`main.rs`) or be embedded in a
// test harness via the library API (`start_server`).

pub mod server;
pub mod session;

pub use server::{ServerConfig, ServerHandle, start_server};
