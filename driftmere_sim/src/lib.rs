// driftmere_sim — the authoritative world simulation.
//
// Everything here is transport-agnostic: the server feeds key events in and
// asks for frames out, and the sim never learns what a socket is. The split:
//
// - `config.rs`:     data-driven tunables, loaded from JSON.
// - `input.rs`:      key codes, the pressed-key bitset, the movement table.
// - `names.rs`:      case-insensitive unique display-name registry.
// - `chat.rs`:       per-player history, bounded by count and game-time age.
// - `spatial.rs`:    the external spatial-index contract + linear-scan impl.
// - `player.rs`:     per-player state and the name-entry phase machine.
// - `visibility.rs`: camera clamping, fog, alpha falloff, chat radius.
// - `sim.rs`:        the `Simulator` — per-tick integration of all of it.
// - `game.rs`:       `GameHooks` + the shipped `ProximityWorld` renderer.
//
// Determinism matters here the same way it does in the terrain crate: player
// iteration is `BTreeMap` order, terrain queries go through one memoized
// generator, and chat expiry reads the sim's own game-time accumulator, so
// two servers fed the same event stream stay identical.

pub mod chat;
pub mod config;
pub mod game;
pub mod input;
pub mod names;
pub mod player;
pub mod sim;
pub mod spatial;
pub mod visibility;

pub use chat::{ChatEntry, ChatHistory};
pub use config::SimConfig;
pub use game::{GameHooks, ProximityWorld};
pub use names::{NameError, NameRegistry};
pub use player::{Player, PlayerPhase};
pub use sim::{Simulator, step_position};
pub use spatial::{EntityHandle, ScanIndex, Shape, SpatialIndex};
pub use visibility::{Camera, camera_for, chat_visible, distance, fog_factor, player_alpha};
