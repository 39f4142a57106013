// The proximity simulator — per-tick player integration.
//
// `Simulator` owns everything that changes during a tick: the player table,
// the name registry, the terrain generator, the spatial-index handles, and
// the monotonic game-time accumulator. All mutation happens through its
// methods, called from the server's single-threaded main loop — no internal
// locking, no concurrent external mutation during a tick.
//
// Movement is commit-or-nothing: a velocity is derived from the input bitset
// (arrows and WASD are one table, see `input.rs`), diagonals are normalized
// to unit speed, the candidate position is clamped to world bounds, and the
// move happens only if the destination tile is passable. No sliding along
// walls, no partial moves.
//
// Keyboard routing is phase-dependent: name entry and chat composition
// capture printable keys into buffers; movement only applies to an Active,
// non-composing player. A rejected name (taken, empty, too long) becomes
// per-player error text and never escapes the tick loop.

use std::collections::BTreeMap;

use driftmere_terrain::Generator;

use crate::config::SimConfig;
use crate::input::{KEY_BACKSPACE, KEY_ENTER, key_to_char, movement_axes};
use crate::names::NameRegistry;
use crate::player::{Player, PlayerPhase};
use crate::spatial::{Shape, SpatialIndex};

/// Collision radius registered for each player entity.
const PLAYER_RADIUS: f32 = 10.0;

/// How far (in tiles) the spawn scan spirals out before giving up on finding
/// passable ground near the world center.
const SPAWN_SCAN_RADIUS: i32 = 64;

pub struct Simulator {
    pub(crate) config: SimConfig,
    pub(crate) terrain: Generator,
    pub(crate) players: BTreeMap<String, Player>,
    pub(crate) names: NameRegistry,
    pub(crate) index: Box<dyn SpatialIndex>,
    /// Reverse map from spatial handles to session ids, maintained on
    /// connect/disconnect so radius queries can name their results.
    pub(crate) entity_sessions: BTreeMap<u64, String>,
    game_time: f64,
}

impl Simulator {
    pub fn new(config: SimConfig, index: Box<dyn SpatialIndex>) -> Self {
        let terrain = Generator::new(config.terrain_seed, config.terrain_strategy);
        let names = NameRegistry::new(config.name_max);
        Self {
            config,
            terrain,
            players: BTreeMap::new(),
            names,
            index,
            entity_sessions: BTreeMap::new(),
            game_time: 0.0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Monotonic game-time accumulator, in seconds. Chat ages are measured
    /// against this, never wall clock.
    pub fn game_time(&self) -> f64 {
        self.game_time
    }

    pub fn player(&self, session_id: &str) -> Option<&Player> {
        self.players.get(session_id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn session_ids(&self) -> impl Iterator<Item = &String> {
        self.players.keys()
    }

    /// Create a player for a new session, in the name-entry phase, standing
    /// on passable ground near the world center.
    pub fn connect(&mut self, session_id: &str) {
        if self.players.contains_key(session_id) {
            log::warn!("connect for already-known session {session_id}");
            return;
        }
        let (x, y) = self.spawn_point();
        let entity = self
            .index
            .add(x, y, Shape::Circle { radius: PLAYER_RADIUS }, "player");
        self.entity_sessions.insert(entity.0, session_id.to_string());
        self.players
            .insert(session_id.to_string(), Player::new(x, y, entity, self.config.chat_history_max));
        log::info!("session {session_id} connected at ({x:.0},{y:.0})");
    }

    /// Destroy a session's player: release its name and spatial entity.
    pub fn disconnect(&mut self, session_id: &str) {
        let Some(player) = self.players.remove(session_id) else {
            return;
        };
        if let Some(name) = player.name() {
            self.names.release(name);
        }
        self.entity_sessions.remove(&player.entity.0);
        self.index.remove(player.entity);
        log::info!("session {session_id} disconnected");
    }

    /// Route one key event to the session's player. Key-down events drive the
    /// name-entry and chat sub-state machines; the bitset always tracks state
    /// for movement.
    pub fn handle_key(&mut self, session_id: &str, key: u8, is_down: bool) {
        let Some(player) = self.players.get_mut(session_id) else {
            return;
        };
        player.input.set(key, is_down);
        if !is_down {
            return;
        }

        match &mut player.phase {
            PlayerPhase::EnteringName { buffer, error } => match key {
                KEY_ENTER => {
                    let attempt = buffer.clone();
                    match self.names.claim(&attempt) {
                        Ok(name) => {
                            player.phase = PlayerPhase::Active { name };
                            player.input.clear();
                        }
                        Err(e) => *error = Some(e.to_string()),
                    }
                }
                KEY_BACKSPACE => {
                    buffer.pop();
                    *error = None;
                }
                other => {
                    if let Some(c) = key_to_char(other) {
                        if buffer.chars().count() < self.config.name_max {
                            buffer.push(c);
                            *error = None;
                        }
                    }
                }
            },
            PlayerPhase::Active { .. } => match &mut player.compose {
                None => {
                    if key == KEY_ENTER {
                        player.compose = Some(String::new());
                        player.input.clear();
                    }
                }
                Some(buffer) => match key {
                    KEY_ENTER => {
                        let text = buffer.trim().to_string();
                        player.compose = None;
                        player.input.clear();
                        if !text.is_empty() {
                            player.chat.push(text, self.game_time);
                        }
                    }
                    KEY_BACKSPACE => {
                        buffer.pop();
                    }
                    other => {
                        if let Some(c) = key_to_char(other) {
                            if buffer.chars().count() < self.config.chat_buffer_max {
                                buffer.push(c);
                            }
                        }
                    }
                },
            },
        }
    }

    /// Advance the world one tick. Order is fixed: game time, movement,
    /// chat eviction. No player's fault (bad destination, no name yet)
    /// affects any other player's update.
    pub fn tick(&mut self, dt: f32) {
        self.game_time += f64::from(dt);

        for player in self.players.values_mut() {
            if !player.can_move() {
                continue;
            }
            let (dx, dy) = movement_axes(&player.input);
            if dx == 0.0 && dy == 0.0 {
                continue;
            }
            let tile_mult =
                self.terrain
                    .speed_multiplier_world(player.x, player.y, self.config.tile_size);
            let (nx, ny) = step_position(
                player.x,
                player.y,
                dx,
                dy,
                dt,
                self.config.player_speed * tile_mult,
                self.config.world_width,
                self.config.world_height,
                |x, y| self.terrain.is_passable_world(x, y, self.config.tile_size),
            );
            if (nx, ny) != (player.x, player.y) {
                player.x = nx;
                player.y = ny;
                self.index.update_position(player.entity, nx, ny);
            }
        }

        let now = self.game_time;
        let ttl = self.config.chat_ttl;
        for player in self.players.values_mut() {
            player.chat.evict_expired(now, ttl);
        }
    }

    /// Sessions of other players within `radius` of a point, discovered
    /// through the spatial-index contract only.
    pub fn nearby_sessions(&self, x: f32, y: f32, radius: f32, exclude: &str) -> Vec<String> {
        self.index
            .query_radius(x, y, radius, Some("player"))
            .into_iter()
            .filter_map(|handle| self.entity_sessions.get(&handle.0))
            .filter(|sid| sid.as_str() != exclude)
            .cloned()
            .collect()
    }

    /// First passable tile center spiraling out from the world center.
    fn spawn_point(&mut self) -> (f32, f32) {
        let tile = self.config.tile_size;
        let cx = driftmere_terrain::world_to_tile(self.config.world_width / 2.0, tile);
        let cy = driftmere_terrain::world_to_tile(self.config.world_height / 2.0, tile);

        for ring in 0..=SPAWN_SCAN_RADIUS {
            for ty in (cy - ring)..=(cy + ring) {
                for tx in (cx - ring)..=(cx + ring) {
                    // Only the perimeter of the ring is new.
                    if ring > 0
                        && tx != cx - ring
                        && tx != cx + ring
                        && ty != cy - ring
                        && ty != cy + ring
                    {
                        continue;
                    }
                    if self.terrain.classify(tx, ty).passable() {
                        let x = (tx as f32 + 0.5) * tile;
                        let y = (ty as f32 + 0.5) * tile;
                        if x >= 0.0
                            && x <= self.config.world_width
                            && y >= 0.0
                            && y <= self.config.world_height
                        {
                            return (x, y);
                        }
                    }
                }
            }
        }
        log::warn!("no passable spawn tile within {SPAWN_SCAN_RADIUS} rings of center");
        (self.config.world_width / 2.0, self.config.world_height / 2.0)
    }
}

/// Resolve one movement step. Pure: the caller supplies passability.
///
/// `(dx, dy)` are raw axis sums from the input table; diagonals are
/// normalized to unit length so diagonal movement is not √2 faster. The
/// candidate position is clamped to `[0, world] × [0, world]` first, then
/// committed only if passable — otherwise the original position is returned
/// unchanged.
#[allow(clippy::too_many_arguments)]
pub fn step_position(
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
    dt: f32,
    speed: f32,
    world_width: f32,
    world_height: f32,
    mut passable: impl FnMut(f32, f32) -> bool,
) -> (f32, f32) {
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return (x, y);
    }
    let nx = (x + dx / len * speed * dt).clamp(0.0, world_width);
    let ny = (y + dy / len * speed * dt).clamp(0.0, world_height);
    if passable(nx, ny) { (nx, ny) } else { (x, y) }
}
