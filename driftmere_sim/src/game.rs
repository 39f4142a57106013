// The bundled game: a proximity-gated shared world.
//
// `GameHooks` is the seam between the server's transport/tick machinery and
// game logic — the server knows sessions, ticks, and frames; the game knows
// everything else. `ProximityWorld` is the shipped implementation: terrain
// with distance fog, nearby players fading with a quadratic falloff, chat
// bubbles gated by their own radius, and a looping shoreline ambience whose
// volume tracks the distance to the nearest water tile.
//
// Every frame is a complete redraw in screen space. The server calls `draw`
// once per session per tick; nothing is retained client-side between frames
// except loaded sounds.

use std::collections::BTreeMap;

use driftmere_protocol::FrameBuilder;
use driftmere_terrain::{TileKind, world_to_tile};
use smallvec::SmallVec;

use crate::sim::Simulator;
use crate::visibility::{camera_for, chat_visible, distance, fog_factor, player_alpha};

/// Game logic callbacks driven by the server loop.
pub trait GameHooks {
    /// Called once before the first tick.
    fn init(&mut self) {}

    /// A session's player should come into existence.
    fn on_connect(&mut self, session_id: &str);

    /// A session's player is gone for good (grace period already elapsed).
    fn on_disconnect(&mut self, session_id: &str);

    /// One key transition from a session's input report.
    fn on_input(&mut self, session_id: &str, key_code: u8, is_down: bool);

    /// Advance game state by one tick.
    fn update(&mut self, dt: f32);

    /// Produce the complete frame for one session's viewport.
    fn draw(&mut self, session_id: &str, frame: &mut FrameBuilder);
}

const PLAYER_SIZE: f32 = 16.0;

const AMBIENT_SOUND: &str = "surf";
const AMBIENT_URL: &str = "assets/surf.ogg";
const AMBIENT_MAX_VOLUME: f32 = 0.5;
/// Frames after load before the looping play command is sent, giving the
/// client time to fetch and decode. A play that lands while the sound is
/// still loading is dropped client-side, so this is sent exactly once.
const AMBIENT_PLAY_FRAME: u64 = 60;
/// How far (in tiles) the ambience scan looks for water around the viewer.
const WATER_SCAN_TILES: i32 = 8;

fn tile_color(kind: TileKind) -> (u8, u8, u8) {
    match kind {
        TileKind::Water => (38, 92, 153),
        TileKind::Sand => (194, 178, 128),
        TileKind::Grass => (58, 121, 66),
        TileKind::Tree => (34, 85, 44),
        TileKind::Rock => (110, 110, 115),
    }
}

/// Darken a color channel by the fog factor. Fully fogged tiles stay dimly
/// visible rather than black, so the world edge reads as haze, not void.
fn fogged(channel: u8, fog: f32) -> u8 {
    let scale = 0.25 + 0.75 * fog;
    (f32::from(channel) * scale) as u8
}

/// The shipped game world.
pub struct ProximityWorld {
    pub sim: Simulator,
    /// Frames drawn per session, for one-shot sound scheduling.
    frames_drawn: BTreeMap<String, u64>,
}

impl ProximityWorld {
    pub fn new(sim: Simulator) -> Self {
        Self {
            sim,
            frames_drawn: BTreeMap::new(),
        }
    }

    /// Distance from a world position to the nearest water tile within the
    /// ambience scan, if any.
    fn nearest_water(&mut self, x: f32, y: f32) -> Option<f32> {
        let tile = self.sim.config.tile_size;
        let cx = world_to_tile(x, tile);
        let cy = world_to_tile(y, tile);
        let mut best: Option<f32> = None;
        for ty in (cy - WATER_SCAN_TILES)..=(cy + WATER_SCAN_TILES) {
            for tx in (cx - WATER_SCAN_TILES)..=(cx + WATER_SCAN_TILES) {
                if self.sim.terrain.classify(tx, ty) != TileKind::Water {
                    continue;
                }
                let d = distance(x, y, (tx as f32 + 0.5) * tile, (ty as f32 + 0.5) * tile);
                if best.is_none_or(|b| d < b) {
                    best = Some(d);
                }
            }
        }
        best
    }

    fn draw_terrain(&mut self, frame: &mut FrameBuilder, viewer: (f32, f32), cam: (f32, f32)) {
        let config = &self.sim.config;
        let tile = config.tile_size;
        let fog_range = config.fog_range;
        let (cam_x, cam_y) = cam;
        let tx0 = world_to_tile(cam_x, tile);
        let ty0 = world_to_tile(cam_y, tile);
        let tx1 = world_to_tile(cam_x + config.view_width, tile);
        let ty1 = world_to_tile(cam_y + config.view_height, tile);

        for ty in ty0..=ty1 {
            for tx in tx0..=tx1 {
                let kind = self.sim.terrain.classify(tx, ty);
                let center_x = (tx as f32 + 0.5) * tile;
                let center_y = (ty as f32 + 0.5) * tile;
                let fog = fog_factor(
                    distance(viewer.0, viewer.1, center_x, center_y),
                    fog_range,
                );
                let (r, g, b) = tile_color(kind);
                frame.set_color(fogged(r, fog), fogged(g, fog), fogged(b, fog), 255);
                frame.fill_rect(tx as f32 * tile - cam_x, ty as f32 * tile - cam_y, tile, tile);
            }
        }
    }

    fn draw_chat(
        frame: &mut FrameBuilder,
        player: &crate::player::Player,
        screen_x: f32,
        screen_y: f32,
        alpha: u8,
    ) {
        // Newest message closest to the head, older ones stacked above.
        let count = player.chat.len();
        for (i, entry) in player.chat.iter().enumerate() {
            let row = (count - 1 - i) as f32;
            frame.set_color(255, 255, 255, alpha);
            frame.draw_text(screen_x, screen_y - 34.0 - row * 14.0, &entry.text);
        }
        if count > 0 {
            // Anchor stroke from the bubble stack down toward the head.
            frame.set_color(255, 255, 255, alpha / 2);
            frame.draw_line(
                screen_x,
                screen_y - 30.0,
                screen_x,
                screen_y - PLAYER_SIZE,
                1.0,
            );
        }
    }

    fn draw_overlay(frame: &mut FrameBuilder, config_view: (f32, f32), player: &crate::player::Player) {
        let (vw, vh) = config_view;
        match &player.phase {
            crate::player::PlayerPhase::EnteringName { buffer, error } => {
                frame.set_color(0, 0, 0, 180);
                frame.fill_rect(vw / 2.0 - 160.0, vh / 2.0 - 60.0, 320.0, 120.0);
                frame.set_color(255, 255, 255, 255);
                frame.draw_text(vw / 2.0 - 140.0, vh / 2.0 - 30.0, "choose a name:");
                frame.draw_text(vw / 2.0 - 140.0, vh / 2.0, &format!("{buffer}_"));
                if let Some(error) = error {
                    frame.set_color(235, 90, 90, 255);
                    frame.draw_text(vw / 2.0 - 140.0, vh / 2.0 + 30.0, error);
                }
            }
            crate::player::PlayerPhase::Active { .. } => {
                if let Some(buffer) = &player.compose {
                    frame.set_color(0, 0, 0, 160);
                    frame.fill_rect(0.0, vh - 28.0, vw, 28.0);
                    frame.set_color(255, 255, 255, 255);
                    frame.draw_text(8.0, vh - 14.0, &format!("say: {buffer}_"));
                }
            }
        }
    }

    fn push_ambience(&mut self, session_id: &str, frame: &mut FrameBuilder, viewer: (f32, f32)) {
        let frames = self.frames_drawn.entry(session_id.to_string()).or_insert(0);
        let n = *frames;
        *frames += 1;

        if n == 0 {
            frame.load_sound(AMBIENT_SOUND, AMBIENT_URL);
            return;
        }
        if n == AMBIENT_PLAY_FRAME {
            frame.play_sound(AMBIENT_SOUND, true, 0.0);
        }
        if n >= AMBIENT_PLAY_FRAME {
            let scan_range = WATER_SCAN_TILES as f32 * self.sim.config.tile_size;
            let volume = match self.nearest_water(viewer.0, viewer.1) {
                Some(d) => (1.0 - d / scan_range).clamp(0.0, 1.0) * AMBIENT_MAX_VOLUME,
                None => 0.0,
            };
            frame.set_volume(AMBIENT_SOUND, volume);
        }
    }
}

impl GameHooks for ProximityWorld {
    fn init(&mut self) {
        log::info!(
            "world up: seed {}, strategy {:?}",
            self.sim.config.terrain_seed,
            self.sim.config.terrain_strategy
        );
    }

    fn on_connect(&mut self, session_id: &str) {
        self.sim.connect(session_id);
    }

    fn on_disconnect(&mut self, session_id: &str) {
        self.sim.disconnect(session_id);
        self.frames_drawn.remove(session_id);
    }

    fn on_input(&mut self, session_id: &str, key_code: u8, is_down: bool) {
        self.sim.handle_key(session_id, key_code, is_down);
    }

    fn update(&mut self, dt: f32) {
        self.sim.tick(dt);
    }

    fn draw(&mut self, session_id: &str, frame: &mut FrameBuilder) {
        let Some(player) = self.sim.player(session_id) else {
            return;
        };
        let (px, py) = (player.x, player.y);
        let cam = camera_for(&self.sim.config, px, py);

        frame.clear(12, 16, 24);
        self.draw_terrain(frame, (px, py), (cam.x, cam.y));

        // Remote players, visibility-gated through the spatial index. The
        // chat radius is smaller than the visibility range, so one query
        // covers both.
        let visibility = self.sim.config.visibility_range;
        let chat_radius = self.sim.config.chat_radius;
        let nearby = self.sim.nearby_sessions(px, py, visibility, session_id);
        let mut visible: SmallVec<[(String, f32); 8]> = SmallVec::new();
        for sid in nearby {
            let Some(other) = self.sim.player(&sid) else {
                continue;
            };
            if !other.is_active() {
                continue;
            }
            let d = distance(px, py, other.x, other.y);
            if player_alpha(d, visibility) > 0.0 {
                visible.push((sid, d));
            }
        }

        for (sid, d) in &visible {
            let Some(other) = self.sim.player(sid) else {
                continue;
            };
            let alpha = (player_alpha(*d, visibility) * 255.0) as u8;
            let sx = other.x - cam.x;
            let sy = other.y - cam.y;
            frame.set_color(230, 225, 210, alpha);
            frame.fill_rect(
                sx - PLAYER_SIZE / 2.0,
                sy - PLAYER_SIZE / 2.0,
                PLAYER_SIZE,
                PLAYER_SIZE,
            );
            if let Some(name) = other.name() {
                frame.draw_text(sx, sy - PLAYER_SIZE, name);
            }
            if chat_visible(*d, chat_radius) {
                Self::draw_chat(frame, other, sx, sy, alpha);
            }
        }

        // The viewer, fully opaque, over everyone else.
        let self_player = match self.sim.player(session_id) {
            Some(p) => p,
            None => return,
        };
        let sx = px - cam.x;
        let sy = py - cam.y;
        frame.set_color(255, 255, 255, 255);
        frame.fill_rect(
            sx - PLAYER_SIZE / 2.0,
            sy - PLAYER_SIZE / 2.0,
            PLAYER_SIZE,
            PLAYER_SIZE,
        );
        if let Some(name) = self_player.name() {
            frame.draw_text(sx, sy - PLAYER_SIZE, name);
        }
        Self::draw_chat(frame, self_player, sx, sy, 255);

        let view = (self.sim.config.view_width, self.sim.config.view_height);
        Self::draw_overlay(frame, view, self_player);

        self.push_ambience(session_id, frame, (px, py));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::input::KEY_ENTER;
    use crate::spatial::ScanIndex;
    use driftmere_protocol::{DrawCommand, decode_commands};

    fn world() -> ProximityWorld {
        let sim = Simulator::new(SimConfig::default(), Box::new(ScanIndex::new()));
        ProximityWorld::new(sim)
    }

    fn join(world: &mut ProximityWorld, sid: &str, name: &str) {
        world.on_connect(sid);
        for c in name.chars() {
            world.on_input(sid, c.to_ascii_uppercase() as u8, true);
            world.on_input(sid, c.to_ascii_uppercase() as u8, false);
        }
        world.on_input(sid, KEY_ENTER, true);
        world.on_input(sid, KEY_ENTER, false);
    }

    fn draw_raw(world: &mut ProximityWorld, sid: &str) -> Vec<DrawCommand> {
        let mut frame = FrameBuilder::new();
        world.draw(sid, &mut frame);
        decode_commands(&frame.into_raw())
    }

    fn texts(cmds: &[DrawCommand]) -> Vec<&str> {
        cmds.iter()
            .filter_map(|c| match c {
                DrawCommand::DrawText { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn frame_starts_with_clear_and_covers_terrain() {
        let mut w = world();
        join(&mut w, "s1", "ada");
        let cmds = draw_raw(&mut w, "s1");
        assert!(matches!(cmds[0], DrawCommand::Clear { .. }));

        let rects = cmds
            .iter()
            .filter(|c| matches!(c, DrawCommand::FillRect { .. }))
            .count();
        // At least one rect per visible tile (800/32+1) × (600/32+1).
        assert!(rects >= 26 * 19, "only {rects} rects");
    }

    #[test]
    fn unknown_session_draws_nothing() {
        let mut w = world();
        let cmds = draw_raw(&mut w, "nope");
        assert!(cmds.is_empty());
    }

    #[test]
    fn name_entry_overlay_shows_prompt_and_error() {
        let mut w = world();
        join(&mut w, "s1", "ada");
        join(&mut w, "s2", "ada"); // collision: s2 stays in name entry
        let cmds = draw_raw(&mut w, "s2");
        let t = texts(&cmds);
        assert!(t.iter().any(|s| s.contains("choose a name")));
        assert!(t.contains(&"that name is taken"), "texts: {t:?}");
    }

    #[test]
    fn active_player_sees_own_name_not_prompt() {
        let mut w = world();
        join(&mut w, "s1", "ada");
        let cmds = draw_raw(&mut w, "s1");
        let t = texts(&cmds);
        assert!(t.contains(&"ada"));
        assert!(!t.iter().any(|s| s.contains("choose a name")));
    }

    #[test]
    fn nearby_player_renders_with_name() {
        let mut w = world();
        join(&mut w, "s1", "ada");
        join(&mut w, "s2", "bob");
        // Both spawn on the same scan path near center, well within range.
        let cmds = draw_raw(&mut w, "s1");
        let t = texts(&cmds);
        assert!(t.contains(&"bob"), "texts: {t:?}");
    }

    #[test]
    fn distant_player_is_not_drawn() {
        let mut w = world();
        join(&mut w, "s1", "ada");
        join(&mut w, "s2", "bob");
        // Teleport bob far outside the visibility range.
        {
            let range = w.sim.config.visibility_range;
            let p = w.sim.players.get_mut("s2").unwrap();
            p.x += range * 4.0;
            let entity = p.entity;
            let (x, y) = (p.x, p.y);
            w.sim.index.update_position(entity, x, y);
        }
        let cmds = draw_raw(&mut w, "s1");
        let t = texts(&cmds);
        assert!(!t.contains(&"bob"), "texts: {t:?}");
    }

    #[test]
    fn chat_bubble_gated_by_chat_radius() {
        let mut w = world();
        join(&mut w, "s1", "ada");
        join(&mut w, "s2", "bob");
        // Bob says something.
        w.on_input("s2", KEY_ENTER, true);
        w.on_input("s2", KEY_ENTER, false);
        w.on_input("s2", b'H', true);
        w.on_input("s2", b'I', true);
        w.on_input("s2", KEY_ENTER, true);

        let cmds = draw_raw(&mut w, "s1");
        let t = texts(&cmds);
        assert!(t.contains(&"hi"), "texts: {t:?}");

        // Push bob outside chat radius but inside visibility.
        {
            let chat_radius = w.sim.config.chat_radius;
            let q = w.sim.players.get("s1").map(|p| (p.x, p.y)).unwrap();
            let p = w.sim.players.get_mut("s2").unwrap();
            p.x = q.0 + chat_radius + 40.0;
            p.y = q.1;
            let entity = p.entity;
            let (x, y) = (p.x, p.y);
            w.sim.index.update_position(entity, x, y);
        }
        let cmds = draw_raw(&mut w, "s1");
        let t = texts(&cmds);
        assert!(t.contains(&"bob"), "bob should still be visible: {t:?}");
        assert!(!t.contains(&"hi"), "chat should be out of earshot: {t:?}");
    }

    #[test]
    fn ambience_loads_then_plays_then_tracks_volume() {
        let mut w = world();
        join(&mut w, "s1", "ada");

        let first = draw_raw(&mut w, "s1");
        assert!(
            first.iter().any(|c| matches!(
                c,
                DrawCommand::LoadSound { name, .. } if name == AMBIENT_SOUND
            )),
            "first frame should load the ambience"
        );

        let mut played = false;
        let mut volumes = 0;
        for _ in 0..(AMBIENT_PLAY_FRAME + 10) {
            let cmds = draw_raw(&mut w, "s1");
            played |= cmds.iter().any(|c| matches!(
                c,
                DrawCommand::PlaySound { name, looped: true, .. } if name == AMBIENT_SOUND
            ));
            volumes += cmds
                .iter()
                .filter(|c| matches!(c, DrawCommand::SetVolume { .. }))
                .count();
        }
        assert!(played, "looping play never sent");
        assert!(volumes >= 10, "volume should track every frame after play");
    }

    #[test]
    fn compose_overlay_appears_while_typing() {
        let mut w = world();
        join(&mut w, "s1", "ada");
        w.on_input("s1", KEY_ENTER, true);
        w.on_input("s1", KEY_ENTER, false);
        w.on_input("s1", b'Y', true);
        let cmds = draw_raw(&mut w, "s1");
        let t = texts(&cmds);
        assert!(t.iter().any(|s| s.starts_with("say: y")), "texts: {t:?}");
    }

    #[test]
    fn disconnect_clears_per_session_state() {
        let mut w = world();
        join(&mut w, "s1", "ada");
        draw_raw(&mut w, "s1");
        assert!(w.frames_drawn.contains_key("s1"));
        w.on_disconnect("s1");
        assert!(w.frames_drawn.is_empty());
        assert_eq!(w.sim.player_count(), 0);
    }
}
