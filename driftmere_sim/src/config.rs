// Data-driven simulation configuration.
//
// All tunable parameters live in `SimConfig`, loaded from JSON at startup.
// The sim never uses magic numbers — it reads from the config. Defaults
// match the shipped world; a deployment overrides what it needs via
// `--config world.json` on the server binary.
//
// The terrain seed and strategy are part of the config: every subsystem that
// consults terrain (movement, rendering, fog) goes through one `Generator`
// constructed from these two values, so all views of the world agree.

use driftmere_terrain::Strategy;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// World extent in pixels. Player positions are clamped to
    /// `[0, world_width] × [0, world_height]`.
    pub world_width: f32,
    pub world_height: f32,
    /// Edge length of one terrain tile in pixels.
    pub tile_size: f32,
    /// Base player speed in pixels per second (before tile multipliers).
    pub player_speed: f32,
    /// Viewport size rendered per client, in pixels.
    pub view_width: f32,
    pub view_height: f32,
    /// Distance at which a remote player fades to fully invisible.
    pub visibility_range: f32,
    /// Distance over which tile fog ramps from clear to opaque.
    pub fog_range: f32,
    /// Independent radius gating whether a nearby player's chat renders.
    pub chat_radius: f32,
    /// Seconds a chat message stays in history (game time, not wall clock).
    pub chat_ttl: f64,
    /// Maximum chat messages retained per player.
    pub chat_history_max: usize,
    /// Maximum length of the chat compose buffer, in characters.
    pub chat_buffer_max: usize,
    /// Maximum accepted display-name length, in characters.
    pub name_max: usize,
    /// Terrain seed shared by every generator consumer.
    pub terrain_seed: u64,
    /// Which of the two generation strategies this deployment runs.
    pub terrain_strategy: Strategy,
    /// Server simulation rate.
    pub tick_hz: u32,
    /// Seconds a disconnected session survives for resumption before its
    /// player (and name) is released.
    pub resume_grace: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            world_width: 4096.0,
            world_height: 4096.0,
            tile_size: 32.0,
            player_speed: 150.0,
            view_width: 800.0,
            view_height: 600.0,
            visibility_range: 320.0,
            fog_range: 400.0,
            chat_radius: 220.0,
            chat_ttl: 12.0,
            chat_history_max: 5,
            chat_buffer_max: 80,
            name_max: 16,
            terrain_seed: 12345,
            terrain_strategy: Strategy::default(),
            tick_hz: 20,
            resume_grace: 30.0,
        }
    }
}

impl SimConfig {
    /// Parse a config from JSON. Missing fields fall back to defaults.
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("invalid config: {e}"))
    }

    /// Seconds per tick.
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_hz as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = SimConfig::default();
        assert!(c.world_width > 0.0);
        assert!(c.tile_size > 0.0);
        assert!(c.visibility_range > 0.0);
        assert!(c.tick_hz > 0);
        assert!((c.tick_dt() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let c = SimConfig::from_json(r#"{"player_speed": 200.0, "terrain_seed": 9}"#).unwrap();
        assert_eq!(c.player_speed, 200.0);
        assert_eq!(c.terrain_seed, 9);
        // Untouched fields keep defaults.
        assert_eq!(c.tile_size, SimConfig::default().tile_size);
    }

    #[test]
    fn strategy_is_selectable_from_json() {
        let c = SimConfig::from_json(r#"{"terrain_strategy": "hash_threshold"}"#).unwrap();
        assert_eq!(c.terrain_strategy, Strategy::HashThreshold);
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(SimConfig::from_json("{nope").is_err());
    }

    #[test]
    fn roundtrip_through_json() {
        let c = SimConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let back = SimConfig::from_json(&json).unwrap();
        assert_eq!(back.world_width, c.world_width);
        assert_eq!(back.terrain_strategy, c.terrain_strategy);
        assert_eq!(back.chat_history_max, c.chat_history_max);
    }
}
