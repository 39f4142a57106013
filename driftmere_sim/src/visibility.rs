// Proximity-gated visibility math.
//
// Pure functions shared by the renderer: the viewer camera (clamped to world
// bounds), per-tile fog as a clamped linear falloff, and per-remote-player
// alpha as a quadratic falloff. Chat bubbles use a separate, independently
// configured radius — hearing range and sight range are different tunables.

use crate::config::SimConfig;

/// A viewer's camera rectangle in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Center the camera on the viewer, clamped so the view never leaves the
/// world. A world smaller than the viewport pins the camera to the origin.
pub fn camera_for(config: &SimConfig, viewer_x: f32, viewer_y: f32) -> Camera {
    let max_x = (config.world_width - config.view_width).max(0.0);
    let max_y = (config.world_height - config.view_height).max(0.0);
    Camera {
        x: (viewer_x - config.view_width / 2.0).clamp(0.0, max_x),
        y: (viewer_y - config.view_height / 2.0).clamp(0.0, max_y),
        width: config.view_width,
        height: config.view_height,
    }
}

/// Fog factor for a tile at `distance` from the viewer: 1 at the viewer,
/// linearly down to 0 at `fog_range`, clamped.
pub fn fog_factor(distance: f32, fog_range: f32) -> f32 {
    (1.0 - distance / fog_range).clamp(0.0, 1.0)
}

/// Render alpha for a remote player at `distance`: quadratic falloff,
/// `max(0, 1 − d/range)²`. Fully opaque at the viewer, fully invisible at
/// the visibility range.
pub fn player_alpha(distance: f32, visibility_range: f32) -> f32 {
    let linear = (1.0 - distance / visibility_range).max(0.0);
    linear * linear
}

/// Whether a remote player's chat bubbles render for this viewer.
pub fn chat_visible(distance: f32, chat_radius: f32) -> bool {
    distance <= chat_radius
}

pub fn distance(x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt()
}
