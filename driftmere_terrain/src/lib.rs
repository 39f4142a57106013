// driftmere_terrain — deterministic procedural terrain.
//
// The world is an unbounded grid of tiles, never stored: every tile's kind is
// a pure function of `(seed, strategy, tile_x, tile_y)`, memoized forever.
// Movement, rendering, and fog all consult the same generator, so the three
// views of the world can never disagree.
//
// Module overview:
// - `hash.rs`:  SplitMix64-style coordinate hashing — the sole randomness.
// - `noise.rs`: Lattice value noise + fBm built on the hash.
// - `lib.rs`:   `TileKind`, the two generation strategies, the memoizing
//               `Generator`, and world↔tile coordinate mapping.
//
// Two strategies exist side by side and are selected by configuration, not
// reconciled: `HashThreshold` classifies a raw per-tile hash by fixed
// probability bands; `FractalNoise` thresholds fBm elevation/moisture fields
// into biomes with a detail perturbation and a rare scatter overlay. Neither
// supersedes the other — deployments pick one.
//
// **Critical constraint: determinism.** `classify` must return the same kind
// for the same inputs on every call, process, and platform. The cache is an
// optimization only; a cached value always equals the uncached computation.

pub mod hash;
pub mod noise;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::hash::hash_unit;
use crate::noise::{fbm, value_noise};

// Field salts. Each independent random field drawn from the one seed gets
// its own salt so the fields are uncorrelated.
const SALT_THRESHOLD: u64 = 0;
const SALT_ELEVATION: u64 = 1;
const SALT_MOISTURE: u64 = 2;
const SALT_DETAIL: u64 = 3;
const SALT_SCATTER: u64 = 4;

// FractalNoise tuning.
const ELEVATION_OCTAVES: u32 = 4;
const MOISTURE_OCTAVES: u32 = 3;
const ELEVATION_FREQUENCY: f64 = 0.02;
const MOISTURE_FREQUENCY: f64 = 0.015;
const DETAIL_FREQUENCY: f64 = 0.35;
const DETAIL_AMPLITUDE: f64 = 0.05;
const WATER_LEVEL: f64 = 0.34;
const SAND_LEVEL: f64 = 0.40;
const ROCK_LEVEL: f64 = 0.78;
const TREE_MOISTURE: f64 = 0.62;
const SCATTER_TREE_CHANCE: f64 = 0.02;
const SCATTER_ROCK_CHANCE: f64 = 0.01;

/// Speed penalty on sand.
const SAND_SPEED_MULTIPLIER: f32 = 0.6;

/// The fixed set of terrain kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    Water,
    Sand,
    Grass,
    Tree,
    Rock,
}

impl TileKind {
    /// Whether a player may stand on this tile. Water, rock, and tree block
    /// movement; grass and sand do not.
    pub fn passable(self) -> bool {
        matches!(self, TileKind::Grass | TileKind::Sand)
    }

    /// Movement-speed multiplier while standing on this tile. Sand slows
    /// movement; everything passable else is full speed.
    pub fn speed_multiplier(self) -> f32 {
        match self {
            TileKind::Sand => SAND_SPEED_MULTIPLIER,
            _ => 1.0,
        }
    }
}

/// Which generation strategy a deployment runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Single per-tile hash classified by fixed probability bands.
    HashThreshold,
    /// fBm elevation/moisture biomes with detail perturbation and scatter.
    #[default]
    FractalNoise,
}

/// Classify a unit-interval hash value by the fixed probability bands of the
/// threshold strategy. Exposed separately so the band layout is testable
/// without picking hash inputs.
pub fn classify_unit(v: f64) -> TileKind {
    if v < 0.15 {
        TileKind::Water
    } else if v < 0.30 {
        TileKind::Sand
    } else if v < 0.80 {
        TileKind::Grass
    } else if v < 0.90 {
        TileKind::Tree
    } else {
        TileKind::Rock
    }
}

/// Map a world coordinate to a tile coordinate. Floor division, so negative
/// world positions land on the correct tile.
pub fn world_to_tile(v: f32, tile_size: f32) -> i32 {
    (v / tile_size).floor() as i32
}

/// The memoizing terrain generator.
///
/// The cache grows monotonically and is never invalidated — tile kinds are
/// pure, so an entry can never go stale.
pub struct Generator {
    seed: u64,
    strategy: Strategy,
    cache: FxHashMap<(i32, i32), TileKind>,
}

impl Generator {
    pub fn new(seed: u64, strategy: Strategy) -> Self {
        Self {
            seed,
            strategy,
            cache: FxHashMap::default(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Number of memoized tiles.
    pub fn cached_tiles(&self) -> usize {
        self.cache.len()
    }

    /// Classify the tile at integer tile coordinates.
    pub fn classify(&mut self, tile_x: i32, tile_y: i32) -> TileKind {
        let seed = self.seed;
        let strategy = self.strategy;
        *self
            .cache
            .entry((tile_x, tile_y))
            .or_insert_with(|| compute_tile(seed, strategy, tile_x, tile_y))
    }

    /// Classify the tile under a world-space position.
    pub fn classify_world(&mut self, x: f32, y: f32, tile_size: f32) -> TileKind {
        self.classify(world_to_tile(x, tile_size), world_to_tile(y, tile_size))
    }

    /// Whether the tile under a world-space position is passable.
    pub fn is_passable_world(&mut self, x: f32, y: f32, tile_size: f32) -> bool {
        self.classify_world(x, y, tile_size).passable()
    }

    /// Movement-speed multiplier of the tile under a world-space position.
    pub fn speed_multiplier_world(&mut self, x: f32, y: f32, tile_size: f32) -> f32 {
        self.classify_world(x, y, tile_size).speed_multiplier()
    }
}

/// The uncached classification — what the cache memoizes.
fn compute_tile(seed: u64, strategy: Strategy, tile_x: i32, tile_y: i32) -> TileKind {
    match strategy {
        Strategy::HashThreshold => {
            classify_unit(hash_unit(seed, SALT_THRESHOLD, tile_x, tile_y))
        }
        Strategy::FractalNoise => classify_fractal(seed, tile_x, tile_y),
    }
}

fn classify_fractal(seed: u64, tile_x: i32, tile_y: i32) -> TileKind {
    let x = f64::from(tile_x);
    let y = f64::from(tile_y);

    let mut elevation = fbm(
        seed,
        SALT_ELEVATION,
        x,
        y,
        ELEVATION_OCTAVES,
        ELEVATION_FREQUENCY,
    );
    // Small high-frequency perturbation roughens biome borders without
    // moving them wholesale.
    let detail = value_noise(seed, SALT_DETAIL, x * DETAIL_FREQUENCY, y * DETAIL_FREQUENCY);
    elevation = (elevation + (detail - 0.5) * DETAIL_AMPLITUDE).clamp(0.0, 1.0);

    if elevation < WATER_LEVEL {
        return TileKind::Water;
    }
    if elevation < SAND_LEVEL {
        return TileKind::Sand;
    }
    if elevation > ROCK_LEVEL {
        return TileKind::Rock;
    }

    let moisture = fbm(
        seed,
        SALT_MOISTURE,
        x,
        y,
        MOISTURE_OCTAVES,
        MOISTURE_FREQUENCY,
    );
    let base = if moisture > TREE_MOISTURE {
        TileKind::Tree
    } else {
        TileKind::Grass
    };

    // Rare scatter overlay: lone trees and rocks on open grass.
    if base == TileKind::Grass {
        let s = hash_unit(seed, SALT_SCATTER, tile_x, tile_y);
        if s < SCATTER_TREE_CHANCE {
            return TileKind::Tree;
        }
        if s < SCATTER_TREE_CHANCE + SCATTER_ROCK_CHANCE {
            return TileKind::Rock;
        }
    }
    base
}
