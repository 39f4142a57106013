// Spatial-index collaborator contract.
//
// The engine's spatial hash is an external collaborator: the sim registers
// entities, keeps their positions current, and asks proximity questions — it
// must never assume anything about the index's internal data structure.
// `SpatialIndex` is that contract; entity handles are opaque typed integers
// the sim only ever passes back.
//
// `ScanIndex` is the bundled implementation: a flat map with linear-scan
// queries. It is the stand-in the server and tests run against; an engine
// substitutes its own structure behind the same trait.

use std::collections::BTreeMap;

/// Opaque handle bound to an entity in the external spatial index. Never
/// dereferenced by the sim — only passed back to the collaborator API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityHandle(pub u64);

/// The two entity geometries the index supports.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    /// A circle centered on the entity position.
    Circle { radius: f32 },
    /// A segment from the entity position to an absolute endpoint.
    Segment { x2: f32, y2: f32 },
}

/// Query contract of the external spatial index.
pub trait SpatialIndex {
    /// Register an entity. The returned handle identifies it from then on.
    fn add(&mut self, x: f32, y: f32, shape: Shape, tag: &str) -> EntityHandle;

    /// Remove an entity. Unknown handles are a no-op.
    fn remove(&mut self, handle: EntityHandle);

    /// Move an entity. Unknown handles are a no-op.
    fn update_position(&mut self, handle: EntityHandle, x: f32, y: f32);

    /// All entities whose position lies within `radius` of a point,
    /// optionally restricted to one tag.
    fn query_radius(&self, x: f32, y: f32, radius: f32, tag: Option<&str>) -> Vec<EntityHandle>;

    /// All entities whose position lies within an axis-aligned box,
    /// optionally restricted to one tag.
    fn query_aabb(
        &self,
        min_x: f32,
        min_y: f32,
        max_x: f32,
        max_y: f32,
        tag: Option<&str>,
    ) -> Vec<EntityHandle>;

    /// First entity hit walking a ray from `(x1,y1)` to `(x2,y2)`, if any.
    fn raycast(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> Option<EntityHandle>;
}

struct Entity {
    x: f32,
    y: f32,
    shape: Shape,
    tag: String,
}

/// Linear-scan reference implementation of the index contract.
///
/// `BTreeMap` keeps query results in handle order, which keeps everything
/// downstream of a query deterministic.
#[derive(Default)]
pub struct ScanIndex {
    entities: BTreeMap<u64, Entity>,
    next_id: u64,
}

impl ScanIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Distance from a point to an entity, honoring its shape: distance to
    /// the center for circles (minus radius), distance to the segment for
    /// segments.
    fn distance_to(&self, entity: &Entity, px: f32, py: f32) -> f32 {
        match entity.shape {
            Shape::Circle { radius } => {
                let d = ((px - entity.x).powi(2) + (py - entity.y).powi(2)).sqrt();
                (d - radius).max(0.0)
            }
            Shape::Segment { x2, y2 } => {
                point_segment_distance(px, py, entity.x, entity.y, x2, y2)
            }
        }
    }
}

impl SpatialIndex for ScanIndex {
    fn add(&mut self, x: f32, y: f32, shape: Shape, tag: &str) -> EntityHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.entities.insert(
            id,
            Entity {
                x,
                y,
                shape,
                tag: tag.to_string(),
            },
        );
        EntityHandle(id)
    }

    fn remove(&mut self, handle: EntityHandle) {
        self.entities.remove(&handle.0);
    }

    fn update_position(&mut self, handle: EntityHandle, x: f32, y: f32) {
        if let Some(entity) = self.entities.get_mut(&handle.0) {
            entity.x = x;
            entity.y = y;
        }
    }

    fn query_radius(&self, x: f32, y: f32, radius: f32, tag: Option<&str>) -> Vec<EntityHandle> {
        self.entities
            .iter()
            .filter(|(_, e)| tag.is_none_or(|t| e.tag == t))
            .filter(|(_, e)| self.distance_to(e, x, y) <= radius)
            .map(|(id, _)| EntityHandle(*id))
            .collect()
    }

    fn query_aabb(
        &self,
        min_x: f32,
        min_y: f32,
        max_x: f32,
        max_y: f32,
        tag: Option<&str>,
    ) -> Vec<EntityHandle> {
        self.entities
            .iter()
            .filter(|(_, e)| tag.is_none_or(|t| e.tag == t))
            .filter(|(_, e)| e.x >= min_x && e.x <= max_x && e.y >= min_y && e.y <= max_y)
            .map(|(id, _)| EntityHandle(*id))
            .collect()
    }

    fn raycast(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> Option<EntityHandle> {
        // Sample the nearest intersection along the ray; for circles this is
        // the closest approach point within the radius.
        let mut best: Option<(f32, EntityHandle)> = None;
        for (id, entity) in &self.entities {
            let t = match entity.shape {
                Shape::Circle { radius } => {
                    circle_ray_hit(x1, y1, x2, y2, entity.x, entity.y, radius)
                }
                Shape::Segment { .. } => {
                    // Treat segment entities as thin circles at their origin
                    // for ray purposes; the bundled game registers players as
                    // circles, so this path stays simple.
                    circle_ray_hit(x1, y1, x2, y2, entity.x, entity.y, 0.5)
                }
            };
            if let Some(t) = t {
                if best.is_none_or(|(bt, _)| t < bt) {
                    best = Some((t, EntityHandle(*id)));
                }
            }
        }
        best.map(|(_, handle)| handle)
    }
}

/// Distance from a point to a line segment.
fn point_segment_distance(px: f32, py: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((px - x1) * dx + (py - y1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let cx = x1 + t * dx;
    let cy = y1 + t * dy;
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

/// Parametric t in [0,1] at which a ray first enters a circle, or `None`.
fn circle_ray_hit(x1: f32, y1: f32, x2: f32, y2: f32, cx: f32, cy: f32, radius: f32) -> Option<f32> {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let fx = x1 - cx;
    let fy = y1 - cy;
    let a = dx * dx + dy * dy;
    if a == 0.0 {
        return (fx * fx + fy * fy <= radius * radius).then_some(0.0);
    }
    let b = 2.0 * (fx * dx + fy * dy);
    let c = fx * fx + fy * fy - radius * radius;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    let t1 = (-b - sqrt_disc) / (2.0 * a);
    let t2 = (-b + sqrt_disc) / (2.0 * a);
    if (0.0..=1.0).contains(&t1) {
        Some(t1)
    } else if (0.0..=1.0).contains(&t2) {
        Some(t2)
    } else {
        None
    }
}
