use glam::DVec3;

use super::{
    backend::CollisionBackend,
    contact::{ManifoldEntry, ShapeRef},
};
use crate::{
    config::CollisionSettings,
    core::{collider::ColliderShape, rigidbody::RigidBody},
    utils::allocator::Arena,
};

/// A shape placed in world space for one detection pass.
#[derive(Debug, Clone, Copy)]
struct PlacedShape {
    shape_ref: ShapeRef,
    center: DVec3,
    shape: ColliderShape,
    world_normal: DVec3,
    fixed: bool,
}

/// Brute-force narrow phase for spheres and half-spaces.
///
/// Every shape is tested against every shape of another body; pairs of
/// fixed bodies are skipped. Pairs closer than `search_margin` plus the
/// collision envelope are reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct SphereBackend {
    pub search_margin: f64,
}

impl SphereBackend {
    pub fn new(search_margin: f64) -> Self {
        Self { search_margin }
    }

    fn place(bodies: &Arena<RigidBody>) -> Vec<PlacedShape> {
        let mut placed = Vec::new();
        for (id, body) in bodies.iter() {
            if !body.collide {
                continue;
            }
            let Some(model) = body.collision_model.as_ref() else {
                continue;
            };
            for (index, shape) in model.shapes.iter().enumerate() {
                let world_normal = match shape.shape {
                    ColliderShape::Plane { normal } => body.transform.rotation * normal,
                    ColliderShape::Sphere { .. } => DVec3::ZERO,
                };
                placed.push(PlacedShape {
                    shape_ref: ShapeRef { body: id, shape: index },
                    center: shape.world_center(&body.transform),
                    shape: shape.shape,
                    world_normal,
                    fixed: body.fixed,
                });
            }
        }
        placed
    }

    fn collide(a: &PlacedShape, b: &PlacedShape, margin: f64) -> Option<ManifoldEntry> {
        match (a.shape, b.shape) {
            (ColliderShape::Sphere { radius: ra }, ColliderShape::Sphere { radius: rb }) => {
                let delta = b.center - a.center;
                let distance = delta.length();
                let depth = ra + rb - distance;
                if depth < -margin {
                    return None;
                }
                let normal = if distance > f64::EPSILON {
                    delta / distance
                } else {
                    DVec3::Y
                };
                Some(ManifoldEntry {
                    shape_a: a.shape_ref,
                    shape_b: b.shape_ref,
                    normal,
                    point_a: a.center + normal * ra,
                    point_b: b.center - normal * rb,
                    depth,
                    eff_radius: ra * rb / (ra + rb),
                })
            }
            (ColliderShape::Plane { .. }, ColliderShape::Sphere { radius }) => {
                let normal = a.world_normal;
                let height = (b.center - a.center).dot(normal);
                let depth = radius - height;
                if depth < -margin {
                    return None;
                }
                Some(ManifoldEntry {
                    shape_a: a.shape_ref,
                    shape_b: b.shape_ref,
                    normal,
                    point_a: b.center - normal * height,
                    point_b: b.center - normal * radius,
                    depth,
                    eff_radius: radius,
                })
            }
            (ColliderShape::Sphere { .. }, ColliderShape::Plane { .. }) => Self::collide(b, a, margin),
            (ColliderShape::Plane { .. }, ColliderShape::Plane { .. }) => None,
        }
    }
}

impl CollisionBackend for SphereBackend {
    fn name(&self) -> &str {
        "sphere_backend"
    }

    fn detect(&self, bodies: &Arena<RigidBody>, settings: &CollisionSettings) -> Vec<ManifoldEntry> {
        let margin = self.search_margin + settings.collision_envelope;
        let placed = Self::place(bodies);
        let mut entries = Vec::new();
        for (i, a) in placed.iter().enumerate() {
            for b in &placed[i + 1..] {
                if a.shape_ref.body == b.shape_ref.body || (a.fixed && b.fixed) {
                    continue;
                }
                if let Some(entry) = Self::collide(a, b, margin) {
                    entries.push(entry);
                }
            }
        }
        entries
    }
}
