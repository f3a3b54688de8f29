use super::types::{Material, Transform};
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Geometry understood by the built-in narrow phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ColliderShape {
    Sphere {
        radius: f64,
    },
    /// Half-space bounded by the plane through the shape origin; `normal`
    /// is expressed in the body frame and points out of the solid side.
    Plane {
        normal: DVec3,
    },
}

/// A shape attached to a body at a body-frame offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionShape {
    pub shape: ColliderShape,
    pub offset: DVec3,
    pub material: Material,
}

impl CollisionShape {
    pub fn world_center(&self, body: &Transform) -> DVec3 {
        body.point_to_world(self.offset)
    }
}

/// Ordered list of shapes owned by one body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollisionModel {
    pub shapes: Vec<CollisionShape>,
}

impl CollisionModel {
    pub fn builder() -> CollisionModelBuilder {
        CollisionModelBuilder::default()
    }

    pub fn sphere(radius: f64, material: Material) -> Self {
        Self::builder().sphere(radius, DVec3::ZERO, material).build()
    }

    pub fn plane(normal: DVec3, material: Material) -> Self {
        Self::builder().plane(normal, DVec3::ZERO, material).build()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Material of the first shape, which feeds the per-body surface cache.
    pub fn first_material(&self) -> Option<Material> {
        self.shapes.first().map(|shape| shape.material)
    }
}

#[derive(Debug, Default)]
pub struct CollisionModelBuilder {
    shapes: Vec<CollisionShape>,
}

impl CollisionModelBuilder {
    pub fn sphere(mut self, radius: f64, offset: DVec3, material: Material) -> Self {
        self.shapes.push(CollisionShape {
            shape: ColliderShape::Sphere { radius },
            offset,
            material,
        });
        self
    }

    pub fn plane(mut self, normal: DVec3, offset: DVec3, material: Material) -> Self {
        self.shapes.push(CollisionShape {
            shape: ColliderShape::Plane {
                normal: normal.normalize_or_zero(),
            },
            offset,
            material,
        });
        self
    }

    pub fn build(self) -> CollisionModel {
        CollisionModel {
            shapes: self.shapes,
        }
    }
}
