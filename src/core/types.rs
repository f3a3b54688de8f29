use glam::{DMat3, DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Position and orientation of a body frame in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: DVec3,
    pub rotation: DQuat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
        }
    }
}

impl Transform {
    pub fn from_position(position: DVec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Maps a body-frame point into world space.
    pub fn point_to_world(&self, local: DVec3) -> DVec3 {
        self.position + self.rotation * local
    }

    /// World-oriented offset of a body-frame point from the body center.
    pub fn offset_to_world(&self, local: DVec3) -> DVec3 {
        self.rotation * local
    }
}

/// Linear and angular velocity of a rigid body, both in world frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: DVec3,
    pub angular: DVec3,
}

/// Mass and body-frame inertia tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f64,
    pub inertia: DMat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            inertia: DMat3::IDENTITY,
        }
    }
}

impl MassProperties {
    pub fn solid_sphere(radius: f64, mass: f64) -> Self {
        Self {
            mass,
            inertia: crate::utils::math::inertia_sphere(radius, mass),
        }
    }

    pub fn inverse_mass(&self) -> f64 {
        if self.mass.abs() < f64::EPSILON {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    pub fn inverse_inertia(&self) -> DMat3 {
        if self.inertia.determinant().abs() < f64::EPSILON {
            DMat3::ZERO
        } else {
            self.inertia.inverse()
        }
    }
}

/// Surface coefficients read by the contact pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    /// Coulomb coefficient used for the friction cone.
    pub sliding_friction: f64,
    /// Adhesive force a contact resists before separating, in newtons.
    pub cohesion: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            sliding_friction: 0.6,
            cohesion: 0.0,
        }
    }
}

impl Material {
    pub fn frictionless() -> Self {
        Self {
            sliding_friction: 0.0,
            cohesion: 0.0,
        }
    }

    pub fn rubber() -> Self {
        Self {
            sliding_friction: 1.0,
            cohesion: 0.0,
        }
    }

    pub fn ice() -> Self {
        Self {
            sliding_friction: 0.03,
            cohesion: 0.0,
        }
    }

    pub fn with_cohesion(mut self, cohesion: f64) -> Self {
        self.cohesion = cohesion;
        self
    }

    /// Coefficients of a contact between two surfaces; the weaker one wins.
    pub fn combine(a: &Self, b: &Self) -> Self {
        Self {
            sliding_friction: a.sliding_friction.min(b.sliding_friction),
            cohesion: a.cohesion.min(b.cohesion),
        }
    }
}
