use super::{
    collider::CollisionModel,
    types::{MassProperties, Material, Transform, Velocity},
};
use crate::utils::{allocator::EntityId, math::world_inverse_inertia};
use glam::{DMat3, DVec3};

/// Per-step accumulators of a body's variables, filled during Update or by
/// the generic assembly protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyVariables {
    pub velocity: Velocity,
    pub force: DVec3,
    pub torque: DVec3,
}

/// Rigid body record. The simulation owns it through the body arena; solver
/// stages only hold its [`EntityId`] or its dense index.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub id: EntityId,
    pub transform: Transform,
    pub velocity: Velocity,
    pub mass_properties: MassProperties,
    /// Fixed bodies keep their state and contribute no inverse mass.
    pub fixed: bool,
    /// Bodies with collision disabled are ignored by the collision adapter.
    pub collide: bool,
    pub collision_model: Option<CollisionModel>,
    /// Persistent loads applied every step until cleared.
    pub applied_force: DVec3,
    pub applied_torque: DVec3,
    pub variables: BodyVariables,
    inverse_mass: f64,
    inverse_inertia: DMat3,
}

impl Default for RigidBody {
    fn default() -> Self {
        let mut body = Self {
            id: EntityId::default(),
            transform: Transform::default(),
            velocity: Velocity::default(),
            mass_properties: MassProperties::default(),
            fixed: false,
            collide: true,
            collision_model: None,
            applied_force: DVec3::ZERO,
            applied_torque: DVec3::ZERO,
            variables: BodyVariables::default(),
            inverse_mass: 1.0,
            inverse_inertia: DMat3::IDENTITY,
        };
        body.recompute_inverses();
        body
    }
}

impl RigidBody {
    pub fn new(position: DVec3) -> Self {
        Self {
            transform: Transform::from_position(position),
            ..Self::default()
        }
    }

    /// Solid sphere with a matching collision shape.
    pub fn sphere(position: DVec3, radius: f64, mass: f64, material: Material) -> Self {
        let mut body = Self::new(position);
        body.set_mass_properties(MassProperties::solid_sphere(radius, mass));
        body.collision_model = Some(CollisionModel::sphere(radius, material));
        body
    }

    pub fn with_collision_model(mut self, model: CollisionModel) -> Self {
        self.collision_model = Some(model);
        self
    }

    pub fn with_velocity(mut self, linear: DVec3, angular: DVec3) -> Self {
        self.velocity = Velocity { linear, angular };
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    pub fn set_mass_properties(&mut self, props: MassProperties) {
        self.mass_properties = props;
        self.recompute_inverses();
    }

    pub fn apply_force(&mut self, force: DVec3) {
        self.applied_force += force;
    }

    pub fn apply_torque(&mut self, torque: DVec3) {
        self.applied_torque += torque;
    }

    pub fn clear_applied_loads(&mut self) {
        self.applied_force = DVec3::ZERO;
        self.applied_torque = DVec3::ZERO;
    }

    pub fn reset_variables(&mut self) {
        self.variables = BodyVariables::default();
    }

    pub fn has_geometry(&self) -> bool {
        self.collision_model
            .as_ref()
            .is_some_and(|model| !model.is_empty())
    }

    pub fn first_material(&self) -> Option<Material> {
        self.collision_model
            .as_ref()
            .and_then(CollisionModel::first_material)
    }

    pub fn inverse_mass(&self) -> f64 {
        if self.fixed {
            0.0
        } else {
            self.inverse_mass
        }
    }

    /// Inverse inertia rotated into world frame, zero for fixed bodies.
    pub fn world_inverse_inertia(&self) -> DMat3 {
        if self.fixed {
            DMat3::ZERO
        } else {
            world_inverse_inertia(self.transform.rotation, self.inverse_inertia)
        }
    }

    /// Gyroscopic torque `-ω × (I ω)` in world frame.
    pub fn gyroscopic_torque(&self) -> DVec3 {
        let r = DMat3::from_quat(self.transform.rotation);
        let inertia = r * self.mass_properties.inertia * r.transpose();
        let omega = self.velocity.angular;
        -omega.cross(inertia * omega)
    }

    fn recompute_inverses(&mut self) {
        self.inverse_mass = self.mass_properties.inverse_mass();
        self.inverse_inertia = self.mass_properties.inverse_inertia();
    }
}
