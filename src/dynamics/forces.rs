use crate::core::rigidbody::RigidBody;
use glam::DVec3;

/// External force generator evaluated once per step for every movable body.
pub trait ForceGenerator: Send + Sync {
    /// Adds this generator's force and torque to the body's accumulators.
    fn apply(&self, body: &mut RigidBody);
}

/// Uniform gravitational field.
#[derive(Debug, Clone, Copy)]
pub struct GravityForce {
    pub gravity: DVec3,
}

impl GravityForce {
    pub fn new(gravity: DVec3) -> Self {
        Self { gravity }
    }
}

impl ForceGenerator for GravityForce {
    fn apply(&self, body: &mut RigidBody) {
        body.variables.force += self.gravity * body.mass_properties.mass;
    }
}

/// Quadratic drag resisting the direction of motion.
#[derive(Debug, Clone, Copy)]
pub struct DragForce {
    pub drag_coefficient: f64,
}

impl ForceGenerator for DragForce {
    fn apply(&self, body: &mut RigidBody) {
        let speed = body.velocity.linear.length();
        if speed < 1e-9 {
            return;
        }
        body.variables.force -= body.velocity.linear * speed * self.drag_coefficient;
    }
}

/// Gravity plus any user generators.
pub struct ForceRegistry {
    gravity: GravityForce,
    forces: Vec<Box<dyn ForceGenerator>>,
}

impl Default for ForceRegistry {
    fn default() -> Self {
        Self::new(DVec3::from_array(crate::config::DEFAULT_GRAVITY))
    }
}

impl std::fmt::Debug for ForceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForceRegistry")
            .field("gravity", &self.gravity.gravity)
            .field("generators", &self.forces.len())
            .finish()
    }
}

impl ForceRegistry {
    pub fn new(gravity: DVec3) -> Self {
        Self {
            gravity: GravityForce::new(gravity),
            forces: Vec::new(),
        }
    }

    pub fn gravity(&self) -> DVec3 {
        self.gravity.gravity
    }

    pub fn set_gravity(&mut self, gravity: DVec3) {
        self.gravity.gravity = gravity;
    }

    pub fn add_force<F: ForceGenerator + 'static>(&mut self, force: F) {
        self.forces.push(Box::new(force));
    }

    /// Accumulates applied loads, gyroscopic torque, gravity, and every
    /// registered generator into `body.variables`. Fixed bodies get nothing.
    pub fn accumulate(&self, body: &mut RigidBody) {
        if body.fixed {
            return;
        }
        body.variables.force += body.applied_force;
        body.variables.torque += body.applied_torque + body.gyroscopic_torque();
        self.gravity.apply(body);
        for force in &self.forces {
            force.apply(body);
        }
    }
}
