//! NSC Core – non-smooth contact constraint solving for multibody dynamics.
//!
//! Each step gathers body state into flat buffers, detects contacts,
//! assembles the constraint Jacobian with its time-integration weights, and
//! solves the cone complementarity problem for contact and joint impulses
//! with one of several iterative methods. Contact forces can then be
//! recovered per body.
//!
//! ```no_run
//! use nsc_core::{Material, NscSystem, RigidBody, RunSettings};
//! use glam::DVec3;
//!
//! let mut system = NscSystem::new(RunSettings::default())?;
//! let ground = system.add_body(RigidBody::sphere(DVec3::ZERO, 0.5, 1.0, Material::default()).fixed());
//! let ball = system.add_body(RigidBody::sphere(DVec3::Y, 0.5, 1.0, Material::default()));
//! system.do_step();
//! system.calculate_contact_forces();
//! let force = system.get_body_contact_force(ball)?;
//! # let _ = (ground, force);
//! # Ok::<(), nsc_core::NscError>(())
//! ```

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::{DMat3, DQuat, DVec3};

pub use collision::{CollisionBackend, ManifoldEntry, ShapeRef, SphereBackend};
pub use config::{CollisionSettings, RunSettings, SolverMode, SolverSettings, SolverType, SystemType};
pub use core::{
    collider::{ColliderShape, CollisionModel},
    constraints::Joint,
    containers::{FeaContainer, NodeContainer, NodeState, ThreeDofContainer},
    data_manager::{DataManager, ForceQuery, SolverMeasures},
    rigidbody::RigidBody,
    types::{MassProperties, Material, Transform, Velocity},
};
pub use dynamics::{
    forces::{DragForce, ForceGenerator, GravityForce},
    solver::{ComplementaritySolver, SolveReport},
};
pub use error::{NscError, Result};
pub use utils::allocator::EntityId;
pub use world::NscSystem;
