//! Bodies, node containers, joints, and the flat state buffers they feed.

pub mod collider;
pub mod constraints;
pub mod containers;
pub mod data_manager;
pub mod rigidbody;
pub mod soa;
pub mod types;

pub use collider::{ColliderShape, CollisionModel, CollisionShape};
pub use constraints::{Joint, JointKind};
pub use containers::{FeaContainer, NodeContainer, NodeState, Spring, ThreeDofContainer};
pub use data_manager::{BodyIndex, DataManager, ForceQuery, HostData, SolverMeasures};
pub use rigidbody::{BodyVariables, RigidBody};
pub use soa::{ContactBuffers, ContactRecord, RigidBuffers};
pub use types::{MassProperties, Material, Transform, Velocity};
