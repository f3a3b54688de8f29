//! Collision adapter: runs a detection backend and normalizes its contacts
//! into the Data Manager's contact arrays.

pub mod backend;
pub mod contact;
pub mod narrowphase;

pub use backend::{CollisionBackend, CollisionSystem};
pub use contact::{ContactContainer, ContactInfo, ContactList, ContactSink, ManifoldEntry, ShapeRef};
pub use narrowphase::SphereBackend;
