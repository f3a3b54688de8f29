//! Boundary with the collision detection backend.

use log::debug;

use super::{
    contact::{ContactInfo, ContactSink, ManifoldEntry},
    narrowphase::SphereBackend,
};
use crate::{
    config::CollisionSettings,
    core::rigidbody::RigidBody,
    utils::allocator::Arena,
};

/// Broad- and narrow-phase detection. Implementations report every contact
/// point of the current configuration, including near misses within the
/// collision envelope (negative depth).
pub trait CollisionBackend: Send + Sync {
    fn name(&self) -> &str;

    fn detect(&self, bodies: &Arena<RigidBody>, settings: &CollisionSettings) -> Vec<ManifoldEntry>;
}

/// Runs a backend and keeps the manifold entries the solver may use.
pub struct CollisionSystem {
    backend: Box<dyn CollisionBackend>,
    manifold: Vec<ManifoldEntry>,
    dropped: usize,
}

impl Default for CollisionSystem {
    fn default() -> Self {
        Self::new(SphereBackend::default())
    }
}

impl std::fmt::Debug for CollisionSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionSystem")
            .field("backend", &self.backend.name())
            .field("manifold", &self.manifold.len())
            .finish()
    }
}

impl CollisionSystem {
    pub fn new<B: CollisionBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Box::new(backend),
            manifold: Vec::new(),
            dropped: 0,
        }
    }

    pub fn set_backend<B: CollisionBackend + 'static>(&mut self, backend: B) {
        self.backend = Box::new(backend);
        self.manifold.clear();
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Detects contacts. Entries naming a body that is missing, has no
    /// collision geometry, or has collision disabled are dropped, as are
    /// entries separated by more than the envelope.
    pub fn run(&mut self, bodies: &Arena<RigidBody>, settings: &CollisionSettings) {
        let detected = self.backend.detect(bodies, settings);
        let total = detected.len();
        let collides = |entry: &ManifoldEntry| {
            [entry.shape_a.body, entry.shape_b.body].iter().all(|id| {
                bodies
                    .get(*id)
                    .is_some_and(|body| body.collide && body.has_geometry())
            })
        };
        self.manifold = detected
            .into_iter()
            .filter(|entry| entry.depth >= -settings.collision_envelope && collides(entry))
            .collect();
        self.dropped = total - self.manifold.len();
        debug!(
            "{}: {} contact(s), {} dropped",
            self.backend.name(),
            self.manifold.len(),
            self.dropped
        );
    }

    pub fn manifold(&self) -> &[ManifoldEntry] {
        &self.manifold
    }

    pub fn num_contacts(&self) -> usize {
        self.manifold.len()
    }

    /// Entries rejected by the last [`run`](Self::run).
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Hands the kept contacts to `sink` in one bracketed batch.
    pub fn report_contacts(&self, sink: &mut dyn ContactSink) {
        sink.begin_add_contact(self.manifold.len());
        for entry in &self.manifold {
            sink.add_contact(&ContactInfo::from(entry));
        }
        sink.end_add_contact();
    }
}
