use crate::utils::allocator::EntityId;
use glam::{DMat3, DQuat, DVec3};

/// Structure-of-arrays mirror of the live rigid bodies in dense order.
///
/// Index `i` in every array refers to the same body. The arrays are
/// resized together; nothing else may change their lengths.
#[derive(Debug, Default, Clone)]
pub struct RigidBuffers {
    pub ids: Vec<EntityId>,
    pub pos: Vec<DVec3>,
    pub rot: Vec<DQuat>,
    pub active: Vec<bool>,
    pub collide: Vec<bool>,
    pub inv_mass: Vec<f64>,
    pub inv_inertia: Vec<DMat3>,
    /// Material surface cache, filled from each body's first shape.
    pub sliding_friction: Vec<f64>,
    pub cohesion: Vec<f64>,
}

impl RigidBuffers {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn resize(&mut self, count: usize) {
        self.ids.resize(count, EntityId::NULL);
        self.pos.resize(count, DVec3::ZERO);
        self.rot.resize(count, DQuat::IDENTITY);
        self.active.resize(count, false);
        self.collide.resize(count, false);
        self.inv_mass.resize(count, 0.0);
        self.inv_inertia.resize(count, DMat3::ZERO);
        self.resize_material_surface(count);
    }

    /// Appends a zeroed slot for a newly added body, material surface data
    /// included. Update fills it once Setup has placed the body.
    pub fn add_material_surface_data(&mut self) {
        self.resize(self.len() + 1);
    }

    /// Drops the slot of a removed body, keeping the others in order.
    pub fn remove_slot(&mut self, index: usize) {
        self.ids.remove(index);
        self.pos.remove(index);
        self.rot.remove(index);
        self.active.remove(index);
        self.collide.remove(index);
        self.inv_mass.remove(index);
        self.inv_inertia.remove(index);
        self.sliding_friction.remove(index);
        self.cohesion.remove(index);
    }

    fn resize_material_surface(&mut self, count: usize) {
        self.sliding_friction.resize(count, 0.0);
        self.cohesion.resize(count, 0.0);
    }

    pub fn is_aligned(&self) -> bool {
        let n = self.ids.len();
        [
            self.pos.len(),
            self.rot.len(),
            self.active.len(),
            self.collide.len(),
            self.inv_mass.len(),
            self.inv_inertia.len(),
            self.sliding_friction.len(),
            self.cohesion.len(),
        ]
        .iter()
        .all(|len| *len == n)
    }
}

/// One normalized contact as stored in [`ContactBuffers`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactRecord {
    /// Dense body indices.
    pub bodies: (usize, usize),
    pub ids: (EntityId, EntityId),
    /// Unit normal pointing from the first body towards the second.
    pub normal: DVec3,
    /// Contact points as world-oriented offsets from each body center.
    pub cpt_a: DVec3,
    pub cpt_b: DVec3,
    /// Signed penetration; negative means separated within the envelope.
    pub depth: f64,
    pub eff_radius: f64,
    pub friction: f64,
    pub cohesion: f64,
}

/// Index-parallel contact arrays, rebuilt every step.
#[derive(Debug, Default, Clone)]
pub struct ContactBuffers {
    pub bids: Vec<(usize, usize)>,
    pub ids: Vec<(EntityId, EntityId)>,
    pub norm: Vec<DVec3>,
    pub cpta: Vec<DVec3>,
    pub cptb: Vec<DVec3>,
    pub dpth: Vec<f64>,
    pub erad: Vec<f64>,
    pub fric: Vec<f64>,
    pub coh: Vec<f64>,
}

impl ContactBuffers {
    pub fn len(&self) -> usize {
        self.bids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }

    pub fn clear(&mut self) {
        self.resize(0);
    }

    pub fn reserve(&mut self, additional: usize) {
        self.bids.reserve(additional);
        self.ids.reserve(additional);
        self.norm.reserve(additional);
        self.cpta.reserve(additional);
        self.cptb.reserve(additional);
        self.dpth.reserve(additional);
        self.erad.reserve(additional);
        self.fric.reserve(additional);
        self.coh.reserve(additional);
    }

    /// Resizes every array in one go so readers never see mixed lengths.
    pub fn resize(&mut self, count: usize) {
        self.bids.resize(count, (0, 0));
        self.ids.resize(count, (EntityId::NULL, EntityId::NULL));
        self.norm.resize(count, DVec3::ZERO);
        self.cpta.resize(count, DVec3::ZERO);
        self.cptb.resize(count, DVec3::ZERO);
        self.dpth.resize(count, 0.0);
        self.erad.resize(count, 0.0);
        self.fric.resize(count, 0.0);
        self.coh.resize(count, 0.0);
    }

    pub fn push(&mut self, record: ContactRecord) {
        self.bids.push(record.bodies);
        self.ids.push(record.ids);
        self.norm.push(record.normal);
        self.cpta.push(record.cpt_a);
        self.cptb.push(record.cpt_b);
        self.dpth.push(record.depth);
        self.erad.push(record.eff_radius);
        self.fric.push(record.friction);
        self.coh.push(record.cohesion);
    }

    pub fn get(&self, index: usize) -> Option<ContactRecord> {
        if index >= self.len() {
            return None;
        }
        Some(ContactRecord {
            bodies: self.bids[index],
            ids: self.ids[index],
            normal: self.norm[index],
            cpt_a: self.cpta[index],
            cpt_b: self.cptb[index],
            depth: self.dpth[index],
            eff_radius: self.erad[index],
            friction: self.fric[index],
            cohesion: self.coh[index],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = ContactRecord> + '_ {
        (0..self.len()).filter_map(move |index| self.get(index))
    }

    pub fn is_aligned(&self) -> bool {
        let n = self.bids.len();
        [
            self.ids.len(),
            self.norm.len(),
            self.cpta.len(),
            self.cptb.len(),
            self.dpth.len(),
            self.erad.len(),
            self.fric.len(),
            self.coh.len(),
        ]
        .iter()
        .all(|len| *len == n)
    }
}
