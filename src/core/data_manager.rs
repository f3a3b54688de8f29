//! Flat per-simulation state shared by every stage of a step.

use glam::DVec3;
use log::trace;
use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;

use super::{
    constraints::Joint,
    containers::{FeaContainer, NodeContainer},
    rigidbody::RigidBody,
    soa::{ContactBuffers, RigidBuffers},
};
use crate::{
    config::{RunSettings, SolverType},
    dynamics::{
        descriptor::{DofLayout, RowKind},
        forces::ForceRegistry,
        schur::InverseMass,
    },
    utils::{
        allocator::{Arena, EntityId},
        profiling::TimerRegistry,
    },
};

/// Maps body handles to the dense order used by every solver array.
///
/// Rebuilt during Setup from the arena's slot order.
#[derive(Debug, Clone, Default)]
pub struct BodyIndex {
    ids: Vec<EntityId>,
    dense: Vec<Option<usize>>,
}

impl BodyIndex {
    pub fn rebuild(&mut self, bodies: &Arena<RigidBody>) {
        self.ids.clear();
        self.dense.clear();
        self.dense.resize(bodies.slot_count(), None);
        for id in bodies.ids() {
            self.dense[id.index()] = Some(self.ids.len());
            self.ids.push(id);
        }
    }

    pub fn dense(&self, id: EntityId) -> Option<usize> {
        let index = self.dense.get(id.index()).copied().flatten()?;
        (self.ids[index] == id).then_some(index)
    }

    pub fn id(&self, index: usize) -> Option<EntityId> {
        self.ids.get(index).copied()
    }

    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Vectors and matrices of the NSC system.
#[derive(Debug, Clone)]
pub struct HostData {
    pub rigid: RigidBuffers,
    pub contacts: ContactBuffers,
    pub layout: DofLayout,
    /// Generalized velocities; after a solve, the constrained velocities.
    pub v: DVector<f64>,
    /// External force impulses `h f`.
    pub hf: DVector<f64>,
    /// Unconstrained velocities `v + M^-1 h f` of the last solve.
    pub v_free: DVector<f64>,
    pub m_inv: InverseMass,
    /// Constraint Jacobian, dofs x constraints, unilateral block first.
    pub d: CscMatrix<f64>,
    pub b: DVector<f64>,
    pub e: DVector<f64>,
    /// Right-hand side `D^T (v + M^-1 h f) + b` of the last solve.
    pub r: DVector<f64>,
    pub gamma: DVector<f64>,
    pub row_kinds: Vec<RowKind>,
    /// Contact force and torque per body, 6 entries each.
    pub fc: DVector<f64>,
}

impl Default for HostData {
    fn default() -> Self {
        Self {
            rigid: RigidBuffers::default(),
            contacts: ContactBuffers::default(),
            layout: DofLayout::default(),
            v: DVector::zeros(0),
            hf: DVector::zeros(0),
            v_free: DVector::zeros(0),
            m_inv: InverseMass::default(),
            d: CscMatrix::zeros(0, 0),
            b: DVector::zeros(0),
            e: DVector::zeros(0),
            r: DVector::zeros(0),
            gamma: DVector::zeros(0),
            row_kinds: Vec::new(),
            fc: DVector::zeros(0),
        }
    }
}

/// Outcome of the most recent solves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverMeasures {
    pub solver_type: SolverType,
    pub iterations: usize,
    pub residual: f64,
    pub converged: bool,
    /// Steps that hit the iteration cap since construction.
    pub non_converged_steps: usize,
}

impl Default for SolverMeasures {
    fn default() -> Self {
        Self {
            solver_type: SolverType::Apgd,
            iterations: 0,
            residual: 0.0,
            converged: true,
            non_converged_steps: 0,
        }
    }
}

/// Result of a contact force or torque query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ForceQuery {
    Valid(DVec3),
    /// Forces were not recovered since the last change to the system.
    NotComputed,
}

impl ForceQuery {
    pub fn valid(self) -> Option<DVec3> {
        match self {
            ForceQuery::Valid(value) => Some(value),
            ForceQuery::NotComputed => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ForceQuery::Valid(_))
    }
}

/// Owner of the bodies, joints, node containers, and every flat buffer a
/// step reads or writes. Stages hold indices into it, never references
/// across steps.
#[derive(Debug)]
pub struct DataManager {
    pub bodies: Arena<RigidBody>,
    pub joints: Vec<Joint>,
    pub fea_container: Option<FeaContainer>,
    pub node_container: Option<NodeContainer>,
    pub host: HostData,
    pub settings: RunSettings,
    pub timers: TimerRegistry,
    pub measures: SolverMeasures,
    pub body_index: BodyIndex,
    pub forces: ForceRegistry,
    pub num_rigid_bodies: usize,
    pub num_fea_nodes: usize,
    pub num_nodes: usize,
    pub num_rigid_contacts: usize,
    pub num_unilaterals: usize,
    pub num_bilaterals: usize,
    pub num_constraints: usize,
    pub num_dof: usize,
    solved: bool,
    fc_current: bool,
}

impl DataManager {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            bodies: Arena::new(),
            joints: Vec::new(),
            fea_container: None,
            node_container: None,
            host: HostData::default(),
            measures: SolverMeasures {
                solver_type: settings.solver.solver_type,
                ..SolverMeasures::default()
            },
            settings,
            timers: TimerRegistry::new(),
            body_index: BodyIndex::default(),
            forces: ForceRegistry::default(),
            num_rigid_bodies: 0,
            num_fea_nodes: 0,
            num_nodes: 0,
            num_rigid_contacts: 0,
            num_unilaterals: 0,
            num_bilaterals: 0,
            num_constraints: 0,
            num_dof: 0,
            solved: false,
            fc_current: false,
        }
    }

    /// Stores a body and reserves its material surface slot.
    pub fn add_body(&mut self, body: RigidBody) -> EntityId {
        let id = self.bodies.insert(body);
        if let Some(stored) = self.bodies.get_mut(id) {
            stored.id = id;
        }
        self.host.rigid.add_material_surface_data();
        self.invalidate_solution();
        id
    }

    /// Removes a body, its joints, and its rigid buffer slot.
    pub fn remove_body(&mut self, id: EntityId) -> Option<RigidBody> {
        let removed = self.bodies.remove(id)?;
        self.joints
            .retain(|joint| joint.body_a != id && joint.body_b != id);
        match self.body_index.dense(id) {
            Some(index) if index < self.host.rigid.len() => self.host.rigid.remove_slot(index),
            _ => self.host.rigid.resize(self.bodies.len()),
        }
        self.invalidate_solution();
        Some(removed)
    }

    /// Recomputes the dense body order, derived counts, and the dof layout.
    /// Invalidates the contact force cache.
    pub fn setup(&mut self) {
        self.body_index.rebuild(&self.bodies);
        self.num_rigid_bodies = self.body_index.len();
        self.num_fea_nodes = self
            .fea_container
            .as_ref()
            .map_or(0, FeaContainer::num_nodes);
        self.num_nodes = self
            .node_container
            .as_ref()
            .map_or(0, NodeContainer::num_nodes);
        self.host.layout = DofLayout {
            num_bodies: self.num_rigid_bodies,
            num_fea_nodes: self.num_fea_nodes,
            num_nodes: self.num_nodes,
        };
        self.num_dof = self.host.layout.num_dof();
        self.host.rigid.resize(self.num_rigid_bodies);
        self.invalidate_solution();
        trace!(
            "setup: {} bodies, {} fea nodes, {} nodes, {} dofs",
            self.num_rigid_bodies,
            self.num_fea_nodes,
            self.num_nodes,
            self.num_dof
        );
    }

    /// Pushes body, node, and joint state into the flat buffers: poses,
    /// velocities, inverse masses, force impulses, and the material cache.
    pub fn update(&mut self) {
        self.invalidate_solution();
        let step = self.settings.step_size;
        let layout = self.host.layout;
        let num_dof = layout.num_dof();
        let mut v = DVector::zeros(num_dof);
        let mut hf = DVector::zeros(num_dof);
        let mut m_inv = InverseMass {
            layout,
            body_mass: Vec::with_capacity(layout.num_bodies),
            body_inertia: Vec::with_capacity(layout.num_bodies),
            node_mass: Vec::with_capacity(layout.num_fea_nodes + layout.num_nodes),
        };

        for (i, id) in self.body_index.ids().iter().enumerate() {
            let Some(body) = self.bodies.get_mut(*id) else {
                continue;
            };
            body.reset_variables();
            self.forces.accumulate(body);

            let rigid = &mut self.host.rigid;
            rigid.ids[i] = *id;
            rigid.pos[i] = body.transform.position;
            rigid.rot[i] = body.transform.rotation;
            rigid.active[i] = !body.fixed;
            rigid.collide[i] = body.collide;
            rigid.inv_mass[i] = body.inverse_mass();
            rigid.inv_inertia[i] = body.world_inverse_inertia();
            let material = body.first_material().unwrap_or_default();
            rigid.sliding_friction[i] = material.sliding_friction;
            rigid.cohesion[i] = material.cohesion;

            let base = 6 * i;
            let lin = body.velocity.linear;
            let ang = body.velocity.angular;
            let force = body.variables.force * step;
            let torque = body.variables.torque * step;
            for k in 0..3 {
                v[base + k] = lin[k];
                v[base + 3 + k] = ang[k];
                hf[base + k] = force[k];
                hf[base + 3 + k] = torque[k];
            }
            m_inv.body_mass.push(rigid.inv_mass[i]);
            m_inv.body_inertia.push(rigid.inv_inertia[i]);
        }

        let gravity = self.forces.gravity();
        let fea_nodes = self.fea_container.iter().flat_map(|fea| fea.nodes.iter());
        let granular_nodes = self.node_container.iter().flat_map(|nodes| nodes.nodes.iter());
        for (k, node) in fea_nodes.chain(granular_nodes).enumerate() {
            let base = layout.num_rigid_dof() + 3 * k;
            let impulse = if node.fixed {
                DVec3::ZERO
            } else {
                gravity * node.mass * step
            };
            for j in 0..3 {
                v[base + j] = node.velocity[j];
                hf[base + j] = impulse[j];
            }
            m_inv.node_mass.push(node.inverse_mass());
        }

        self.host.v = v;
        self.host.hf = hf;
        self.host.m_inv = m_inv;

        for joint in &mut self.joints {
            joint.update(&self.bodies, &self.body_index);
        }
        if let Some(fea) = self.fea_container.as_mut() {
            fea.update();
        }
    }

    pub fn fc_current(&self) -> bool {
        self.fc_current
    }

    /// Whether `d` and `gamma` hold a solve of the current body set and
    /// contact list.
    pub fn is_solved(&self) -> bool {
        self.solved
    }

    pub(crate) fn mark_solved(&mut self) {
        self.solved = true;
    }

    pub fn invalidate_contact_forces(&mut self) {
        self.fc_current = false;
    }

    /// Drops the last solve along with the forces recovered from it.
    pub fn invalidate_solution(&mut self) {
        self.solved = false;
        self.fc_current = false;
    }

    /// Installs a freshly recovered force cache and marks it current.
    pub fn store_contact_forces(&mut self, fc: DVector<f64>) {
        debug_assert_eq!(fc.len(), 6 * self.num_rigid_bodies);
        self.host.fc = fc;
        self.fc_current = true;
    }

    /// Contact force on the body at dense `index`.
    pub fn body_contact_force(&self, index: usize) -> ForceQuery {
        self.fc_block(6 * index)
    }

    /// Contact torque on the body at dense `index`.
    pub fn body_contact_torque(&self, index: usize) -> ForceQuery {
        self.fc_block(6 * index + 3)
    }

    fn fc_block(&self, start: usize) -> ForceQuery {
        if !self.fc_current || start + 3 > self.host.fc.len() {
            return ForceQuery::NotComputed;
        }
        let fc = &self.host.fc;
        ForceQuery::Valid(DVec3::new(fc[start], fc[start + 1], fc[start + 2]))
    }
}
