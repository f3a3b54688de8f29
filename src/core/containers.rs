//! Containers of 3-DOF nodes: FEA spring networks and granular particles.

use glam::DVec3;
use log::info;
use serde::{Deserialize, Serialize};

use crate::dynamics::{
    assembly::{ItemContext, PhysicsItem, ScaleFactors},
    descriptor::{
        ConstraintRow, JacobianBlock, RowKind, SystemDescriptor, VariableBlock, VariableKey,
    },
};

/// A point mass with three translational degrees of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub position: DVec3,
    pub velocity: DVec3,
    pub mass: f64,
    pub fixed: bool,
}

impl NodeState {
    pub fn new(position: DVec3, mass: f64) -> Self {
        Self {
            position,
            velocity: DVec3::ZERO,
            mass,
            fixed: false,
        }
    }

    pub fn inverse_mass(&self) -> f64 {
        if self.fixed || self.mass <= 0.0 {
            0.0
        } else {
            1.0 / self.mass
        }
    }
}

/// Per-step variable accumulators of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct NodeVariables {
    velocity: DVec3,
    force: DVec3,
}

/// Spring-damper between two FEA nodes, solved as a compliant bilateral row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spring {
    pub nodes: (usize, usize),
    pub stiffness: f64,
    pub damping: f64,
    /// Filled from the initial configuration by `initialize` when unset.
    pub rest_length: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
struct SpringGeometry {
    nodes: (usize, usize),
    direction: DVec3,
    stretch: f64,
    stiffness: f64,
    damping: f64,
}

/// Mass-spring network of 3-DOF nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaContainer {
    pub nodes: Vec<NodeState>,
    pub springs: Vec<Spring>,
    #[serde(skip)]
    initialized: bool,
    #[serde(skip)]
    variables: Vec<NodeVariables>,
    #[serde(skip)]
    geometry: Vec<SpringGeometry>,
    #[serde(skip)]
    bias: Vec<f64>,
    #[serde(skip)]
    rows: Vec<ConstraintRow>,
}

impl FeaContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: NodeState) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn add_spring(&mut self, a: usize, b: usize, stiffness: f64, damping: f64) -> usize {
        self.springs.push(Spring {
            nodes: (a, b),
            stiffness,
            damping,
            rest_length: None,
        });
        self.springs.len() - 1
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Captures rest lengths from the current node positions.
    pub fn initialize(&mut self) {
        for spring in &mut self.springs {
            if spring.rest_length.is_none() {
                let (a, b) = spring.nodes;
                spring.rest_length =
                    Some((self.nodes[b].position - self.nodes[a].position).length());
            }
        }
        self.initialized = true;
        info!(
            "fea container initialized: {} nodes, {} springs",
            self.nodes.len(),
            self.springs.len()
        );
    }

    /// Refreshes spring directions and stretches from node positions.
    /// Degenerate springs (coincident nodes) produce no row this step.
    pub fn update(&mut self) {
        self.geometry.clear();
        for spring in &self.springs {
            let (a, b) = spring.nodes;
            let gap = self.nodes[b].position - self.nodes[a].position;
            let length = gap.length();
            if length < f64::EPSILON {
                continue;
            }
            self.geometry.push(SpringGeometry {
                nodes: spring.nodes,
                direction: gap / length,
                stretch: length - spring.rest_length.unwrap_or(length),
                stiffness: spring.stiffness,
                damping: spring.damping,
            });
        }
    }

    pub fn rows(&self) -> &[ConstraintRow] {
        &self.rows
    }
}

impl PhysicsItem for FeaContainer {
    fn reset_variables(&mut self) {
        self.variables.clear();
        self.variables
            .resize(self.nodes.len(), NodeVariables::default());
    }

    fn reset_bias(&mut self) {
        self.bias.clear();
        self.bias.resize(self.geometry.len(), 0.0);
    }

    // Springs are force elements; their residual is weighted later by the
    // stiffness share and is never clamped.
    fn load_residual(&mut self, c_factor: f64, _recovery_speed: f64) {
        for (bias, spring) in self.bias.iter_mut().zip(&self.geometry) {
            *bias += c_factor * spring.stretch;
        }
    }

    fn load_velocity(&mut self, _ctx: &ItemContext<'_>) {
        self.variables.resize(self.nodes.len(), NodeVariables::default());
        for (vars, node) in self.variables.iter_mut().zip(&self.nodes) {
            vars.velocity = node.velocity;
        }
    }

    fn accumulate_inertial(&mut self) {
        for (vars, node) in self.variables.iter_mut().zip(&self.nodes) {
            if !node.fixed {
                vars.force += node.mass * vars.velocity;
            }
        }
    }

    fn load_jacobians(&mut self, _ctx: &ItemContext<'_>) {
        self.rows = self
            .geometry
            .iter()
            .zip(&self.bias)
            .map(|(spring, bias)| {
                let (a, b) = spring.nodes;
                let mut row = ConstraintRow::new(
                    RowKind::Bilateral,
                    vec![
                        JacobianBlock::node(VariableKey::FeaNode(a), -spring.direction),
                        JacobianBlock::node(VariableKey::FeaNode(b), spring.direction),
                    ],
                );
                row.bias = *bias;
                row
            })
            .collect();
    }

    fn load_forces(&mut self, f_factor: f64, ctx: &ItemContext<'_>) {
        self.variables.resize(self.nodes.len(), NodeVariables::default());
        let gravity = ctx.forces.gravity();
        for (vars, node) in self.variables.iter_mut().zip(&self.nodes) {
            if !node.fixed {
                vars.force += f_factor * node.mass * gravity;
            }
        }
    }

    fn load_stiffness(&mut self, factors: &ScaleFactors) {
        // Springs that are neither stiff nor damped would need an infinite
        // compliance; they are dropped from the system.
        let mut kept = Vec::with_capacity(self.rows.len());
        for (mut row, spring) in self.rows.drain(..).zip(&self.geometry) {
            let weight = factors.k * spring.stiffness + factors.r * spring.damping;
            if weight <= 0.0 {
                continue;
            }
            row.compliance = 1.0 / weight;
            row.bias *= factors.k * spring.stiffness / weight;
            kept.push(row);
        }
        self.rows = kept;
    }

    fn inject_variables(&self, _ctx: &ItemContext<'_>, descriptor: &mut SystemDescriptor) {
        for (k, node) in self.nodes.iter().enumerate() {
            let mut block = VariableBlock::node(VariableKey::FeaNode(k), node.inverse_mass());
            if let Some(vars) = self.variables.get(k) {
                block.set_velocity(vars.velocity, DVec3::ZERO);
                block.add_force(vars.force, DVec3::ZERO);
            }
            descriptor.insert_variables(block);
        }
    }

    fn inject_constraints(&self, _ctx: &ItemContext<'_>, descriptor: &mut SystemDescriptor) {
        for row in &self.rows {
            descriptor.insert_constraint(row.clone());
        }
    }

    fn take_rows(&mut self, out: &mut Vec<ConstraintRow>) {
        out.append(&mut self.rows);
    }
}

/// Free granular particles with three degrees of freedom each.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeContainer {
    pub nodes: Vec<NodeState>,
    /// Particle radius, kept for consumers that render or bin the nodes.
    pub kernel_radius: f64,
    #[serde(skip)]
    initialized: bool,
    #[serde(skip)]
    num_active: usize,
    #[serde(skip)]
    variables: Vec<NodeVariables>,
}

impl NodeContainer {
    pub fn new(kernel_radius: f64) -> Self {
        Self {
            kernel_radius,
            ..Self::default()
        }
    }

    pub fn add_node(&mut self, node: NodeState) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Number of movable nodes found by the last `initialize`.
    pub fn num_active(&self) -> usize {
        self.num_active
    }

    pub fn initialize(&mut self) {
        self.num_active = self.nodes.iter().filter(|node| !node.fixed).count();
        self.initialized = true;
        info!(
            "node container initialized: {} nodes ({} movable), radius {}",
            self.nodes.len(),
            self.num_active,
            self.kernel_radius
        );
    }
}

impl PhysicsItem for NodeContainer {
    fn reset_variables(&mut self) {
        self.variables.clear();
        self.variables
            .resize(self.nodes.len(), NodeVariables::default());
    }

    fn load_velocity(&mut self, _ctx: &ItemContext<'_>) {
        self.variables.resize(self.nodes.len(), NodeVariables::default());
        for (vars, node) in self.variables.iter_mut().zip(&self.nodes) {
            vars.velocity = node.velocity;
        }
    }

    fn accumulate_inertial(&mut self) {
        for (vars, node) in self.variables.iter_mut().zip(&self.nodes) {
            if !node.fixed {
                vars.force += node.mass * vars.velocity;
            }
        }
    }

    fn load_forces(&mut self, f_factor: f64, ctx: &ItemContext<'_>) {
        self.variables.resize(self.nodes.len(), NodeVariables::default());
        let gravity = ctx.forces.gravity();
        for (vars, node) in self.variables.iter_mut().zip(&self.nodes) {
            if !node.fixed {
                vars.force += f_factor * node.mass * gravity;
            }
        }
    }

    fn inject_variables(&self, _ctx: &ItemContext<'_>, descriptor: &mut SystemDescriptor) {
        for (k, node) in self.nodes.iter().enumerate() {
            let mut block = VariableBlock::node(VariableKey::Node(k), node.inverse_mass());
            if let Some(vars) = self.variables.get(k) {
                block.set_velocity(vars.velocity, DVec3::ZERO);
                block.add_force(vars.force, DVec3::ZERO);
            }
            descriptor.insert_variables(block);
        }
    }
}

/// A 3-DOF container handed to the system, routed by its variant.
#[derive(Debug, Clone)]
pub enum ThreeDofContainer {
    Fea(FeaContainer),
    Granular(NodeContainer),
}
