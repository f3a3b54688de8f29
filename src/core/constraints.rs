use crate::{
    core::rigidbody::RigidBody,
    dynamics::{
        assembly::{bilateral_bias, ItemContext, PhysicsItem},
        descriptor::{ConstraintRow, JacobianBlock, RowKind, SystemDescriptor},
    },
    utils::allocator::{Arena, EntityId},
};
use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::data_manager::BodyIndex;

/// Supported bilateral joints. Anchors are in each body's frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JointKind {
    /// Pins one point of each body together (3 rows).
    Spherical { pivot_a: DVec3, pivot_b: DVec3 },
    /// Keeps two anchors at a fixed distance (1 row).
    Distance {
        anchor_a: DVec3,
        anchor_b: DVec3,
        distance: f64,
    },
}

/// One scalar equation of a joint at the current configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct JointEquation {
    pub blocks: Vec<JacobianBlock>,
    /// Position-level residual `C`.
    pub violation: f64,
    /// Explicit time derivative `Ct`; zero for scleronomic joints.
    pub rate: f64,
}

/// A joint ("link") between two bodies of the arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Joint {
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub kind: JointKind,
    #[serde(skip)]
    equations: Vec<JointEquation>,
    #[serde(skip)]
    bias: Vec<f64>,
    #[serde(skip)]
    rows: Vec<ConstraintRow>,
}

impl Joint {
    pub fn new(body_a: EntityId, body_b: EntityId, kind: JointKind) -> Self {
        Self {
            body_a,
            body_b,
            kind,
            equations: Vec::new(),
            bias: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn spherical(body_a: EntityId, body_b: EntityId, pivot_a: DVec3, pivot_b: DVec3) -> Self {
        Self::new(body_a, body_b, JointKind::Spherical { pivot_a, pivot_b })
    }

    pub fn distance(
        body_a: EntityId,
        body_b: EntityId,
        anchor_a: DVec3,
        anchor_b: DVec3,
        distance: f64,
    ) -> Self {
        Self::new(
            body_a,
            body_b,
            JointKind::Distance {
                anchor_a,
                anchor_b,
                distance,
            },
        )
    }

    pub fn row_count(&self) -> usize {
        match self.kind {
            JointKind::Spherical { .. } => 3,
            JointKind::Distance { .. } => 1,
        }
    }

    /// Equations at the current body poses. Returns nothing when either
    /// body is gone.
    pub fn evaluate(&self, bodies: &Arena<RigidBody>, index: &BodyIndex) -> Vec<JointEquation> {
        let (Some(a), Some(b)) = (bodies.get(self.body_a), bodies.get(self.body_b)) else {
            return Vec::new();
        };
        let (Some(ia), Some(ib)) = (index.dense(self.body_a), index.dense(self.body_b)) else {
            return Vec::new();
        };

        match self.kind {
            JointKind::Spherical { pivot_a, pivot_b } => {
                let ra = a.transform.offset_to_world(pivot_a);
                let rb = b.transform.offset_to_world(pivot_b);
                let gap = (b.transform.position + rb) - (a.transform.position + ra);
                [DVec3::X, DVec3::Y, DVec3::Z]
                    .into_iter()
                    .map(|axis| JointEquation {
                        blocks: vec![
                            JacobianBlock::body(ia, -axis, -ra.cross(axis)),
                            JacobianBlock::body(ib, axis, rb.cross(axis)),
                        ],
                        violation: gap.dot(axis),
                        rate: 0.0,
                    })
                    .collect()
            }
            JointKind::Distance {
                anchor_a,
                anchor_b,
                distance,
            } => {
                let ra = a.transform.offset_to_world(anchor_a);
                let rb = b.transform.offset_to_world(anchor_b);
                let gap = (b.transform.position + rb) - (a.transform.position + ra);
                let length = gap.length();
                if length < f64::EPSILON {
                    return Vec::new();
                }
                let n = gap / length;
                vec![JointEquation {
                    blocks: vec![
                        JacobianBlock::body(ia, -n, -ra.cross(n)),
                        JacobianBlock::body(ib, n, rb.cross(n)),
                    ],
                    violation: length - distance,
                    rate: 0.0,
                }]
            }
        }
    }

    /// Refreshes the cached equations from the current body poses.
    pub fn update(&mut self, bodies: &Arena<RigidBody>, index: &BodyIndex) {
        self.equations = self.evaluate(bodies, index);
    }

    pub fn equations(&self) -> &[JointEquation] {
        &self.equations
    }

    /// Rows produced by the last assembly pass.
    pub fn rows(&self) -> &[ConstraintRow] {
        &self.rows
    }
}

impl PhysicsItem for Joint {
    fn reset_bias(&mut self) {
        self.bias.clear();
        self.bias.resize(self.equations.len(), 0.0);
    }

    fn load_residual(&mut self, c_factor: f64, recovery_speed: f64) {
        for (bias, equation) in self.bias.iter_mut().zip(&self.equations) {
            *bias += bilateral_bias(c_factor, equation.violation, recovery_speed);
        }
    }

    fn load_rate(&mut self, ct_factor: f64) {
        for (bias, equation) in self.bias.iter_mut().zip(&self.equations) {
            *bias += ct_factor * equation.rate;
        }
    }

    fn load_jacobians(&mut self, _ctx: &ItemContext<'_>) {
        self.rows = self
            .equations
            .iter()
            .zip(&self.bias)
            .map(|(equation, bias)| {
                let mut row = ConstraintRow::new(RowKind::Bilateral, equation.blocks.clone());
                row.bias = *bias;
                row
            })
            .collect();
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
