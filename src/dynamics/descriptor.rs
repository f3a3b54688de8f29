//! Constraint rows, variable blocks, and the generic system descriptor.
//!
//! Columns of the Jacobian `D` are constraint rows; its rows are the
//! degrees of freedom laid out bodies first (6 each), then FEA nodes and
//! granular nodes (3 each).

use std::{collections::HashMap, ops::Range};

use glam::{DMat3, DVec3};
use nalgebra_sparse::{CooMatrix, CscMatrix};

/// A block of unknowns in the system, identified by its dense index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKey {
    Body(usize),
    FeaNode(usize),
    Node(usize),
}

impl VariableKey {
    pub fn width(&self) -> usize {
        match self {
            VariableKey::Body(_) => 6,
            VariableKey::FeaNode(_) | VariableKey::Node(_) => 3,
        }
    }
}

/// Degree-of-freedom layout of the NSC state vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DofLayout {
    pub num_bodies: usize,
    pub num_fea_nodes: usize,
    pub num_nodes: usize,
}

impl DofLayout {
    pub fn offset(&self, key: VariableKey) -> usize {
        match key {
            VariableKey::Body(i) => 6 * i,
            VariableKey::FeaNode(k) => 6 * self.num_bodies + 3 * k,
            VariableKey::Node(k) => 6 * self.num_bodies + 3 * self.num_fea_nodes + 3 * k,
        }
    }

    pub fn num_rigid_dof(&self) -> usize {
        6 * self.num_bodies
    }

    pub fn num_dof(&self) -> usize {
        6 * self.num_bodies + 3 * (self.num_fea_nodes + self.num_nodes)
    }
}

/// Jacobian coefficients of one constraint row against one variable block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JacobianBlock {
    pub key: VariableKey,
    coeffs: [f64; 6],
}

impl JacobianBlock {
    pub fn body(index: usize, linear: DVec3, angular: DVec3) -> Self {
        Self {
            key: VariableKey::Body(index),
            coeffs: [
                linear.x, linear.y, linear.z, angular.x, angular.y, angular.z,
            ],
        }
    }

    /// Block against a 3-DOF node.
    pub fn node(key: VariableKey, linear: DVec3) -> Self {
        debug_assert_eq!(key.width(), 3);
        Self {
            key,
            coeffs: [linear.x, linear.y, linear.z, 0.0, 0.0, 0.0],
        }
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs[..self.key.width()]
    }
}

/// How the multiplier of a row is projected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowKind {
    /// Equality row, multiplier unbounded.
    Bilateral,
    /// Contact normal row. `cohesion` is the impulse the contact may pull
    /// with before separating.
    Unilateral { friction: f64, cohesion: f64 },
    /// Friction row belonging to the preceding unilateral row.
    Tangent,
}

impl RowKind {
    pub fn is_unilateral(&self) -> bool {
        !matches!(self, RowKind::Bilateral)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintRow {
    pub kind: RowKind,
    pub blocks: Vec<JacobianBlock>,
    /// Right-hand side term `b` added to `D^T v`.
    pub bias: f64,
    /// Diagonal regularization `E` of the Schur complement.
    pub compliance: f64,
}

impl ConstraintRow {
    pub fn new(kind: RowKind, blocks: Vec<JacobianBlock>) -> Self {
        Self {
            kind,
            blocks,
            bias: 0.0,
            compliance: 0.0,
        }
    }
}

/// State and inverse mass of one variable block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableBlock {
    pub key: VariableKey,
    pub inverse_mass: f64,
    /// World-frame inverse inertia; unused for 3-DOF nodes.
    pub inverse_inertia: DMat3,
    pub velocity: [f64; 6],
    /// Force impulse already scaled by the force factor.
    pub force: [f64; 6],
}

impl VariableBlock {
    pub fn body(index: usize, inverse_mass: f64, inverse_inertia: DMat3) -> Self {
        Self {
            key: VariableKey::Body(index),
            inverse_mass,
            inverse_inertia,
            velocity: [0.0; 6],
            force: [0.0; 6],
        }
    }

    pub fn node(key: VariableKey, inverse_mass: f64) -> Self {
        Self {
            key,
            inverse_mass,
            inverse_inertia: DMat3::ZERO,
            velocity: [0.0; 6],
            force: [0.0; 6],
        }
    }

    pub fn set_velocity(&mut self, linear: DVec3, angular: DVec3) {
        self.velocity = [
            linear.x, linear.y, linear.z, angular.x, angular.y, angular.z,
        ];
    }

    pub fn add_force(&mut self, force: DVec3, torque: DVec3) {
        for (slot, value) in self.force.iter_mut().zip([
            force.x, force.y, force.z, torque.x, torque.y, torque.z,
        ]) {
            *slot += value;
        }
    }
}

/// Builds `D` (dofs x rows) from constraint rows.
pub fn build_jacobian<F>(rows: &[ConstraintRow], num_dof: usize, offset: F) -> CscMatrix<f64>
where
    F: Fn(VariableKey) -> usize,
{
    let mut coo = CooMatrix::new(num_dof, rows.len());
    for (column, row) in rows.iter().enumerate() {
        for block in &row.blocks {
            let base = offset(block.key);
            for (k, value) in block.coeffs().iter().enumerate() {
                if *value != 0.0 {
                    coo.push(base + k, column, *value);
                }
            }
        }
    }
    CscMatrix::from(&coo)
}

/// Solver-agnostic system built by the generic assembly path.
///
/// Filled through a two-phase protocol: [`begin_insertion`], any number of
/// insertions, then [`end_insertion`]. Variables and constraints keep the
/// order in which they were inserted.
///
/// [`begin_insertion`]: SystemDescriptor::begin_insertion
/// [`end_insertion`]: SystemDescriptor::end_insertion
#[derive(Debug, Default, Clone)]
pub struct SystemDescriptor {
    variables: Vec<VariableBlock>,
    constraints: Vec<ConstraintRow>,
    offsets: HashMap<VariableKey, usize>,
    contact_columns: Range<usize>,
    num_dof: usize,
    inserting: bool,
}

impl SystemDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_insertion(&mut self) {
        self.variables.clear();
        self.constraints.clear();
        self.offsets.clear();
        self.contact_columns = 0..0;
        self.num_dof = 0;
        self.inserting = true;
    }

    pub fn insert_variables(&mut self, block: VariableBlock) {
        debug_assert!(self.inserting, "insert outside begin/end insertion");
        self.offsets.insert(block.key, self.num_dof);
        self.num_dof += block.key.width();
        self.variables.push(block);
    }

    pub fn insert_constraint(&mut self, row: ConstraintRow) {
        debug_assert!(self.inserting, "insert outside begin/end insertion");
        self.constraints.push(row);
    }

    /// Records the column range occupied by contact rows.
    pub fn mark_contact_columns(&mut self, columns: Range<usize>) {
        self.contact_columns = columns;
    }

    pub fn end_insertion(&mut self) {
        self.inserting = false;
    }

    pub fn is_inserting(&self) -> bool {
        self.inserting
    }

    pub fn variables(&self) -> &[VariableBlock] {
        &self.variables
    }

    pub fn constraints(&self) -> &[ConstraintRow] {
        &self.constraints
    }

    pub fn contact_columns(&self) -> Range<usize> {
        self.contact_columns.clone()
    }

    pub fn num_dof(&self) -> usize {
        self.num_dof
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Offset of a variable block in the descriptor's own dof ordering.
    pub fn offset_of(&self, key: VariableKey) -> Option<usize> {
        self.offsets.get(&key).copied()
    }

    /// Jacobian in insertion order. Rows referencing variables that were
    /// never inserted are skipped.
    pub fn jacobian(&self) -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(self.num_dof, self.constraints.len());
        for (column, row) in self.constraints.iter().enumerate() {
            for block in &row.blocks {
                let Some(base) = self.offset_of(block.key) else {
                    continue;
                };
                for (k, value) in block.coeffs().iter().enumerate() {
                    if *value != 0.0 {
                        coo.push(base + k, column, *value);
                    }
                }
            }
        }
        CscMatrix::from(&coo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_places_nodes_after_bodies() {
        let layout = DofLayout {
            num_bodies: 2,
            num_fea_nodes: 3,
            num_nodes: 1,
        };
        assert_eq!(layout.offset(VariableKey::Body(1)), 6);
        assert_eq!(layout.offset(VariableKey::FeaNode(0)), 12);
        assert_eq!(layout.offset(VariableKey::Node(0)), 21);
        assert_eq!(layout.num_dof(), 24);
        assert_eq!(layout.num_rigid_dof(), 12);
    }

    #[test]
    fn jacobian_columns_follow_row_order() {
        let rows = vec![
            ConstraintRow::new(
                RowKind::Bilateral,
                vec![JacobianBlock::body(0, DVec3::X, DVec3::ZERO)],
            ),
            ConstraintRow::new(
                RowKind::Unilateral {
                    friction: 0.0,
                    cohesion: 0.0,
                },
                vec![
                    JacobianBlock::body(0, -DVec3::Y, DVec3::ZERO),
                    JacobianBlock::body(1, DVec3::Y, DVec3::Z),
                ],
            ),
        ];
        let layout = DofLayout {
            num_bodies: 2,
            ..DofLayout::default()
        };
        let d = build_jacobian(&rows, layout.num_dof(), |key| layout.offset(key));
        assert_eq!(d.nrows(), 12);
        assert_eq!(d.ncols(), 2);
        assert_eq!(d.col(0).row_indices(), &[0]);
        assert_eq!(d.col(1).row_indices(), &[1, 7, 11]);
        assert_eq!(d.col(1).values(), &[-1.0, 1.0, 1.0]);
    }

    #[test]
    fn descriptor_uses_insertion_offsets() {
        let mut descriptor = SystemDescriptor::new();
        descriptor.begin_insertion();
        descriptor.insert_variables(VariableBlock::node(VariableKey::Node(0), 1.0));
        descriptor.insert_variables(VariableBlock::body(0, 1.0, DMat3::IDENTITY));
        descriptor.insert_constraint(ConstraintRow::new(
            RowKind::Bilateral,
            vec![JacobianBlock::body(0, DVec3::X, DVec3::ZERO)],
        ));
        descriptor.end_insertion();

        assert_eq!(descriptor.num_dof(), 9);
        assert_eq!(descriptor.offset_of(VariableKey::Body(0)), Some(3));
        let d = descriptor.jacobian();
        assert_eq!(d.col(0).row_indices(), &[3]);
    }
}
