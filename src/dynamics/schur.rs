//! Schur complement products and the projected complementarity problem.
//!
//! The solvers never form `N = D^T M^-1 D + E`; they only apply it.

use glam::{DMat3, DVec3};
use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;

use super::{
    descriptor::{DofLayout, RowKind},
    parallel,
};

/// Block-diagonal inverse mass matrix in the NSC dof layout.
#[derive(Debug, Clone, Default)]
pub struct InverseMass {
    pub layout: DofLayout,
    pub body_mass: Vec<f64>,
    /// World-frame inverse inertia per body.
    pub body_inertia: Vec<DMat3>,
    /// FEA nodes first, then granular nodes.
    pub node_mass: Vec<f64>,
}

impl InverseMass {
    pub fn num_dof(&self) -> usize {
        self.layout.num_dof()
    }

    /// Returns `M^-1 x`.
    pub fn apply(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut out = DVector::zeros(x.len());
        for (body, (inv_mass, inv_inertia)) in
            self.body_mass.iter().zip(&self.body_inertia).enumerate()
        {
            let base = 6 * body;
            for k in 0..3 {
                out[base + k] = inv_mass * x[base + k];
            }
            let angular = *inv_inertia * DVec3::new(x[base + 3], x[base + 4], x[base + 5]);
            out[base + 3] = angular.x;
            out[base + 4] = angular.y;
            out[base + 5] = angular.z;
        }
        let node_base = self.layout.num_rigid_dof();
        for (node, inv_mass) in self.node_mass.iter().enumerate() {
            for k in 0..3 {
                let i = node_base + 3 * node + k;
                out[i] = inv_mass * x[i];
            }
        }
        out
    }

    /// Adds `scale * M^-1 e_i * value` for one dof entry `i` to `out`.
    fn scatter_entry(&self, i: usize, value: f64, out: &mut DVector<f64>) {
        let rigid = self.layout.num_rigid_dof();
        if i < rigid {
            let body = i / 6;
            let local = i % 6;
            if local < 3 {
                out[i] += self.body_mass[body] * value;
            } else {
                let column = self.body_inertia[body].col(local - 3);
                let base = 6 * body + 3;
                out[base] += column.x * value;
                out[base + 1] += column.y * value;
                out[base + 2] += column.z * value;
            }
        } else {
            out[i] += self.node_mass[(i - rigid) / 3] * value;
        }
    }
}

/// Applies the Schur complement of one assembled system.
#[derive(Debug, Clone, Copy)]
pub struct SchurOperator<'a> {
    pub d: &'a CscMatrix<f64>,
    pub m_inv: &'a InverseMass,
    pub e: &'a DVector<f64>,
    pub parallel: bool,
}

impl<'a> SchurOperator<'a> {
    pub fn new(d: &'a CscMatrix<f64>, m_inv: &'a InverseMass, e: &'a DVector<f64>) -> Self {
        Self {
            d,
            m_inv,
            e,
            parallel: false,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn num_constraints(&self) -> usize {
        self.d.ncols()
    }

    /// `D gamma`, accumulated column by column.
    pub fn d_mul(&self, gamma: &DVector<f64>) -> DVector<f64> {
        let d = self.d;
        parallel::scatter_add(d.ncols(), d.nrows(), self.parallel, |j, acc| {
            let g = gamma[j];
            if g == 0.0 {
                return;
            }
            let col = d.col(j);
            for (i, value) in col.row_indices().iter().zip(col.values()) {
                acc[*i] += value * g;
            }
        })
    }

    /// `D^T x`, one dot product per column.
    pub fn dt_mul(&self, x: &DVector<f64>) -> DVector<f64> {
        let d = self.d;
        let values = parallel::map_range(d.ncols(), self.parallel, |j| column_dot(d, j, x));
        DVector::from_vec(values)
    }

    /// `N gamma = D^T M^-1 D gamma + E gamma`.
    pub fn apply(&self, gamma: &DVector<f64>) -> DVector<f64> {
        let w = self.m_inv.apply(&self.d_mul(gamma));
        let mut out = self.dt_mul(&w);
        out += self.e.component_mul(gamma);
        out
    }

    /// Diagonal of `N`.
    pub fn diagonal(&self) -> DVector<f64> {
        let d = self.d;
        let values = parallel::map_range(d.ncols(), self.parallel, |j| {
            let mut w = DVector::zeros(d.nrows());
            self.scatter_column(j, 1.0, &mut w);
            column_dot(d, j, &w) + self.e[j]
        });
        DVector::from_vec(values)
    }

    /// Adds `M^-1 D_j * scale` to `w`.
    pub fn scatter_column(&self, j: usize, scale: f64, w: &mut DVector<f64>) {
        let col = self.d.col(j);
        for (i, value) in col.row_indices().iter().zip(col.values()) {
            self.m_inv.scatter_entry(*i, value * scale, w);
        }
    }

    /// `D_j^T x`.
    pub fn column_dot(&self, j: usize, x: &DVector<f64>) -> f64 {
        column_dot(self.d, j, x)
    }
}

fn column_dot(d: &CscMatrix<f64>, j: usize, x: &DVector<f64>) -> f64 {
    let col = d.col(j);
    col.row_indices()
        .iter()
        .zip(col.values())
        .map(|(i, value)| value * x[*i])
        .sum()
}

/// Feasible set of a contiguous run of multipliers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectionGroup {
    /// Bilateral row, unbounded.
    Free { index: usize },
    /// Frictionless contact, `gamma >= bound`.
    Lower { index: usize, bound: f64 },
    /// Normal row at `start` plus two tangent rows, Coulomb cone shifted
    /// so the normal may reach `bound`.
    Cone { start: usize, friction: f64, bound: f64 },
}

impl ProjectionGroup {
    pub fn start(&self) -> usize {
        match *self {
            ProjectionGroup::Free { index } | ProjectionGroup::Lower { index, .. } => index,
            ProjectionGroup::Cone { start, .. } => start,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ProjectionGroup::Cone { .. } => 3,
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn project(&self, values: &mut [f64]) {
        match *self {
            ProjectionGroup::Free { .. } => {}
            ProjectionGroup::Lower { bound, .. } => values[0] = values[0].max(bound),
            ProjectionGroup::Cone {
                friction, bound, ..
            } => {
                let projected =
                    project_cone(friction, values[0] - bound, values[1], values[2]);
                values[0] = projected[0] + bound;
                values[1] = projected[1];
                values[2] = projected[2];
            }
        }
    }

    /// Whether `values` lie strictly inside the feasible set.
    pub fn is_interior(&self, values: &[f64]) -> bool {
        match *self {
            ProjectionGroup::Free { .. } => true,
            ProjectionGroup::Lower { bound, .. } => values[0] > bound,
            ProjectionGroup::Cone {
                friction, bound, ..
            } => {
                let normal = values[0] - bound;
                let tangent = values[1].hypot(values[2]);
                normal > 0.0 && friction > 0.0 && tangent < friction * normal
            }
        }
    }
}

/// Projects `(normal, u, w)` onto the cone `|t| <= friction * normal`.
pub fn project_cone(friction: f64, normal: f64, u: f64, w: f64) -> [f64; 3] {
    let tangent = u.hypot(w);
    if tangent <= friction * normal {
        return [normal, u, w];
    }
    if friction * tangent <= -normal {
        return [0.0, 0.0, 0.0];
    }
    let projected_normal = (friction * tangent + normal) / (friction * friction + 1.0);
    let scale = friction * projected_normal / tangent;
    [projected_normal, u * scale, w * scale]
}

/// Feasible set of every multiplier of one system.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    groups: Vec<ProjectionGroup>,
    len: usize,
}

impl Projection {
    /// Groups rows by kind: a unilateral row followed by two tangent rows
    /// forms a cone; a lone unilateral row is a lower bound.
    pub fn from_kinds(kinds: &[RowKind]) -> Self {
        let mut groups = Vec::with_capacity(kinds.len());
        let mut index = 0;
        while index < kinds.len() {
            match kinds[index] {
                RowKind::Unilateral { friction, cohesion } => {
                    let has_tangents = matches!(kinds.get(index + 1), Some(RowKind::Tangent))
                        && matches!(kinds.get(index + 2), Some(RowKind::Tangent));
                    if has_tangents {
                        groups.push(ProjectionGroup::Cone {
                            start: index,
                            friction,
                            bound: -cohesion,
                        });
                        index += 3;
                    } else {
                        groups.push(ProjectionGroup::Lower {
                            index,
                            bound: -cohesion,
                        });
                        index += 1;
                    }
                }
                RowKind::Bilateral | RowKind::Tangent => {
                    debug_assert!(
                        !matches!(kinds[index], RowKind::Tangent),
                        "tangent row without a normal row"
                    );
                    groups.push(ProjectionGroup::Free { index });
                    index += 1;
                }
            }
        }
        Self {
            groups,
            len: kinds.len(),
        }
    }

    pub fn groups(&self) -> &[ProjectionGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn project(&self, gamma: &mut DVector<f64>) {
        let values = gamma.as_mut_slice();
        for group in &self.groups {
            let start = group.start();
            group.project(&mut values[start..start + group.len()]);
        }
    }
}

/// `min 1/2 gamma^T N gamma + r^T gamma` over the projection's feasible set.
#[derive(Debug, Clone, Copy)]
pub struct ConeProblem<'a> {
    pub operator: SchurOperator<'a>,
    pub r: &'a DVector<f64>,
    pub projection: &'a Projection,
}

impl<'a> ConeProblem<'a> {
    pub fn dim(&self) -> usize {
        self.r.len()
    }

    /// `N gamma + r`.
    pub fn gradient(&self, gamma: &DVector<f64>) -> DVector<f64> {
        let mut g = self.operator.apply(gamma);
        g += self.r;
        g
    }

    /// Objective value given the gradient at the same point.
    pub fn objective(&self, gamma: &DVector<f64>, gradient: &DVector<f64>) -> f64 {
        0.5 * gamma.dot(&(gradient + self.r))
    }

    pub fn project(&self, gamma: &mut DVector<f64>) {
        self.projection.project(gamma);
    }

    /// Infinity norm of the natural map `gamma - P(gamma - g)`; zero exactly
    /// at a solution.
    pub fn residual(&self, gamma: &DVector<f64>, gradient: &DVector<f64>) -> f64 {
        let mut trial = gamma - gradient;
        self.project(&mut trial);
        (gamma - trial).amax()
    }

    /// Natural map `gamma - P(gamma - g)`.
    pub fn projected_gradient(&self, gamma: &DVector<f64>, gradient: &DVector<f64>) -> DVector<f64> {
        let mut trial = gamma - gradient;
        self.project(&mut trial);
        gamma - trial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn cone_projection_cases() {
        assert_eq!(project_cone(0.5, 1.0, 0.3, 0.0), [1.0, 0.3, 0.0]);
        assert_eq!(project_cone(0.5, -1.0, 0.1, 0.0), [0.0, 0.0, 0.0]);

        let [n, u, w] = project_cone(0.5, 1.0, 2.0, 0.0);
        assert_abs_diff_eq!(u.hypot(w), 0.5 * n, epsilon = 1e-12);
        assert_abs_diff_eq!(n, (0.5 * 2.0 + 1.0) / 1.25, epsilon = 1e-12);

        assert_eq!(project_cone(0.0, 2.0, 1.0, 1.0), [2.0, 0.0, 0.0]);
    }

    #[test]
    fn groups_follow_row_kinds() {
        let kinds = [
            RowKind::Unilateral {
                friction: 0.4,
                cohesion: 0.0,
            },
            RowKind::Tangent,
            RowKind::Tangent,
            RowKind::Unilateral {
                friction: 0.4,
                cohesion: 0.2,
            },
            RowKind::Bilateral,
        ];
        let projection = Projection::from_kinds(&kinds);
        assert_eq!(
            projection.groups(),
            &[
                ProjectionGroup::Cone {
                    start: 0,
                    friction: 0.4,
                    bound: 0.0
                },
                ProjectionGroup::Lower {
                    index: 3,
                    bound: -0.2
                },
                ProjectionGroup::Free { index: 4 },
            ]
        );

        let mut gamma = DVector::from_vec(vec![-1.0, 0.0, 0.0, -1.0, -3.0]);
        projection.project(&mut gamma);
        assert_eq!(gamma.as_slice(), &[0.0, 0.0, 0.0, -0.2, -3.0]);
    }

    #[test]
    fn schur_product_matches_dense_form() {
        use crate::dynamics::descriptor::{build_jacobian, ConstraintRow, JacobianBlock};

        let layout = DofLayout {
            num_bodies: 2,
            ..DofLayout::default()
        };
        let rows = vec![
            ConstraintRow::new(
                RowKind::Unilateral {
                    friction: 0.0,
                    cohesion: 0.0,
                },
                vec![JacobianBlock::body(0, DVec3::Y, DVec3::X)],
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
        let d = build_jacobian(&rows, layout.num_dof(), |key| layout.offset(key));
        let m_inv = InverseMass {
            layout,
            body_mass: vec![0.5, 2.0],
            body_inertia: vec![DMat3::from_diagonal(DVec3::new(3.0, 1.0, 1.0)), DMat3::IDENTITY],
            node_mass: Vec::new(),
        };
        let e = DVector::from_vec(vec![0.1, 0.0]);
        let op = SchurOperator::new(&d, &m_inv, &e);

        // Dense N: [[0.5 + 3 + 0.1, -0.5], [-0.5, 0.5 + 2 + 1]]
        let gamma = DVector::from_vec(vec![1.0, 2.0]);
        let n_gamma = op.apply(&gamma);
        assert_abs_diff_eq!(n_gamma[0], 3.6 - 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(n_gamma[1], -0.5 + 7.0, epsilon = 1e-12);

        let diag = op.diagonal();
        assert_abs_diff_eq!(diag[0], 3.6, epsilon = 1e-12);
        assert_abs_diff_eq!(diag[1], 3.5, epsilon = 1e-12);

        let parallel = op.with_parallel(true).apply(&gamma);
        assert_abs_diff_eq!((parallel - n_gamma).amax(), 0.0, epsilon = 1e-12);
    }
}
