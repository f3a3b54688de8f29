use nalgebra::DVector;

use super::{jacobi::group_steps, BestIterate, ComplementaritySolver, SolveReport};
use crate::{
    config::{SolverSettings, SolverType},
    dynamics::schur::ConeProblem,
};

/// Projected block Gauss-Seidel sweeping the groups in row order.
///
/// Keeps `w = M^-1 D gamma` current so each row's gradient costs one
/// column dot product instead of a full Schur product.
#[derive(Debug, Clone, Copy)]
pub struct GaussSeidelSolver {
    pub omega: f64,
}

impl Default for GaussSeidelSolver {
    fn default() -> Self {
        Self { omega: 1.0 }
    }
}

impl ComplementaritySolver for GaussSeidelSolver {
    fn solver_type(&self) -> SolverType {
        SolverType::GaussSeidel
    }

    fn solve(
        &mut self,
        problem: &ConeProblem<'_>,
        settings: &SolverSettings,
        gamma: &mut DVector<f64>,
    ) -> SolveReport {
        let operator = problem.operator;
        let groups = problem.projection.groups();
        let steps = group_steps(groups, &operator.diagonal());

        let mut x = gamma.clone();
        let g = problem.gradient(&x);
        let mut best = BestIterate::new(&x, problem.residual(&x, &g));
        if best.residual() <= settings.tolerance {
            return best.finish(gamma, 0, settings.tolerance);
        }

        let mut w = operator.m_inv.apply(&operator.d_mul(&x));
        let mut local = [0.0; 3];
        let mut iterations = 0;

        while iterations < settings.max_iteration {
            iterations += 1;

            for (group, step) in groups.iter().zip(&steps) {
                let start = group.start();
                let len = group.len();
                let scale = self.omega * step;
                for k in 0..len {
                    let j = start + k;
                    let gradient =
                        operator.column_dot(j, &w) + operator.e[j] * x[j] + problem.r[j];
                    local[k] = x[j] - scale * gradient;
                }
                group.project(&mut local[..len]);
                for k in 0..len {
                    let j = start + k;
                    let delta = local[k] - x[j];
                    if delta != 0.0 {
                        operator.scatter_column(j, delta, &mut w);
                        x[j] = local[k];
                    }
                }
            }

            let mut g = operator.dt_mul(&w);
            g += operator.e.component_mul(&x);
            g += problem.r;
            let residual = problem.residual(&x, &g);
            best.offer(&x, residual);
            if residual <= settings.tolerance {
                break;
            }
        }

        best.finish(gamma, iterations, settings.tolerance)
    }
}
