use nalgebra::DVector;

use super::{BestIterate, ComplementaritySolver, SolveReport};
use crate::{
    config::{SolverSettings, SolverType},
    dynamics::schur::{ConeProblem, ProjectionGroup},
};

/// Step length of each projection group: `1 / N_ii` for single rows and
/// `3 / trace` over the diagonal block of a friction cone, so all three
/// rows of a cone move together. Rows with a zero diagonal do not move.
pub(crate) fn group_steps(groups: &[ProjectionGroup], diagonal: &DVector<f64>) -> Vec<f64> {
    groups
        .iter()
        .map(|group| {
            let start = group.start();
            let len = group.len();
            let trace: f64 = diagonal.as_slice()[start..start + len].iter().sum();
            if trace > 0.0 {
                len as f64 / trace
            } else {
                0.0
            }
        })
        .collect()
}

/// Projected Jacobi: every group steps from the same gradient, scaled by
/// the relaxation factor `omega`.
#[derive(Debug, Clone, Copy)]
pub struct JacobiSolver {
    pub omega: f64,
}

impl Default for JacobiSolver {
    fn default() -> Self {
        Self { omega: 0.3 }
    }
}

impl ComplementaritySolver for JacobiSolver {
    fn solver_type(&self) -> SolverType {
        SolverType::Jacobi
    }

    fn solve(
        &mut self,
        problem: &ConeProblem<'_>,
        settings: &SolverSettings,
        gamma: &mut DVector<f64>,
    ) -> SolveReport {
        let groups = problem.projection.groups();
        let steps = group_steps(groups, &problem.operator.diagonal());

        let mut x = gamma.clone();
        let mut g = problem.gradient(&x);
        let mut best = BestIterate::new(&x, problem.residual(&x, &g));
        if best.residual() <= settings.tolerance {
            return best.finish(gamma, 0, settings.tolerance);
        }

        let mut iterations = 0;
        while iterations < settings.max_iteration {
            iterations += 1;

            for (group, step) in groups.iter().zip(&steps) {
                let start = group.start();
                let len = group.len();
                let scale = self.omega * step;
                for k in start..start + len {
                    x[k] -= scale * g[k];
                }
                group.project(&mut x.as_mut_slice()[start..start + len]);
            }

            g = problem.gradient(&x);
            let residual = problem.residual(&x, &g);
            best.offer(&x, residual);
            if residual <= settings.tolerance {
                break;
            }
        }

        best.finish(gamma, iterations, settings.tolerance)
    }
}
