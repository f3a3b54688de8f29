use nalgebra::DVector;

use super::{estimate_lipschitz, BestIterate, ComplementaritySolver, SolveReport};
use crate::{
    config::{SolverSettings, SolverType},
    dynamics::schur::ConeProblem,
};

const MAX_BACKTRACKS: usize = 50;

/// Accelerated projected gradient descent with Nesterov momentum, adaptive
/// step length, and gradient restarts.
#[derive(Debug, Clone, Copy)]
pub struct ApgdSolver {
    /// Step growth applied after every accepted iteration.
    pub step_relax: f64,
}

impl Default for ApgdSolver {
    fn default() -> Self {
        Self { step_relax: 0.9 }
    }
}

impl ComplementaritySolver for ApgdSolver {
    fn solver_type(&self) -> SolverType {
        SolverType::Apgd
    }

    fn solve(
        &mut self,
        problem: &ConeProblem<'_>,
        settings: &SolverSettings,
        gamma: &mut DVector<f64>,
    ) -> SolveReport {
        let g = problem.gradient(gamma);
        let mut best = BestIterate::new(gamma, problem.residual(gamma, &g));
        if best.residual() <= settings.tolerance {
            return best.finish(gamma, 0, settings.tolerance);
        }

        let mut lipschitz = estimate_lipschitz(problem);
        let mut theta = 1.0_f64;
        let mut y = gamma.clone();
        let mut x = gamma.clone();
        let mut iterations = 0;

        while iterations < settings.max_iteration {
            iterations += 1;

            let g_y = problem.gradient(&y);
            let f_y = problem.objective(&y, &g_y);
            let (x_new, g_new) = {
                let mut step = 1.0 / lipschitz;
                let mut backtracks = 0;
                loop {
                    let mut candidate = &y - &g_y * step;
                    problem.project(&mut candidate);
                    let g_candidate = problem.gradient(&candidate);
                    let f_candidate = problem.objective(&candidate, &g_candidate);
                    let diff = &candidate - &y;
                    let bound = f_y + g_y.dot(&diff) + 0.5 * lipschitz * diff.norm_squared();
                    if f_candidate <= bound || backtracks == MAX_BACKTRACKS {
                        break (candidate, g_candidate);
                    }
                    lipschitz *= 2.0;
                    step = 1.0 / lipschitz;
                    backtracks += 1;
                }
            };

            let theta_sq = theta * theta;
            let mut theta_new = 0.5 * (-theta_sq + theta * (theta_sq + 4.0).sqrt());
            let beta = theta * (1.0 - theta) / (theta_sq + theta_new);
            y = &x_new + (&x_new - &x) * beta;

            let residual = problem.residual(&x_new, &g_new);
            best.offer(&x_new, residual);
            if residual <= settings.tolerance {
                break;
            }

            // Momentum pointing uphill: restart from the new iterate.
            if g_new.dot(&(&x_new - &x)) > 0.0 {
                y.copy_from(&x_new);
                theta_new = 1.0;
            }

            lipschitz *= self.step_relax;
            theta = theta_new;
            x = x_new;
        }

        best.finish(gamma, iterations, settings.tolerance)
    }
}
