use std::collections::VecDeque;

use nalgebra::DVector;

use super::{estimate_lipschitz, BestIterate, ComplementaritySolver, SolveReport};
use crate::{
    config::{SolverSettings, SolverType},
    dynamics::schur::ConeProblem,
};

const STEP_MIN: f64 = 1e-10;
const STEP_MAX: f64 = 1e10;
const SUFFICIENT_DECREASE: f64 = 1e-4;
const MAX_LINE_SEARCH: usize = 30;

/// Spectral projected gradient with Barzilai-Borwein step lengths and a
/// nonmonotone line search over the last `memory` objective values.
#[derive(Debug, Clone, Copy)]
pub struct BarzilaiBorweinSolver {
    pub memory: usize,
}

impl Default for BarzilaiBorweinSolver {
    fn default() -> Self {
        Self { memory: 10 }
    }
}

impl ComplementaritySolver for BarzilaiBorweinSolver {
    fn solver_type(&self) -> SolverType {
        SolverType::BarzilaiBorwein
    }

    fn solve(
        &mut self,
        problem: &ConeProblem<'_>,
        settings: &SolverSettings,
        gamma: &mut DVector<f64>,
    ) -> SolveReport {
        let mut x = gamma.clone();
        let mut g = problem.gradient(&x);
        let mut f = problem.objective(&x, &g);
        let mut best = BestIterate::new(&x, problem.residual(&x, &g));
        if best.residual() <= settings.tolerance {
            return best.finish(gamma, 0, settings.tolerance);
        }

        let mut alpha = 1.0 / estimate_lipschitz(problem);
        let mut history = VecDeque::with_capacity(self.memory.max(1));
        history.push_back(f);
        let mut iterations = 0;

        while iterations < settings.max_iteration {
            iterations += 1;

            let mut target = &x - &g * alpha;
            problem.project(&mut target);
            let d = target - &x;
            let nd = problem.operator.apply(&d);
            let gd = g.dot(&d);
            let dnd = d.dot(&nd);
            if gd >= 0.0 {
                // No descent left along the projected direction.
                alpha = (alpha * 0.5).max(STEP_MIN);
                continue;
            }

            // The objective is quadratic along d, so trial values come from
            // the N d product alone.
            let f_max = history.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mut lambda = 1.0;
            let mut f_trial = f + gd + 0.5 * dnd;
            for _ in 0..MAX_LINE_SEARCH {
                if f_trial <= f_max + SUFFICIENT_DECREASE * lambda * gd {
                    break;
                }
                lambda *= 0.5;
                f_trial = f + lambda * gd + 0.5 * lambda * lambda * dnd;
            }

            let s = &d * lambda;
            let y = &nd * lambda;
            x += &s;
            g += &y;
            f = f_trial;

            let sy = s.dot(&y);
            alpha = if sy > 0.0 {
                (s.norm_squared() / sy).clamp(STEP_MIN, STEP_MAX)
            } else {
                STEP_MAX
            };

            let residual = problem.residual(&x, &g);
            best.offer(&x, residual);
            if residual <= settings.tolerance {
                break;
            }

            if history.len() == self.memory.max(1) {
                history.pop_front();
            }
            history.push_back(f);
        }

        best.finish(gamma, iterations, settings.tolerance)
    }
}
