use nalgebra::DVector;

use super::{estimate_lipschitz, BestIterate, ComplementaritySolver, SolveReport};
use crate::{
    config::{SolverSettings, SolverType},
    dynamics::schur::{ConeProblem, Projection},
};

const MAX_BACKTRACKS: usize = 30;

/// Conjugate gradients on the rows whose groups are strictly feasible,
/// with projected gradient steps to change the active set.
///
/// A conjugate step is taken while the gradient on the bound rows stays
/// below `proportioning` times the gradient on the free rows and the step
/// stays feasible. Otherwise a backtracking projected gradient step
/// expands or releases the active set and the conjugate directions restart.
#[derive(Debug, Clone, Copy)]
pub struct ConjugateGradientSolver {
    pub proportioning: f64,
}

impl Default for ConjugateGradientSolver {
    fn default() -> Self {
        Self { proportioning: 1.0 }
    }
}

fn free_mask(projection: &Projection, x: &DVector<f64>) -> Vec<bool> {
    let mut mask = vec![false; projection.len()];
    for group in projection.groups() {
        let start = group.start();
        let len = group.len();
        if group.is_interior(&x.as_slice()[start..start + len]) {
            mask[start..start + len].fill(true);
        }
    }
    mask
}

fn masked(values: &DVector<f64>, mask: &[bool], keep: bool) -> DVector<f64> {
    DVector::from_iterator(
        values.len(),
        values
            .iter()
            .zip(mask)
            .map(|(value, free)| if *free == keep { *value } else { 0.0 }),
    )
}

fn is_feasible(problem: &ConeProblem<'_>, x: &DVector<f64>) -> bool {
    let mut projected = x.clone();
    problem.project(&mut projected);
    (projected - x).amax() <= 1e-12 * (1.0 + x.amax())
}

impl ConjugateGradientSolver {
    /// Backtracking projected gradient step from `x`. Returns the new point
    /// and its gradient.
    fn projected_step(
        problem: &ConeProblem<'_>,
        x: &DVector<f64>,
        g: &DVector<f64>,
        lipschitz: &mut f64,
    ) -> (DVector<f64>, DVector<f64>) {
        let f = problem.objective(x, g);
        let mut backtracks = 0;
        loop {
            let mut candidate = x - g * (1.0 / *lipschitz);
            problem.project(&mut candidate);
            let g_candidate = problem.gradient(&candidate);
            let diff = &candidate - x;
            let bound = f + g.dot(&diff) + 0.5 * *lipschitz * diff.norm_squared();
            if problem.objective(&candidate, &g_candidate) <= bound || backtracks == MAX_BACKTRACKS
            {
                return (candidate, g_candidate);
            }
            *lipschitz *= 2.0;
            backtracks += 1;
        }
    }
}

impl ComplementaritySolver for ConjugateGradientSolver {
    fn solver_type(&self) -> SolverType {
        SolverType::ConjugateGradient
    }

    fn solve(
        &mut self,
        problem: &ConeProblem<'_>,
        settings: &SolverSettings,
        gamma: &mut DVector<f64>,
    ) -> SolveReport {
        let mut x = gamma.clone();
        let mut g = problem.gradient(&x);
        let mut best = BestIterate::new(&x, problem.residual(&x, &g));
        if best.residual() <= settings.tolerance {
            return best.finish(gamma, 0, settings.tolerance);
        }

        let mut lipschitz = estimate_lipschitz(problem);
        let mut direction: Option<DVector<f64>> = None;
        let mut previous_mask = Vec::new();
        let mut iterations = 0;

        while iterations < settings.max_iteration {
            iterations += 1;

            let mask = free_mask(problem.projection, &x);
            if mask != previous_mask {
                direction = None;
            }
            let free_gradient = masked(&g, &mask, true);
            let chopped = masked(&problem.projected_gradient(&x, &g), &mask, false);
            let proportional = chopped.norm_squared()
                <= self.proportioning * self.proportioning * free_gradient.norm_squared();

            let mut stepped = false;
            if proportional && free_gradient.norm_squared() > 0.0 {
                let p = direction.take().unwrap_or_else(|| free_gradient.clone());
                let np = problem.operator.apply(&p);
                let pnp = p.dot(&np);
                if pnp > 0.0 {
                    let alpha = free_gradient.dot(&p) / pnp;
                    let trial = &x - &p * alpha;
                    if is_feasible(problem, &trial) {
                        x = trial;
                        g -= &np * alpha;
                        let next_free = masked(&g, &mask, true);
                        let beta = next_free.dot(&np) / pnp;
                        direction = Some(next_free - &p * beta);
                        stepped = true;
                    }
                }
            }
            if !stepped {
                let (next, g_next) = Self::projected_step(problem, &x, &g, &mut lipschitz);
                x = next;
                g = g_next;
                direction = None;
            }
            previous_mask = mask;

            let residual = problem.residual(&x, &g);
            best.offer(&x, residual);
            if residual <= settings.tolerance {
                break;
            }
        }

        best.finish(gamma, iterations, settings.tolerance)
    }
}
