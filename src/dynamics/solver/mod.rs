//! Iterative solvers for the cone complementarity problem and the NSC
//! solve step built on them.

mod apgd;
mod bb;
mod gauss_seidel;
mod jacobi;
mod krylov;
mod warm_start;

pub use apgd::ApgdSolver;
pub use bb::BarzilaiBorweinSolver;
pub use gauss_seidel::GaussSeidelSolver;
pub use jacobi::JacobiSolver;
pub use krylov::ConjugateGradientSolver;
pub use warm_start::WarmStartCache;

use log::{debug, warn};
use nalgebra::DVector;

use super::{
    assembly::build_nsc_system,
    schur::{ConeProblem, Projection, SchurOperator},
};
use crate::{
    config::{SolverSettings, SolverType},
    core::data_manager::DataManager,
};

/// Outcome of one solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    pub iterations: usize,
    /// Natural-map residual of the returned multipliers.
    pub residual: f64,
    pub converged: bool,
}

impl SolveReport {
    pub fn trivial() -> Self {
        Self {
            iterations: 0,
            residual: 0.0,
            converged: true,
        }
    }
}

/// An iterative method for `min 1/2 g^T N g + r^T g` over the product of
/// friction cones, lower bounds, and free rows.
///
/// `gamma` holds the initial guess on entry and the best iterate found on
/// exit. Solvers never return an iterate with a worse residual than the
/// projected initial guess.
pub trait ComplementaritySolver: Send + Sync {
    fn solver_type(&self) -> SolverType;

    fn solve(
        &mut self,
        problem: &ConeProblem<'_>,
        settings: &SolverSettings,
        gamma: &mut DVector<f64>,
    ) -> SolveReport;
}

pub fn make_solver(solver_type: SolverType) -> Box<dyn ComplementaritySolver> {
    match solver_type {
        SolverType::Apgd => Box::new(ApgdSolver::default()),
        SolverType::BarzilaiBorwein => Box::new(BarzilaiBorweinSolver::default()),
        SolverType::Jacobi => Box::new(JacobiSolver::default()),
        SolverType::GaussSeidel => Box::new(GaussSeidelSolver::default()),
        SolverType::ConjugateGradient => Box::new(ConjugateGradientSolver::default()),
    }
}

/// Lowest-residual iterate seen so far.
#[derive(Debug, Clone)]
pub(crate) struct BestIterate {
    gamma: DVector<f64>,
    residual: f64,
}

impl BestIterate {
    pub(crate) fn new(gamma: &DVector<f64>, residual: f64) -> Self {
        Self {
            gamma: gamma.clone(),
            residual,
        }
    }

    pub(crate) fn offer(&mut self, gamma: &DVector<f64>, residual: f64) {
        if residual < self.residual {
            self.gamma.copy_from(gamma);
            self.residual = residual;
        }
    }

    pub(crate) fn residual(&self) -> f64 {
        self.residual
    }

    pub(crate) fn finish(self, gamma: &mut DVector<f64>, iterations: usize, tolerance: f64) -> SolveReport {
        *gamma = self.gamma;
        SolveReport {
            iterations,
            residual: self.residual,
            converged: self.residual <= tolerance,
        }
    }
}

/// Rough Lipschitz constant of the gradient, `|N 1| / |1|`. Methods using it
/// backtrack when it underestimates.
pub(crate) fn estimate_lipschitz(problem: &ConeProblem<'_>) -> f64 {
    let dim = problem.dim();
    if dim == 0 {
        return 1.0;
    }
    let ones = DVector::from_element(dim, 1.0);
    let estimate = problem.operator.apply(&ones).norm() / ones.norm();
    if estimate.is_finite() && estimate > 0.0 {
        estimate
    } else {
        1.0
    }
}

/// Assembles and solves the NSC system of the current step, leaving the
/// constrained velocities in the Data Manager.
pub struct NscSolver {
    solver: Box<dyn ComplementaritySolver>,
    warm_start: WarmStartCache,
}

impl std::fmt::Debug for NscSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NscSolver")
            .field("solver_type", &self.solver.solver_type())
            .field("warm_start", &self.warm_start)
            .finish()
    }
}

impl NscSolver {
    pub fn new(solver_type: SolverType) -> Self {
        Self {
            solver: make_solver(solver_type),
            warm_start: WarmStartCache::default(),
        }
    }

    pub fn solver_type(&self) -> SolverType {
        self.solver.solver_type()
    }

    /// Swaps the iterative method. Takes effect at the next solve; cached
    /// multipliers are kept.
    pub fn change_solver_type(&mut self, solver_type: SolverType) {
        if self.solver.solver_type() != solver_type {
            debug!("solver type {} -> {}", self.solver.solver_type(), solver_type);
            self.solver = make_solver(solver_type);
        }
    }

    pub fn clear_warm_start(&mut self) {
        self.warm_start.clear();
    }

    /// Builds `D`, `E`, and `b`, solves for the multipliers, and writes
    /// `v = v_free + M^-1 D gamma` back into the host velocities.
    ///
    /// With no constraints the free velocities are the result and the
    /// solve is reported as converged without iterating.
    pub fn run_time_step(&mut self, dm: &mut DataManager) -> SolveReport {
        dm.timers.start("assembly");
        build_nsc_system(dm);
        dm.timers.stop("assembly");

        let host = &mut dm.host;
        let mut v_free = host.m_inv.apply(&host.hf);
        v_free += &host.v;
        host.v_free = v_free;

        dm.timers.start("solve");
        let report = self.solve_assembled(dm);
        dm.mark_solved();
        dm.timers.stop("solve");

        self.record(dm, &report);
        report
    }

    /// Solves the system built by the last [`run_time_step`] again with the
    /// current method, starting from the same free velocities. Returns
    /// `None` when no solve matches the current bodies and contacts.
    ///
    /// [`run_time_step`]: NscSolver::run_time_step
    pub fn resolve(&mut self, dm: &mut DataManager) -> Option<SolveReport> {
        if !dm.is_solved() {
            return None;
        }
        dm.invalidate_contact_forces();
        dm.timers.start("solve");
        let report = self.solve_assembled(dm);
        dm.timers.stop("solve");
        self.record(dm, &report);
        Some(report)
    }

    fn record(&self, dm: &mut DataManager, report: &SolveReport) {
        let measures = &mut dm.measures;
        measures.solver_type = self.solver.solver_type();
        measures.iterations = report.iterations;
        measures.residual = report.residual;
        measures.converged = report.converged;
        if !report.converged {
            measures.non_converged_steps += 1;
            warn!(
                "{} stopped after {} iterations with residual {:.3e} (tolerance {:.1e})",
                self.solver.solver_type(),
                report.iterations,
                report.residual,
                dm.settings.solver.tolerance
            );
        }
    }

    fn solve_assembled(&mut self, dm: &mut DataManager) -> SolveReport {
        let settings = dm.settings;
        let host = &mut dm.host;
        let v_free = host.v_free.clone();

        if dm.num_constraints == 0 {
            host.v = v_free;
            host.r = DVector::zeros(0);
            host.gamma = DVector::zeros(0);
            self.warm_start.clear();
            return SolveReport::trivial();
        }

        let operator = SchurOperator::new(&host.d, &host.m_inv, &host.e)
            .with_parallel(settings.parallel);
        let mut r = operator.dt_mul(&v_free);
        r += &host.b;
        let projection = Projection::from_kinds(&host.row_kinds);

        let rows_per_contact = settings.solver.solver_mode.rows_per_contact();
        let mut gamma = if settings.solver.warm_start {
            self.warm_start.seed(
                &host.contacts,
                rows_per_contact,
                dm.num_unilaterals,
                dm.num_constraints,
            )
        } else {
            DVector::zeros(dm.num_constraints)
        };
        projection.project(&mut gamma);

        let problem = ConeProblem {
            operator,
            r: &r,
            projection: &projection,
        };
        let report = self.solver.solve(&problem, &settings.solver, &mut gamma);

        let mut v = host.m_inv.apply(&operator.d_mul(&gamma));
        v += &v_free;
        host.v = v;

        if settings.solver.warm_start {
            self.warm_start
                .store(&host.contacts, rows_per_contact, dm.num_unilaterals, &gamma);
        }
        host.r = r;
        host.gamma = gamma;
        report
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use nalgebra::DVector;
    use nalgebra_sparse::CscMatrix;

    use crate::dynamics::{
        descriptor::{build_jacobian, ConstraintRow, DofLayout, JacobianBlock, RowKind},
        schur::{InverseMass, Projection},
    };
    use glam::{DMat3, DVec3};

    /// Unit sphere (mass 1, radius 0.5) resting on a fixed ground body,
    /// contact normal +y, gravity already in `r`.
    pub(crate) struct RestingSphere {
        pub d: CscMatrix<f64>,
        pub m_inv: InverseMass,
        pub e: DVector<f64>,
        pub r: DVector<f64>,
        pub projection: Projection,
    }

    impl RestingSphere {
        pub(crate) fn new(friction: f64, sliding: bool, tangent_speed: f64) -> Self {
            let layout = DofLayout {
                num_bodies: 2,
                ..DofLayout::default()
            };
            let cpt = DVec3::new(0.0, -0.5, 0.0);
            let row = |direction: DVec3, kind: RowKind| {
                ConstraintRow::new(
                    kind,
                    vec![
                        JacobianBlock::body(0, -direction, DVec3::ZERO),
                        JacobianBlock::body(1, direction, cpt.cross(direction)),
                    ],
                )
            };
            let mut rows = vec![row(
                DVec3::Y,
                RowKind::Unilateral {
                    friction,
                    cohesion: 0.0,
                },
            )];
            if sliding {
                rows.push(row(DVec3::X, RowKind::Tangent));
                rows.push(row(DVec3::Z, RowKind::Tangent));
            }
            let d = build_jacobian(&rows, layout.num_dof(), |key| layout.offset(key));
            let m_inv = InverseMass {
                layout,
                body_mass: vec![0.0, 1.0],
                body_inertia: vec![DMat3::ZERO, DMat3::from_diagonal(DVec3::splat(10.0))],
                node_mass: Vec::new(),
            };
            let mut r = vec![-0.0981];
            if sliding {
                r.extend([tangent_speed, 0.0]);
            }
            let kinds: Vec<RowKind> = rows.iter().map(|row| row.kind).collect();
            Self {
                d,
                m_inv,
                e: DVector::zeros(rows.len()),
                r: DVector::from_vec(r),
                projection: Projection::from_kinds(&kinds),
            }
        }
    }
}
