use approx::assert_abs_diff_eq;
use nsc_core::dynamics::{RowKind, SchurOperator};
use nsc_core::*;

const WEIGHT_IMPULSE: f64 = 9.81 * 0.01;

fn unit_sphere(position: DVec3) -> RigidBody {
    RigidBody::sphere(position, 0.5, 1.0, Material::default())
}

fn stacked_system(solver_type: SolverType) -> NscSystem {
    let mut settings = RunSettings::default();
    settings.solver.solver_type = solver_type;
    settings.solver.max_iteration = 2000;
    settings.solver.tolerance = 1e-9;
    let mut system = NscSystem::new(settings).expect("valid settings");
    system.add_body(unit_sphere(DVec3::ZERO).fixed());
    system.add_body(unit_sphere(DVec3::Y));
    system.add_body(unit_sphere(DVec3::new(0.0, 2.0, 0.0)));
    system
}

/// Checks `0 <= gamma`, `0 <= N gamma + r` and their product elementwise.
fn assert_complementary(system: &NscSystem, tolerance: f64) {
    let host = &system.data_manager().host;
    let operator = SchurOperator::new(&host.d, &host.m_inv, &host.e);
    let w = operator.apply(&host.gamma) + &host.r;
    for (i, (g, w)) in host.gamma.iter().zip(w.iter()).enumerate() {
        assert!(*g >= -tolerance, "gamma[{i}] = {g}");
        assert!(*w >= -tolerance, "w[{i}] = {w}");
        assert!((g * w).abs() <= tolerance, "gamma[{i}] * w[{i}] = {}", g * w);
    }
}

#[test]
fn every_method_solves_a_sphere_stack() {
    for solver_type in SolverType::ALL {
        let mut system = stacked_system(solver_type);
        let report = system.solve_system();
        assert!(report.converged, "{solver_type}: {report:?}");
        assert_eq!(system.measures().solver_type, solver_type);

        let dm = system.data_manager();
        assert_eq!(dm.num_unilaterals, 2, "{solver_type}");
        assert_complementary(&system, 1e-6);

        // Bottom contact carries both spheres, top contact one.
        let mut gamma: Vec<f64> = dm.host.gamma.iter().copied().collect();
        gamma.sort_by(|a, b| a.total_cmp(b));
        assert_abs_diff_eq!(gamma[0], WEIGHT_IMPULSE, epsilon = 1e-5);
        assert_abs_diff_eq!(gamma[1], 2.0 * WEIGHT_IMPULSE, epsilon = 1e-5);

        // Both spheres come to rest.
        for i in 6..dm.host.v.len() {
            assert_abs_diff_eq!(dm.host.v[i], 0.0, epsilon = 1e-5);
        }
    }
}

#[test]
fn iteration_cap_is_reported_as_non_convergence() {
    let mut settings = RunSettings::default();
    settings.solver.solver_type = SolverType::Jacobi;
    settings.solver.max_iteration = 1;
    let mut system = NscSystem::new(settings).unwrap();
    system.add_body(unit_sphere(DVec3::ZERO).fixed());
    system.add_body(unit_sphere(DVec3::Y));

    let report = system.do_step();
    assert!(!report.converged);
    assert_eq!(report.iterations, 1);

    let measures = system.measures();
    assert!(!measures.converged);
    assert_eq!(measures.non_converged_steps, 1);
    assert!(measures.residual > 0.0);
    // The best iterate is still applied and stays feasible.
    assert!(system.data_manager().host.gamma[0] >= 0.0);
    assert_eq!(system.step_count(), 1);
}

#[test]
fn solver_type_switches_by_value_and_name() {
    let mut system = stacked_system(SolverType::Apgd);
    system.solve_system();
    let apgd_gamma = system.data_manager().host.gamma.clone();

    system.change_solver_type(SolverType::GaussSeidel);
    assert_eq!(system.solver_type(), SolverType::GaussSeidel);
    assert_eq!(system.settings().solver.solver_type, SolverType::GaussSeidel);

    system.change_solver_type_by_name("bb").unwrap();
    assert_eq!(system.solver_type(), SolverType::BarzilaiBorwein);
    system.change_solver_type_by_name("CG").unwrap();
    assert_eq!(system.solver_type(), SolverType::ConjugateGradient);

    let err = system.change_solver_type_by_name("simplex").unwrap_err();
    assert!(matches!(err, NscError::UnknownSolverType(_)));
    assert_eq!(system.solver_type(), SolverType::ConjugateGradient);

    system.solve_system();
    let cg_gamma = &system.data_manager().host.gamma;
    assert_eq!(cg_gamma.len(), apgd_gamma.len());
    for (a, b) in cg_gamma.iter().zip(apgd_gamma.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-5);
    }
}

#[test]
fn sliding_contact_stays_inside_the_friction_cone() {
    let mut system = NscSystem::new(RunSettings::default()).unwrap();
    system.set_solver_mode(SolverMode::Sliding);
    system.set_max_iterations(2000).unwrap();
    system.add_body(unit_sphere(DVec3::ZERO).fixed());
    let ball = system.add_body(
        unit_sphere(DVec3::Y).with_velocity(DVec3::new(1.0, 0.0, 0.0), DVec3::ZERO),
    );

    system.solve_system();
    let dm = system.data_manager();
    assert_eq!(dm.num_unilaterals, 3);
    assert!(matches!(dm.host.row_kinds[0], RowKind::Unilateral { .. }));
    assert_eq!(dm.host.row_kinds[1], RowKind::Tangent);
    assert_eq!(dm.host.row_kinds[2], RowKind::Tangent);

    let gamma = &dm.host.gamma;
    let normal = gamma[0];
    let tangent = (gamma[1] * gamma[1] + gamma[2] * gamma[2]).sqrt();
    assert!(normal > 0.0);
    assert!(tangent <= 0.6 * normal + 1e-6, "{tangent} > 0.6 * {normal}");

    // Friction slows the ball down but cannot reverse it in one step.
    system.do_step();
    let vx = system.body(ball).unwrap().velocity.linear.x;
    assert!(vx < 1.0 && vx > 0.0, "vx = {vx}");
}

#[test]
fn assembled_system_resolves_under_each_method() {
    let mut system = stacked_system(SolverType::Apgd);
    assert!(system.resolve_system().is_none());

    system.solve_system();
    let d_ncols = system.data_manager().host.d.ncols();
    let apgd_gamma = system.data_manager().host.gamma.clone();
    let apgd_v = system.data_manager().host.v.clone();
    system.calculate_contact_forces();
    assert!(system.contact_forces_current());

    for solver_type in [SolverType::GaussSeidel, SolverType::Jacobi, SolverType::ConjugateGradient] {
        system.change_solver_type(solver_type);
        let report = system.resolve_system().expect("a solve matches the bodies");
        assert!(report.converged, "{solver_type}: {report:?}");
        assert_eq!(system.measures().solver_type, solver_type);
        // New multipliers, so recovered forces are stale again.
        assert!(!system.contact_forces_current());

        let host = &system.data_manager().host;
        assert_eq!(host.d.ncols(), d_ncols);
        for (a, b) in host.gamma.iter().zip(apgd_gamma.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
        // Constrained velocities come from the same free velocities.
        for (a, b) in host.v.iter().zip(apgd_v.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-5);
        }
    }

    system.calculate_contact_forces();
    assert!(system.contact_forces_current());

    system.add_body(unit_sphere(DVec3::new(5.0, 0.0, 0.0)));
    assert!(system.resolve_system().is_none());
}

#[test]
fn warm_start_caches_contact_multipliers() {
    let mut system = stacked_system(SolverType::Apgd);
    system.set_warm_start(true);
    system.do_step();
    let first = system.measures().iterations;

    let report = system.do_step();
    assert!(report.converged);
    assert!(
        report.iterations <= first,
        "warm start took {} iterations, cold {}",
        report.iterations,
        first
    );

    system.set_warm_start(false);
    system.do_step();
    assert!(system.measures().converged);
}
