use approx::assert_abs_diff_eq;
use nsc_core::dynamics::{RowKind, VariableKey};
use nsc_core::*;

fn unit_sphere(position: DVec3) -> RigidBody {
    RigidBody::sphere(position, 0.5, 1.0, Material::default())
}

/// Ground, a resting ball, a pendulum bob on a distance joint, and a
/// two-node spring.
fn mixed_system() -> NscSystem {
    let mut system = NscSystem::new(RunSettings::default()).expect("valid settings");
    let ground = system.add_body(unit_sphere(DVec3::ZERO).fixed());
    system.add_body(unit_sphere(DVec3::Y));
    let bob = system.add_body(RigidBody::new(DVec3::new(4.0, 0.0, 0.0)));
    system
        .add_joint(Joint::distance(ground, bob, DVec3::ZERO, DVec3::ZERO, 4.0))
        .expect("both bodies exist");

    let mut fea = FeaContainer::new();
    let a = fea.add_node(NodeState {
        fixed: true,
        ..NodeState::new(DVec3::new(-3.0, 0.0, 0.0), 1.0)
    });
    let b = fea.add_node(NodeState::new(DVec3::new(-3.0, -1.0, 0.0), 1.0));
    fea.add_spring(a, b, 1.0e4, 10.0);
    system.add_3dof_container(ThreeDofContainer::Fea(fea));
    system.initialize();
    system
}

#[test]
fn descriptor_orders_variables_and_constraints() {
    let mut system = mixed_system();
    let descriptor = system.assemble_system();

    let keys: Vec<VariableKey> = descriptor.variables().iter().map(|block| block.key).collect();
    assert_eq!(
        keys,
        vec![
            VariableKey::Body(0),
            VariableKey::Body(1),
            VariableKey::Body(2),
            VariableKey::FeaNode(0),
            VariableKey::FeaNode(1),
        ]
    );
    assert_eq!(descriptor.num_dof(), 3 * 6 + 2 * 3);
    assert_eq!(descriptor.offset_of(VariableKey::FeaNode(1)), Some(21));

    // Joint row, spring row, then the single contact row.
    assert_eq!(descriptor.num_constraints(), 3);
    let kinds: Vec<RowKind> = descriptor.constraints().iter().map(|row| row.kind).collect();
    assert_eq!(kinds[0], RowKind::Bilateral);
    assert_eq!(kinds[1], RowKind::Bilateral);
    assert!(matches!(kinds[2], RowKind::Unilateral { .. }));
    assert_eq!(descriptor.contact_columns(), 2..3);
    assert!(!descriptor.is_inserting());

    let jacobian = descriptor.jacobian();
    assert_eq!(jacobian.nrows(), 24);
    assert_eq!(jacobian.ncols(), 3);
}

#[test]
fn assembly_is_deterministic() {
    let mut system = mixed_system();
    let first = system.assemble_system().clone();
    let second = system.assemble_system();

    assert_eq!(first.variables(), second.variables());
    assert_eq!(first.constraints(), second.constraints());
    assert_eq!(first.contact_columns(), second.contact_columns());
}

#[test]
fn nsc_columns_put_contacts_first() {
    let mut system = mixed_system();
    system.solve_system();

    let dm = system.data_manager();
    assert_eq!(dm.num_unilaterals, 1);
    assert_eq!(dm.num_bilaterals, 2);
    assert_eq!(dm.num_constraints, 3);
    assert_eq!(dm.host.d.ncols(), 3);
    assert_eq!(dm.host.d.nrows(), dm.num_dof);
    assert!(dm.host.row_kinds[0].is_unilateral());
    assert!(!dm.host.row_kinds[1].is_unilateral());
    assert!(!dm.host.row_kinds[2].is_unilateral());

    // Spring rows are the only compliant ones.
    assert_eq!(dm.host.e[0], 0.0);
    assert_eq!(dm.host.e[1], 0.0);
    assert!(dm.host.e[2] > 0.0);
}

#[test]
fn body_variables_carry_free_velocity_terms() {
    let mut system = mixed_system();
    let descriptor = system.assemble_system();

    // Bob: mass 1, gravity impulse already scaled by the step.
    let bob = descriptor.variables()[2];
    assert_abs_diff_eq!(bob.inverse_mass, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(bob.force[1], -9.81 * 0.01, epsilon = 1e-12);

    let ground = descriptor.variables()[0];
    assert_eq!(ground.inverse_mass, 0.0);
}

#[test]
fn empty_system_assembles_to_nothing() {
    let mut system = NscSystem::new(RunSettings::default()).unwrap();
    let descriptor = system.assemble_system();
    assert!(descriptor.variables().is_empty());
    assert_eq!(descriptor.num_constraints(), 0);
    assert_eq!(descriptor.contact_columns(), 0..0);

    let report = system.solve_system();
    assert_eq!(report, SolveReport::trivial());
}
