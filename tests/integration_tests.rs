use approx::assert_abs_diff_eq;
use nsc_core::*;

const STEP: f64 = 0.01;
const GRAVITY: f64 = 9.81;

fn unit_sphere(position: DVec3) -> RigidBody {
    RigidBody::sphere(position, 0.5, 1.0, Material::default())
}

fn resting_pair() -> (NscSystem, EntityId, EntityId) {
    let mut system = NscSystem::new(RunSettings::default()).expect("default settings are valid");
    let ground = system.add_body(unit_sphere(DVec3::ZERO).fixed());
    let ball = system.add_body(unit_sphere(DVec3::new(0.0, 1.0, 0.0)));
    (system, ground, ball)
}

#[test]
fn resting_sphere_carries_its_weight() {
    let (mut system, ground, ball) = resting_pair();

    let report = system.solve_system();
    assert!(report.converged, "solve did not converge: {report:?}");
    assert_eq!(system.num_contacts(), 1);

    let dm = system.data_manager();
    assert_eq!(dm.num_unilaterals, 1);
    assert_abs_diff_eq!(dm.host.gamma[0], GRAVITY * STEP, epsilon = 1e-6);

    system.calculate_contact_forces();
    let force = system
        .get_body_contact_force(ball)
        .expect("ball is live")
        .valid()
        .expect("forces were recovered");
    assert_abs_diff_eq!(force.y, GRAVITY, epsilon = 1e-3);
    assert_abs_diff_eq!(force.x, 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(force.z, 0.0, epsilon = 1e-9);

    let reaction = system
        .get_body_contact_force(ground)
        .expect("ground is live")
        .valid()
        .expect("forces were recovered");
    assert_abs_diff_eq!(reaction.y, -GRAVITY, epsilon = 1e-3);

    let torque = system
        .get_body_contact_torque(ball)
        .expect("ball is live")
        .valid()
        .expect("forces were recovered");
    assert_abs_diff_eq!(torque.length(), 0.0, epsilon = 1e-9);
}

#[test]
fn resting_sphere_stays_put_over_steps() {
    let (mut system, _, ball) = resting_pair();
    for _ in 0..20 {
        let report = system.do_step();
        assert!(report.converged);
    }
    let body = system.body(ball).expect("ball is live");
    assert_abs_diff_eq!(body.transform.position.y, 1.0, epsilon = 1e-4);
    assert_abs_diff_eq!(body.velocity.linear.y, 0.0, epsilon = 1e-4);
    assert_eq!(system.step_count(), 20);
    assert_abs_diff_eq!(system.time(), 20.0 * STEP, epsilon = 1e-12);
}

#[test]
fn separated_spheres_produce_no_contacts() {
    let mut system = NscSystem::new(RunSettings::default()).expect("valid settings");
    let a = system.add_body(unit_sphere(DVec3::ZERO).fixed());
    let b = system.add_body(unit_sphere(DVec3::new(0.0, 1.5, 0.0)));

    let report = system.solve_system();
    assert_eq!(report, SolveReport::trivial());
    assert_eq!(system.num_contacts(), 0);

    system.calculate_contact_forces();
    for id in [a, b] {
        let force = system.get_body_contact_force(id).expect("live body");
        assert_eq!(force, ForceQuery::Valid(DVec3::ZERO));
    }

    // Free fall: v = g h.
    let dm = system.data_manager();
    assert_abs_diff_eq!(dm.host.v[7], -GRAVITY * STEP, epsilon = 1e-12);
}

#[test]
fn falling_body_accelerates_under_gravity() {
    let mut system = NscSystem::new(RunSettings::default()).expect("valid settings");
    let body = system.add_body(RigidBody::new(DVec3::new(0.0, 10.0, 0.0)));

    system.do_step();
    system.do_step();

    let state = system.body(body).expect("body exists");
    assert_abs_diff_eq!(state.velocity.linear.y, -2.0 * GRAVITY * STEP, epsilon = 1e-12);
    // Semi-implicit Euler: y = y0 - g h^2 (1 + 2).
    assert_abs_diff_eq!(
        state.transform.position.y,
        10.0 - 3.0 * GRAVITY * STEP * STEP,
        epsilon = 1e-12
    );
}

#[test]
fn sphere_lands_on_a_ground_plane() {
    let mut system = NscSystem::new(RunSettings::default()).expect("valid settings");
    // The envelope lets the contact engage before overlap, so the ball
    // settles without bouncing off the correction.
    system.set_collision_envelope(0.01);
    system.add_body(
        RigidBody::new(DVec3::ZERO)
            .fixed()
            .with_collision_model(CollisionModel::plane(DVec3::Y, Material::default())),
    );
    let ball = system.add_body(unit_sphere(DVec3::new(0.0, 0.52, 0.0)));

    for _ in 0..200 {
        system.do_step();
    }
    let body = system.body(ball).expect("ball is live");
    assert!(body.transform.position.y > 0.45, "ball sank: {}", body.transform.position.y);
    assert!(body.transform.position.y < 0.52);
    assert_abs_diff_eq!(body.velocity.linear.y, 0.0, epsilon = 1e-3);
}

#[test]
fn timers_cover_every_phase() {
    let (mut system, _, _) = resting_pair();
    system.do_step();

    let names: Vec<&str> = system.timers().names().collect();
    for phase in ["step", "setup", "update", "collision", "advance", "assembly", "solve"] {
        assert!(names.contains(&phase), "missing timer {phase}");
        let timer = system.timers().get(phase).expect("registered");
        assert_eq!(timer.calls(), 1, "timer {phase}");
        assert!(!timer.is_running());
    }
    assert!(system.timers().get_time("step") >= system.timers().get_time("solve"));
}

#[test]
fn initialize_prepares_containers() {
    let mut system = NscSystem::new(RunSettings::default()).expect("valid settings");
    system.add_body(unit_sphere(DVec3::ZERO).fixed());

    let mut fea = FeaContainer::new();
    let a = fea.add_node(NodeState {
        fixed: true,
        ..NodeState::new(DVec3::new(2.0, 0.0, 0.0), 1.0)
    });
    let b = fea.add_node(NodeState::new(DVec3::new(3.0, 0.0, 0.0), 1.0));
    fea.add_spring(a, b, 1.0e4, 10.0);
    system.add_3dof_container(ThreeDofContainer::Fea(fea));

    let mut granular = NodeContainer::new(0.05);
    granular.add_node(NodeState::new(DVec3::new(5.0, 5.0, 0.0), 0.1));
    system.add_3dof_container(ThreeDofContainer::Granular(granular));

    system.initialize();

    let dm = system.data_manager();
    let fea = dm.fea_container.as_ref().expect("fea container attached");
    assert!(fea.is_initialized());
    assert_eq!(fea.springs[0].rest_length, Some(1.0));
    let nodes = dm.node_container.as_ref().expect("node container attached");
    assert!(nodes.is_initialized());
    assert_eq!(nodes.num_active(), 1);
    assert_eq!(dm.num_dof, 6 + 3 * 3);
}

#[test]
fn spring_network_holds_a_hanging_node() {
    let mut system = NscSystem::new(RunSettings::default()).expect("valid settings");
    let mut fea = FeaContainer::new();
    let top = fea.add_node(NodeState {
        fixed: true,
        ..NodeState::new(DVec3::ZERO, 1.0)
    });
    let bottom = fea.add_node(NodeState::new(DVec3::new(0.0, -1.0, 0.0), 1.0));
    fea.add_spring(top, bottom, 1.0e4, 50.0);
    system.add_3dof_container(ThreeDofContainer::Fea(fea));
    system.initialize();

    for _ in 0..100 {
        system.do_step();
    }
    let dm = system.data_manager();
    assert_eq!(dm.num_bilaterals, 1);
    let node = dm.fea_container.as_ref().expect("attached").nodes[bottom];
    // Static stretch of a 1e4 N/m spring under 9.81 N is about 1 mm.
    assert!(node.position.y < -1.0);
    assert!(node.position.y > -1.01, "spring stretched to {}", node.position.y);
}
