use nsc_core::collision::{CollisionSystem, ContactInfo, ContactSink};
use nsc_core::utils::allocator::Arena;
use nsc_core::*;

/// Backend that reports a fixed list of entries regardless of the bodies.
struct ScriptedBackend {
    entries: Vec<ManifoldEntry>,
}

impl CollisionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn detect(&self, _bodies: &Arena<RigidBody>, _settings: &CollisionSettings) -> Vec<ManifoldEntry> {
        self.entries.clone()
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Vec<String>,
    contacts: Vec<ContactInfo>,
}

impl ContactSink for RecordingSink {
    fn begin_add_contact(&mut self, expected: usize) {
        self.events.push(format!("begin {expected}"));
    }

    fn add_contact(&mut self, info: &ContactInfo) {
        self.events.push("add".to_string());
        self.contacts.push(*info);
    }

    fn end_add_contact(&mut self) {
        self.events.push("end".to_string());
    }
}

fn entry(a: EntityId, b: EntityId, depth: f64) -> ManifoldEntry {
    ManifoldEntry {
        shape_a: ShapeRef { body: a, shape: 0 },
        shape_b: ShapeRef { body: b, shape: 0 },
        normal: DVec3::Y,
        point_a: DVec3::new(0.0, 0.5, 0.0),
        point_b: DVec3::new(0.0, 0.5 - depth, 0.0),
        depth,
        eff_radius: 0.25,
    }
}

fn sphere(position: DVec3) -> RigidBody {
    RigidBody::sphere(position, 0.5, 1.0, Material::default())
}

#[test]
fn adapter_drops_entries_without_usable_geometry() {
    let mut bodies = Arena::new();
    let ground = bodies.insert(sphere(DVec3::ZERO));
    let ball = bodies.insert(sphere(DVec3::Y));
    let bare = bodies.insert(RigidBody::new(DVec3::new(3.0, 0.0, 0.0)));
    let mut ghost = sphere(DVec3::new(-3.0, 0.0, 0.0));
    ghost.collide = false;
    let ghost = bodies.insert(ghost);
    let gone = bodies.insert(sphere(DVec3::new(6.0, 0.0, 0.0)));
    bodies.remove(gone);

    let mut collision = CollisionSystem::new(ScriptedBackend {
        entries: vec![
            entry(ground, ball, 0.01),
            entry(ground, bare, 0.01),
            entry(ghost, ball, 0.01),
            entry(ball, gone, 0.01),
            entry(ground, ball, -1.0),
        ],
    });
    collision.run(&bodies, &CollisionSettings::default());

    assert_eq!(collision.backend_name(), "scripted");
    assert_eq!(collision.num_contacts(), 1);
    assert_eq!(collision.dropped(), 4);
    assert_eq!(collision.manifold()[0].shape_b.body, ball);
}

#[test]
fn reports_are_bracketed() {
    let mut bodies = Arena::new();
    let a = bodies.insert(sphere(DVec3::ZERO));
    let b = bodies.insert(sphere(DVec3::Y));

    let mut collision = CollisionSystem::new(ScriptedBackend {
        entries: vec![entry(a, b, 0.02), entry(a, b, 0.0)],
    });
    collision.run(&bodies, &CollisionSettings::default());

    let mut sink = RecordingSink::default();
    collision.report_contacts(&mut sink);
    assert_eq!(sink.events, ["begin 2", "add", "add", "end"]);
    assert_eq!(sink.contacts[0].body_a, a);
    assert_eq!(sink.contacts[0].body_b, b);
    assert_eq!(sink.contacts[0].depth, 0.02);
}

#[test]
fn empty_manifold_still_brackets() {
    let bodies: Arena<RigidBody> = Arena::new();
    let mut collision = CollisionSystem::new(ScriptedBackend { entries: Vec::new() });
    collision.run(&bodies, &CollisionSettings::default());

    let mut sink = RecordingSink::default();
    collision.report_contacts(&mut sink);
    assert_eq!(sink.events, ["begin 0", "end"]);
    assert_eq!(collision.dropped(), 0);
}

#[test]
fn envelope_keeps_near_misses() {
    let mut bodies = Arena::new();
    let a = bodies.insert(sphere(DVec3::ZERO));
    let b = bodies.insert(sphere(DVec3::Y));
    let mut collision = CollisionSystem::new(ScriptedBackend {
        entries: vec![entry(a, b, -0.05)],
    });

    collision.run(&bodies, &CollisionSettings::default());
    assert_eq!(collision.num_contacts(), 0);

    collision.run(
        &bodies,
        &CollisionSettings {
            collision_envelope: 0.1,
        },
    );
    assert_eq!(collision.num_contacts(), 1);
}

#[test]
fn system_stores_contacts_relative_to_body_centers() {
    let mut system = NscSystem::new(RunSettings::default()).unwrap();
    let ground = system.add_body(sphere(DVec3::ZERO).fixed());
    let ball = system.add_body(sphere(DVec3::new(0.0, 0.99, 0.0)));
    let bare = system.add_body(RigidBody::new(DVec3::new(0.0, 0.5, 0.0)));
    system.set_collision_backend(ScriptedBackend {
        entries: vec![
            ManifoldEntry {
                shape_a: ShapeRef { body: ground, shape: 0 },
                shape_b: ShapeRef { body: ball, shape: 0 },
                normal: DVec3::Y,
                point_a: DVec3::new(0.0, 0.5, 0.0),
                point_b: DVec3::new(0.0, 0.49, 0.0),
                depth: 0.01,
                eff_radius: 0.25,
            },
            entry(ground, bare, 0.01),
        ],
    });
    assert_eq!(system.collision_backend_name(), "scripted");

    system.solve_system();
    assert_eq!(system.num_contacts(), 1);
    assert_eq!(system.dropped_contacts(), 1);

    let contacts = &system.data_manager().host.contacts;
    assert_eq!(contacts.len(), 1);
    let record = contacts.get(0).expect("one contact");
    assert_eq!(record.bodies, (0, 1));
    assert_eq!(record.ids, (ground, ball));
    assert!((record.cpt_a.y - 0.5).abs() < 1e-12);
    assert!((record.cpt_b.y + 0.5).abs() < 1e-12);
    assert_eq!(record.friction, 0.6);
}

#[test]
fn sphere_backend_skips_fixed_pairs() {
    let mut bodies = Arena::new();
    bodies.insert(sphere(DVec3::ZERO).fixed());
    bodies.insert(sphere(DVec3::new(0.0, 0.9, 0.0)).fixed());

    let entries = SphereBackend::default().detect(&bodies, &CollisionSettings::default());
    assert!(entries.is_empty());
}

#[test]
fn sphere_backend_reports_overlap_depth() {
    let mut bodies = Arena::new();
    let a = bodies.insert(sphere(DVec3::ZERO));
    let b = bodies.insert(sphere(DVec3::new(0.9, 0.0, 0.0)));

    let entries = SphereBackend::new(0.0).detect(&bodies, &CollisionSettings::default());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].shape_a.body, a);
    assert_eq!(entries[0].shape_b.body, b);
    assert!((entries[0].depth - 0.1).abs() < 1e-12);
    assert!((entries[0].normal - DVec3::X).length() < 1e-12);
}
