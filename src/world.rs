use glam::DVec3;
use log::{debug, info};

use crate::{
    collision::{
        backend::{CollisionBackend, CollisionSystem},
        contact::{ContactContainer, ContactList},
    },
    config::{
        validate_recovery_speed, validate_step_size, validate_tolerance, RunSettings, SolverMode,
        SolverType, SystemType,
    },
    core::{
        constraints::Joint,
        containers::ThreeDofContainer,
        data_manager::{DataManager, ForceQuery, SolverMeasures},
        rigidbody::RigidBody,
    },
    dynamics::{
        assembly::{AssemblyItems, ConstraintAssembler, ItemContext, PhysicsItem},
        descriptor::SystemDescriptor,
        forces::ForceGenerator,
        integrator::Integrator,
        recovery,
        solver::{NscSolver, SolveReport},
    },
    error::{NscError, Result},
    utils::{allocator::EntityId, profiling::TimerRegistry},
};

const TIMERS: [&str; 7] = [
    "step",
    "setup",
    "update",
    "collision",
    "advance",
    "assembly",
    "solve",
];

/// One NSC simulation: the Data Manager plus the collision, assembly, and
/// solver stages that run over it, driven one step at a time.
#[derive(Debug)]
pub struct NscSystem {
    data_manager: DataManager,
    collision: CollisionSystem,
    solver: NscSolver,
    descriptor: SystemDescriptor,
    time: f64,
    step_count: u64,
}

impl NscSystem {
    /// Validates `settings` and builds an empty system. Only the NSC
    /// formulation is accepted.
    pub fn new(settings: RunSettings) -> Result<Self> {
        if settings.system_type != SystemType::Nsc {
            return Err(NscError::UnsupportedSystemType(settings.system_type));
        }
        settings.validate()?;

        let mut data_manager = DataManager::new(settings);
        for name in TIMERS {
            data_manager.timers.add_timer(name);
        }
        info!(
            "nsc system: step {}, solver {}, {:?} mode",
            settings.step_size, settings.solver.solver_type, settings.solver.solver_mode
        );
        Ok(Self {
            data_manager,
            collision: CollisionSystem::default(),
            solver: NscSolver::new(settings.solver.solver_type),
            descriptor: SystemDescriptor::new(),
            time: 0.0,
            step_count: 0,
        })
    }

    pub fn set_collision_backend<B: CollisionBackend + 'static>(&mut self, backend: B) {
        debug!("collision backend -> {}", backend.name());
        self.collision.set_backend(backend);
    }

    pub fn collision_backend_name(&self) -> &str {
        self.collision.backend_name()
    }

    pub fn add_body(&mut self, body: RigidBody) -> EntityId {
        self.data_manager.add_body(body)
    }

    /// Removes a body together with the joints attached to it.
    pub fn remove_body(&mut self, id: EntityId) -> Option<RigidBody> {
        self.data_manager.remove_body(id)
    }

    pub fn body(&self, id: EntityId) -> Option<&RigidBody> {
        self.data_manager.bodies.get(id)
    }

    pub fn body_mut(&mut self, id: EntityId) -> Option<&mut RigidBody> {
        self.data_manager.bodies.get_mut(id)
    }

    pub fn num_bodies(&self) -> usize {
        self.data_manager.bodies.len()
    }

    /// Adds a joint between two live bodies and returns its index.
    pub fn add_joint(&mut self, joint: Joint) -> Result<usize> {
        for id in [joint.body_a, joint.body_b] {
            if !self.data_manager.bodies.contains(id) {
                return Err(NscError::UnknownBody(id));
            }
        }
        self.data_manager.joints.push(joint);
        Ok(self.data_manager.joints.len() - 1)
    }

    pub fn joints(&self) -> &[Joint] {
        &self.data_manager.joints
    }

    /// Installs a 3-DOF container in the slot matching its kind, replacing
    /// any previous container of that kind.
    pub fn add_3dof_container(&mut self, container: ThreeDofContainer) {
        match container {
            ThreeDofContainer::Fea(fea) => {
                debug!("fea container attached: {} nodes", fea.num_nodes());
                self.data_manager.fea_container = Some(fea);
            }
            ThreeDofContainer::Granular(nodes) => {
                debug!("node container attached: {} nodes", nodes.num_nodes());
                self.data_manager.node_container = Some(nodes);
            }
        }
        self.data_manager.invalidate_solution();
    }

    pub fn add_force_generator<F: ForceGenerator + 'static>(&mut self, force: F) {
        self.data_manager.forces.add_force(force);
    }

    pub fn set_gravity(&mut self, gravity: DVec3) {
        self.data_manager.forces.set_gravity(gravity);
    }

    pub fn gravity(&self) -> DVec3 {
        self.data_manager.forces.gravity()
    }

    pub fn set_step_size(&mut self, step_size: f64) -> Result<()> {
        validate_step_size(step_size)?;
        self.data_manager.settings.step_size = step_size;
        Ok(())
    }

    pub fn set_max_iterations(&mut self, max_iteration: usize) -> Result<()> {
        if max_iteration == 0 {
            return Err(NscError::ZeroIterations);
        }
        self.data_manager.settings.solver.max_iteration = max_iteration;
        Ok(())
    }

    pub fn set_tolerance(&mut self, tolerance: f64) -> Result<()> {
        validate_tolerance(tolerance)?;
        self.data_manager.settings.solver.tolerance = tolerance;
        Ok(())
    }

    /// Switches the iterative method used by the next solve. The assembled
    /// system does not need rebuilding.
    pub fn change_solver_type(&mut self, solver_type: SolverType) {
        self.data_manager.settings.solver.solver_type = solver_type;
        self.solver.change_solver_type(solver_type);
    }

    /// Parses a solver name (`"apgd"`, `"bb"`, `"jacobi"`, `"gs"`, `"cg"`, ...)
    /// and switches to it. Unknown names leave the current method in place.
    pub fn change_solver_type_by_name(&mut self, name: &str) -> Result<()> {
        let solver_type = name.parse::<SolverType>()?;
        self.change_solver_type(solver_type);
        Ok(())
    }

    pub fn solver_type(&self) -> SolverType {
        self.solver.solver_type()
    }

    /// Changes how many rows each contact contributes. Cached multipliers no
    /// longer line up with the rows and are dropped.
    pub fn set_solver_mode(&mut self, mode: SolverMode) {
        if self.data_manager.settings.solver.solver_mode != mode {
            self.data_manager.settings.solver.solver_mode = mode;
            self.solver.clear_warm_start();
        }
    }

    /// Caps how fast penetration is pushed out, in length per time.
    pub fn set_contact_recovery_speed(&mut self, speed: f64) -> Result<()> {
        validate_recovery_speed(speed)?;
        self.data_manager.settings.solver.contact_recovery_speed = speed;
        Ok(())
    }

    pub fn set_collision_envelope(&mut self, envelope: f64) {
        self.data_manager.settings.collision.collision_envelope = envelope.max(0.0);
    }

    pub fn set_warm_start(&mut self, enabled: bool) {
        self.data_manager.settings.solver.warm_start = enabled;
        if !enabled {
            self.solver.clear_warm_start();
        }
    }

    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.data_manager.settings.parallel = enabled;
    }

    pub fn parallel_enabled(&self) -> bool {
        self.data_manager.settings.parallel
    }

    /// One-time startup: sizes the buffers, initializes the FEA container,
    /// loads body state, runs collision once, then initializes the node
    /// container.
    pub fn initialize(&mut self) {
        self.data_manager.setup();
        if let Some(fea) = self.data_manager.fea_container.as_mut() {
            fea.initialize();
        }
        self.data_manager.update();
        self.run_collision();
        if let Some(nodes) = self.data_manager.node_container.as_mut() {
            nodes.initialize();
        }
        info!(
            "initialized: {} bodies, {} joints, {} contacts",
            self.data_manager.num_rigid_bodies,
            self.data_manager.joints.len(),
            self.data_manager.num_rigid_contacts
        );
    }

    /// Runs Setup, Update, collision, and the NSC solve for the current
    /// configuration. Velocities are solved; positions do not move.
    pub fn solve_system(&mut self) -> SolveReport {
        let timers = &mut self.data_manager.timers;
        timers.reset();
        timers.start("step");

        self.data_manager.timers.start("setup");
        self.data_manager.setup();
        self.data_manager.timers.stop("setup");

        self.data_manager.timers.start("update");
        self.data_manager.update();
        self.data_manager.timers.stop("update");

        self.data_manager.timers.start("collision");
        self.run_collision();
        self.data_manager.timers.stop("collision");

        let report = self.solver.run_time_step(&mut self.data_manager);

        self.data_manager.timers.stop("step");
        self.data_manager.timers.report();
        report
    }

    /// Solves the last assembled NSC system again with the current solver
    /// type, without Setup, Update, collision, or re-assembly. Bodies are
    /// not moved. Returns `None` when nothing was solved since the last
    /// change to the bodies or containers.
    pub fn resolve_system(&mut self) -> Option<SolveReport> {
        self.solver.resolve(&mut self.data_manager)
    }

    /// Builds the generic system descriptor for the current configuration
    /// without solving it. Body, joint, and container accumulators are reset
    /// first.
    pub fn assemble_system(&mut self) -> &SystemDescriptor {
        self.data_manager.setup();
        self.data_manager.update();
        self.run_collision();

        let settings = self.data_manager.settings;
        let assembler = ConstraintAssembler::new(
            settings.step_size,
            settings.solver.contact_recovery_speed,
        );
        let DataManager {
            bodies,
            joints,
            fea_container,
            node_container,
            host,
            body_index,
            forces,
            ..
        } = &mut self.data_manager;

        for (_, body) in bodies.iter_mut() {
            PhysicsItem::reset_variables(body);
        }
        for joint in joints.iter_mut() {
            joint.reset_variables();
        }
        if let Some(fea) = fea_container.as_mut() {
            fea.reset_variables();
        }
        if let Some(nodes) = node_container.as_mut() {
            nodes.reset_variables();
        }

        let ctx = ItemContext {
            body_index: &*body_index,
            forces: &*forces,
            solver_mode: settings.solver.solver_mode,
            parallel: settings.parallel,
        };
        let mut contacts = ContactList::from_buffers(&host.contacts);
        let mut others: Vec<&mut dyn PhysicsItem> = Vec::new();
        if let Some(fea) = fea_container.as_mut() {
            others.push(fea);
        }
        if let Some(nodes) = node_container.as_mut() {
            others.push(nodes);
        }
        let mut items = AssemblyItems {
            bodies: bodies
                .iter_mut()
                .map(|(_, body)| body as &mut dyn PhysicsItem)
                .collect(),
            links: joints
                .iter_mut()
                .map(|joint| joint as &mut dyn PhysicsItem)
                .collect(),
            others,
            contacts: &mut contacts,
        };
        assembler.assemble_descriptor(&mut items, &ctx, &mut self.descriptor);
        &self.descriptor
    }

    /// Advances one step: solves, writes the constrained velocities back,
    /// and moves bodies and nodes with them.
    pub fn do_step(&mut self) -> SolveReport {
        self.data_manager.invalidate_contact_forces();
        let report = self.solve_system();

        self.data_manager.timers.start("advance");
        Integrator::advance(&mut self.data_manager);
        self.data_manager.timers.stop("advance");

        self.time += self.data_manager.settings.step_size;
        self.step_count += 1;
        report
    }

    /// Recovers per-body contact forces from the last solve.
    pub fn calculate_contact_forces(&mut self) {
        recovery::calculate_contact_forces(&mut self.data_manager);
    }

    pub fn contact_forces_current(&self) -> bool {
        self.data_manager.fc_current()
    }

    pub fn get_body_contact_force(&self, id: EntityId) -> Result<ForceQuery> {
        let index = self.dense_index(id)?;
        Ok(index.map_or(ForceQuery::NotComputed, |index| {
            self.data_manager.body_contact_force(index)
        }))
    }

    pub fn get_body_contact_torque(&self, id: EntityId) -> Result<ForceQuery> {
        let index = self.dense_index(id)?;
        Ok(index.map_or(ForceQuery::NotComputed, |index| {
            self.data_manager.body_contact_torque(index)
        }))
    }

    pub fn data_manager(&self) -> &DataManager {
        &self.data_manager
    }

    pub fn settings(&self) -> &RunSettings {
        &self.data_manager.settings
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.data_manager.timers
    }

    pub fn measures(&self) -> &SolverMeasures {
        &self.data_manager.measures
    }

    pub fn num_contacts(&self) -> usize {
        self.data_manager.num_rigid_contacts
    }

    /// Manifold entries the collision backend reported but the adapter
    /// dropped during the last pass.
    pub fn dropped_contacts(&self) -> usize {
        self.collision.dropped()
    }

    pub fn descriptor(&self) -> &SystemDescriptor {
        &self.descriptor
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    // A live body added after the last Setup has no dense index yet.
    fn dense_index(&self, id: EntityId) -> Result<Option<usize>> {
        if !self.data_manager.bodies.contains(id) {
            return Err(NscError::UnknownBody(id));
        }
        Ok(self.data_manager.body_index.dense(id))
    }

    fn run_collision(&mut self) {
        let dm = &mut self.data_manager;
        self.collision.run(&dm.bodies, &dm.settings.collision);
        let mut container =
            ContactContainer::new(&mut dm.host.contacts, &dm.host.rigid, &dm.body_index);
        self.collision.report_contacts(&mut container);
        let skipped = container.skipped();
        dm.num_rigid_contacts = dm.host.contacts.len();
        if skipped > 0 {
            debug!("{skipped} contact(s) named bodies outside the current step");
        }
    }
}
