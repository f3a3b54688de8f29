//! Constraint assembly: turns bodies, joints, 3-DOF items, and contacts into
//! constraint rows and variable blocks.
//!
//! Every item follows the same load protocol, driven in a fixed order by
//! [`ConstraintAssembler`]. The generic path injects the result into a
//! [`SystemDescriptor`]; the NSC path ([`build_nsc_system`]) collects the
//! rows into the Data Manager's sparse `D`, unilateral block first.

use glam::DVec3;
use log::debug;
use nalgebra::DVector;

use crate::{
    collision::contact::ContactList,
    config::SolverMode,
    core::{
        data_manager::{BodyIndex, DataManager},
        rigidbody::RigidBody,
    },
    dynamics::{
        descriptor::{build_jacobian, ConstraintRow, SystemDescriptor, VariableBlock},
        forces::ForceRegistry,
    },
};

/// Weights of the implicit integration scheme for one step size `h`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    /// External forces, `h`.
    pub f: f64,
    /// Stiffness, `h^2`.
    pub k: f64,
    /// Damping, `h`.
    pub r: f64,
    /// Mass, `1`.
    pub m: f64,
    /// Constraint rate, `1`.
    pub ct: f64,
    /// Position residual, `1/h`.
    pub c: f64,
}

impl ScaleFactors {
    pub fn from_step(step: f64) -> Self {
        debug_assert!(step > 0.0, "step size must be positive");
        Self {
            f: step,
            k: step * step,
            r: step,
            m: 1.0,
            ct: 1.0,
            c: 1.0 / step,
        }
    }
}

/// Stabilization of an equality row, limited to `recovery_speed` either way.
pub fn bilateral_bias(c_factor: f64, violation: f64, recovery_speed: f64) -> f64 {
    (c_factor * violation).clamp(-recovery_speed, recovery_speed)
}

/// Stabilization of a contact row. Penetration is pushed out no faster than
/// `recovery_speed`; a separated contact lets bodies approach by its gap.
pub fn unilateral_bias(c_factor: f64, violation: f64, recovery_speed: f64) -> f64 {
    (c_factor * violation).max(-recovery_speed)
}

/// Shared read-only state handed to every item during assembly.
#[derive(Clone, Copy)]
pub struct ItemContext<'a> {
    pub body_index: &'a BodyIndex,
    pub forces: &'a ForceRegistry,
    pub solver_mode: SolverMode,
    pub parallel: bool,
}

/// Load protocol of anything that contributes variables or constraints.
///
/// All steps default to no-ops so each item implements only what it owns.
pub trait PhysicsItem {
    /// Clears variable accumulators (loaded speed and force).
    fn reset_variables(&mut self) {}
    fn reset_bias(&mut self) {}
    /// Adds the position residual `C`, weighted by `c_factor`.
    fn load_residual(&mut self, _c_factor: f64, _recovery_speed: f64) {}
    /// Adds the explicit rate term `Ct`, weighted by `ct_factor`.
    fn load_rate(&mut self, _ct_factor: f64) {}
    fn load_velocity(&mut self, _ctx: &ItemContext<'_>) {}
    /// Adds `M v` to the force accumulator.
    fn accumulate_inertial(&mut self) {}
    fn load_jacobians(&mut self, _ctx: &ItemContext<'_>) {}
    /// Adds external forces weighted by `f_factor`.
    fn load_forces(&mut self, _f_factor: f64, _ctx: &ItemContext<'_>) {}
    /// Stiffness, damping, and mass contributions.
    fn load_stiffness(&mut self, _factors: &ScaleFactors) {}
    fn inject_variables(&self, _ctx: &ItemContext<'_>, _descriptor: &mut SystemDescriptor) {}
    fn inject_constraints(&self, _ctx: &ItemContext<'_>, _descriptor: &mut SystemDescriptor) {}
    /// Moves the rows built by the last pass into `out`.
    fn take_rows(&mut self, _out: &mut Vec<ConstraintRow>) {}
}

impl PhysicsItem for RigidBody {
    fn reset_variables(&mut self) {
        RigidBody::reset_variables(self);
    }

    fn load_velocity(&mut self, _ctx: &ItemContext<'_>) {
        self.variables.velocity = self.velocity;
    }

    fn accumulate_inertial(&mut self) {
        if self.fixed {
            return;
        }
        let r = glam::DMat3::from_quat(self.transform.rotation);
        let inertia = r * self.mass_properties.inertia * r.transpose();
        self.variables.force += self.mass_properties.mass * self.variables.velocity.linear;
        self.variables.torque += inertia * self.variables.velocity.angular;
    }

    fn load_forces(&mut self, f_factor: f64, ctx: &ItemContext<'_>) {
        let before = self.variables;
        self.variables.force = DVec3::ZERO;
        self.variables.torque = DVec3::ZERO;
        ctx.forces.accumulate(self);
        self.variables.force = before.force + f_factor * self.variables.force;
        self.variables.torque = before.torque + f_factor * self.variables.torque;
    }

    fn inject_variables(&self, ctx: &ItemContext<'_>, descriptor: &mut SystemDescriptor) {
        let Some(index) = ctx.body_index.dense(self.id) else {
            return;
        };
        let mut block = VariableBlock::body(index, self.inverse_mass(), self.world_inverse_inertia());
        block.set_velocity(self.variables.velocity.linear, self.variables.velocity.angular);
        block.add_force(self.variables.force, self.variables.torque);
        descriptor.insert_variables(block);
    }
}

/// The items of one assembly pass, grouped in protocol order.
pub struct AssemblyItems<'a> {
    pub bodies: Vec<&'a mut dyn PhysicsItem>,
    pub links: Vec<&'a mut dyn PhysicsItem>,
    pub others: Vec<&'a mut dyn PhysicsItem>,
    pub contacts: &'a mut dyn PhysicsItem,
}

/// Drives the load protocol over every item.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintAssembler {
    pub factors: ScaleFactors,
    pub recovery_speed: f64,
}

impl ConstraintAssembler {
    pub fn new(step: f64, recovery_speed: f64) -> Self {
        Self {
            factors: ScaleFactors::from_step(step),
            recovery_speed,
        }
    }

    fn load_link(&self, item: &mut dyn PhysicsItem, ctx: &ItemContext<'_>) {
        let f = &self.factors;
        item.reset_bias();
        item.load_residual(f.c, self.recovery_speed);
        item.load_rate(f.ct);
        item.load_velocity(ctx);
        item.accumulate_inertial();
        item.load_jacobians(ctx);
        item.load_forces(f.f, ctx);
    }

    fn load_body(&self, item: &mut dyn PhysicsItem, ctx: &ItemContext<'_>) {
        item.load_forces(self.factors.f, ctx);
        item.load_velocity(ctx);
        item.accumulate_inertial();
    }

    fn load_other(&self, item: &mut dyn PhysicsItem, ctx: &ItemContext<'_>) {
        self.load_link(item, ctx);
        item.load_stiffness(&self.factors);
    }

    fn load_contacts(&self, item: &mut dyn PhysicsItem, ctx: &ItemContext<'_>) {
        let f = &self.factors;
        item.reset_bias();
        item.load_residual(f.c, self.recovery_speed);
        item.load_rate(f.ct);
        item.load_forces(f.f, ctx);
        item.load_jacobians(ctx);
    }

    /// Runs the load protocol on every item, in order: links, bodies, other
    /// items, then the contact set.
    pub fn load(&self, items: &mut AssemblyItems<'_>, ctx: &ItemContext<'_>) {
        for link in items.links.iter_mut() {
            self.load_link(&mut **link, ctx);
        }
        for body in items.bodies.iter_mut() {
            self.load_body(&mut **body, ctx);
        }
        for other in items.others.iter_mut() {
            self.load_other(&mut **other, ctx);
        }
        self.load_contacts(items.contacts, ctx);
    }

    /// Loads every item and injects it into `descriptor`. Variables go in
    /// as bodies then items; constraints as links, items, then contacts,
    /// whose column range is recorded on the descriptor.
    pub fn assemble_descriptor(
        &self,
        items: &mut AssemblyItems<'_>,
        ctx: &ItemContext<'_>,
        descriptor: &mut SystemDescriptor,
    ) {
        self.load(items, ctx);

        descriptor.begin_insertion();
        for body in &items.bodies {
            body.inject_variables(ctx, descriptor);
        }
        for link in &items.links {
            link.inject_variables(ctx, descriptor);
        }
        for other in &items.others {
            other.inject_variables(ctx, descriptor);
        }
        for link in &items.links {
            link.inject_constraints(ctx, descriptor);
        }
        for other in &items.others {
            other.inject_constraints(ctx, descriptor);
        }
        let first_contact = descriptor.num_constraints();
        items.contacts.inject_constraints(ctx, descriptor);
        descriptor.mark_contact_columns(first_contact..descriptor.num_constraints());
        descriptor.end_insertion();

        debug!(
            "descriptor assembled: {} dofs, {} constraints ({} contact rows)",
            descriptor.num_dof(),
            descriptor.num_constraints(),
            descriptor.contact_columns().len()
        );
    }
}

/// Builds the NSC system `D`, `b`, `E` and row kinds on the Data Manager.
///
/// Columns are laid out contacts first, so the unilateral block spans
/// `0..num_unilaterals`, followed by joint rows and FEA spring rows.
pub fn build_nsc_system(dm: &mut DataManager) {
    let settings = dm.settings;
    let assembler = ConstraintAssembler::new(
        settings.step_size,
        settings.solver.contact_recovery_speed,
    );

    let DataManager {
        joints,
        fea_container,
        host,
        body_index,
        forces,
        ..
    } = dm;

    let ctx = ItemContext {
        body_index: &*body_index,
        forces: &*forces,
        solver_mode: settings.solver.solver_mode,
        parallel: settings.parallel,
    };

    let mut contacts = ContactList::from_buffers(&host.contacts);
    let mut rows: Vec<ConstraintRow> = Vec::new();

    assembler.load_contacts(&mut contacts, &ctx);
    contacts.take_rows(&mut rows);
    let num_unilaterals = rows.len();

    for joint in joints.iter_mut() {
        assembler.load_link(joint, &ctx);
        joint.take_rows(&mut rows);
    }
    if let Some(fea) = fea_container.as_mut() {
        assembler.load_other(fea, &ctx);
        fea.take_rows(&mut rows);
    }

    let layout = host.layout;
    host.d = build_jacobian(&rows, layout.num_dof(), |key| layout.offset(key));
    host.b = DVector::from_iterator(rows.len(), rows.iter().map(|row| row.bias));
    host.e = DVector::from_iterator(rows.len(), rows.iter().map(|row| row.compliance));
    host.row_kinds = rows.iter().map(|row| row.kind).collect();

    dm.num_unilaterals = num_unilaterals;
    dm.num_bilaterals = rows.len() - num_unilaterals;
    dm.num_constraints = rows.len();

    debug!(
        "nsc system built: {} unilateral + {} bilateral rows over {} dofs",
        dm.num_unilaterals, dm.num_bilaterals, dm.num_dof
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factors_follow_the_step() {
        let factors = ScaleFactors::from_step(0.01);
        assert_eq!(factors.f, 0.01);
        assert!((factors.k - 1e-4).abs() < 1e-18);
        assert_eq!(factors.r, 0.01);
        assert_eq!(factors.m, 1.0);
        assert_eq!(factors.ct, 1.0);
        assert!((factors.c - 100.0).abs() < 1e-9);
    }

    #[test]
    fn biases_are_clamped_by_recovery_speed() {
        assert_eq!(unilateral_bias(100.0, -0.1, 0.6), -0.6);
        assert!((unilateral_bias(100.0, 0.001, 0.6) - 0.1).abs() < 1e-12);
        assert_eq!(bilateral_bias(100.0, 0.1, 0.6), 0.6);
        assert_eq!(bilateral_bias(100.0, -0.1, 0.6), -0.6);
        assert!((bilateral_bias(100.0, 0.002, 0.6) - 0.2).abs() < 1e-12);
    }
}
