use glam::DVec3;
use log::trace;

use crate::{
    config::SolverMode,
    core::{
        data_manager::BodyIndex,
        soa::{ContactBuffers, ContactRecord, RigidBuffers},
    },
    dynamics::{
        assembly::{unilateral_bias, ItemContext, PhysicsItem},
        descriptor::{ConstraintRow, JacobianBlock, RowKind, SystemDescriptor},
        parallel,
    },
    utils::{allocator::EntityId, math::orthonormal_tangents},
};

/// A shape of a body: the body handle plus the index of the shape in its
/// collision model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeRef {
    pub body: EntityId,
    pub shape: usize,
}

/// One contact point as produced by a collision backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManifoldEntry {
    pub shape_a: ShapeRef,
    pub shape_b: ShapeRef,
    /// Unit normal pointing from shape A towards shape B.
    pub normal: DVec3,
    /// World-space points on the surfaces of A and B.
    pub point_a: DVec3,
    pub point_b: DVec3,
    /// Positive when the shapes overlap.
    pub depth: f64,
    pub eff_radius: f64,
}

/// Contact as handed to a [`ContactSink`], still in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactInfo {
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub normal: DVec3,
    pub point_a: DVec3,
    pub point_b: DVec3,
    pub depth: f64,
    pub eff_radius: f64,
}

impl From<&ManifoldEntry> for ContactInfo {
    fn from(entry: &ManifoldEntry) -> Self {
        Self {
            body_a: entry.shape_a.body,
            body_b: entry.shape_b.body,
            normal: entry.normal,
            point_a: entry.point_a,
            point_b: entry.point_b,
            depth: entry.depth,
            eff_radius: entry.eff_radius,
        }
    }
}

/// Receiver of reported contacts. Reports are bracketed so the sink can
/// size its storage once.
pub trait ContactSink {
    fn begin_add_contact(&mut self, expected: usize);
    fn add_contact(&mut self, info: &ContactInfo);
    fn end_add_contact(&mut self);
}

/// Writes reported contacts into the Data Manager's contact arrays,
/// converting world points to offsets from each body center.
pub struct ContactContainer<'a> {
    buffers: &'a mut ContactBuffers,
    rigid: &'a RigidBuffers,
    index: &'a BodyIndex,
    skipped: usize,
}

impl<'a> ContactContainer<'a> {
    pub fn new(buffers: &'a mut ContactBuffers, rigid: &'a RigidBuffers, index: &'a BodyIndex) -> Self {
        Self {
            buffers,
            rigid,
            index,
            skipped: 0,
        }
    }

    /// Contacts dropped because a body was not part of the current step.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl ContactSink for ContactContainer<'_> {
    fn begin_add_contact(&mut self, expected: usize) {
        self.buffers.clear();
        self.buffers.reserve(expected);
        self.skipped = 0;
    }

    fn add_contact(&mut self, info: &ContactInfo) {
        let (Some(a), Some(b)) = (self.index.dense(info.body_a), self.index.dense(info.body_b))
        else {
            self.skipped += 1;
            return;
        };
        let rigid = self.rigid;
        self.buffers.push(ContactRecord {
            bodies: (a, b),
            ids: (info.body_a, info.body_b),
            normal: info.normal,
            cpt_a: info.point_a - rigid.pos[a],
            cpt_b: info.point_b - rigid.pos[b],
            depth: info.depth,
            eff_radius: info.eff_radius,
            friction: rigid.sliding_friction[a].min(rigid.sliding_friction[b]),
            cohesion: rigid.cohesion[a].min(rigid.cohesion[b]),
        });
    }

    fn end_add_contact(&mut self) {
        debug_assert!(self.buffers.is_aligned());
        trace!(
            "contact container holds {} contacts ({} skipped)",
            self.buffers.len(),
            self.skipped
        );
    }
}

/// Rows of one contact: the normal row, plus two tangent rows when
/// friction is solved.
pub fn contact_rows(
    record: &ContactRecord,
    mode: SolverMode,
    normal_bias: f64,
    cohesion_impulse: f64,
) -> Vec<ConstraintRow> {
    let (a, b) = record.bodies;
    let row = |direction: DVec3, kind: RowKind, bias: f64| {
        let mut row = ConstraintRow::new(
            kind,
            vec![
                JacobianBlock::body(a, -direction, -record.cpt_a.cross(direction)),
                JacobianBlock::body(b, direction, record.cpt_b.cross(direction)),
            ],
        );
        row.bias = bias;
        row
    };

    let normal = row(
        record.normal,
        RowKind::Unilateral {
            friction: record.friction,
            cohesion: cohesion_impulse,
        },
        normal_bias,
    );
    match mode {
        SolverMode::Normal => vec![normal],
        SolverMode::Sliding => {
            let (u, w) = orthonormal_tangents(record.normal);
            vec![normal, row(u, RowKind::Tangent, 0.0), row(w, RowKind::Tangent, 0.0)]
        }
    }
}

/// The contact set of one step as a [`PhysicsItem`] producing the
/// unilateral rows.
#[derive(Debug, Clone, Default)]
pub struct ContactList {
    records: Vec<ContactRecord>,
    bias: Vec<f64>,
    force_factor: f64,
    rows: Vec<ConstraintRow>,
}

impl ContactList {
    pub fn from_buffers(buffers: &ContactBuffers) -> Self {
        Self {
            records: buffers.iter().collect(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn rows(&self) -> &[ConstraintRow] {
        &self.rows
    }
}

impl PhysicsItem for ContactList {
    fn reset_bias(&mut self) {
        self.bias.clear();
        self.bias.resize(self.records.len(), 0.0);
    }

    fn load_residual(&mut self, c_factor: f64, recovery_speed: f64) {
        for (bias, record) in self.bias.iter_mut().zip(&self.records) {
            *bias += unilateral_bias(c_factor, -record.depth, recovery_speed);
        }
    }

    // Cohesion is a force; the solver bounds impulses.
    fn load_forces(&mut self, f_factor: f64, _ctx: &ItemContext<'_>) {
        self.force_factor = f_factor;
    }

    fn load_jacobians(&mut self, ctx: &ItemContext<'_>) {
        let records = &self.records;
        let bias = &self.bias;
        let scale = self.force_factor;
        let mode = ctx.solver_mode;
        let per_contact = parallel::map_range(records.len(), ctx.parallel, |i| {
            let record = &records[i];
            contact_rows(record, mode, bias[i], record.cohesion * scale)
        });
        self.rows = per_contact.into_iter().flatten().collect();
    }

    fn inject_constraints(&self, _ctx: &ItemContext<'_>, descriptor: &mut SystemDescriptor) {
        for row in &self.rows {
            descriptor.insert_constraint(row.clone());
        }
    }

    fn take_rows(&mut self, out: &mut Vec<ConstraintRow>) {
        out.append(&mut self.rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ContactRecord {
        ContactRecord {
            bodies: (0, 1),
            ids: (EntityId::new(0, 0), EntityId::new(1, 0)),
            normal: DVec3::Y,
            cpt_a: DVec3::new(0.0, 0.5, 0.0),
            cpt_b: DVec3::new(0.1, -0.5, 0.0),
            depth: 0.0,
            eff_radius: 0.25,
            friction: 0.4,
            cohesion: 0.0,
        }
    }

    #[test]
    fn normal_row_pushes_bodies_apart() {
        let rows = contact_rows(&record(), SolverMode::Normal, 0.0, 0.0);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.blocks[0].coeffs()[..3], [0.0, -1.0, 0.0]);
        assert_eq!(row.blocks[1].coeffs()[..3], [0.0, 1.0, 0.0]);
        // r_b x n = (0.1, -0.5, 0) x (0, 1, 0) = (0, 0, 0.1)
        assert!((row.blocks[1].coeffs()[5] - 0.1).abs() < 1e-12);
        assert!(matches!(row.kind, RowKind::Unilateral { friction, .. } if friction == 0.4));
    }

    #[test]
    fn sliding_mode_adds_tangent_rows() {
        let rows = contact_rows(&record(), SolverMode::Sliding, -0.2, 0.0);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].bias, -0.2);
        assert!(rows[1..].iter().all(|row| row.kind == RowKind::Tangent && row.bias == 0.0));
    }
}
