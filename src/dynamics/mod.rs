//! Constraint assembly, the NSC solve, force recovery, and time integration.

pub mod assembly;
pub mod descriptor;
pub mod forces;
pub mod integrator;
pub mod parallel;
pub mod recovery;
pub mod schur;
pub mod solver;

pub use assembly::{build_nsc_system, AssemblyItems, ConstraintAssembler, ItemContext, PhysicsItem, ScaleFactors};
pub use descriptor::{ConstraintRow, DofLayout, JacobianBlock, RowKind, SystemDescriptor, VariableBlock, VariableKey};
pub use forces::{DragForce, ForceGenerator, ForceRegistry, GravityForce};
pub use integrator::Integrator;
pub use recovery::{calculate_contact_forces, recover_contact_forces};
pub use schur::{ConeProblem, InverseMass, Projection, ProjectionGroup, SchurOperator};
pub use solver::{make_solver, ComplementaritySolver, NscSolver, SolveReport, WarmStartCache};
