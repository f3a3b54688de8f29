//! Error types for configuration and structural failures.

use thiserror::Error;

use crate::{config::SystemType, utils::allocator::EntityId};

/// Failures reported before a step runs. Numerical non-convergence is not an
/// error; see [`crate::dynamics::solver::SolveReport`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NscError {
    /// Solver selector that names no known algorithm.
    #[error("unknown solver type: {0:?}")]
    UnknownSolverType(String),

    /// Step size that is zero, negative or not finite.
    #[error("step size must be positive and finite, got {0}")]
    InvalidStepSize(f64),

    /// Convergence tolerance that is negative or not finite.
    #[error("solver tolerance must be non-negative and finite, got {0}")]
    InvalidTolerance(f64),

    /// Penetration recovery speed that is negative or not finite.
    #[error("contact recovery speed must be non-negative and finite, got {0}")]
    InvalidRecoverySpeed(f64),

    /// Iteration cap of zero.
    #[error("solver iteration cap must be at least 1")]
    ZeroIterations,

    /// Formulation the NSC pipeline cannot drive.
    #[error("system type {0:?} cannot be driven by the NSC pipeline")]
    UnsupportedSystemType(SystemType),

    /// Handle that does not refer to a live body.
    #[error("no body is registered under {0:?}")]
    UnknownBody(EntityId),
}

pub type Result<T> = std::result::Result<T, NscError>;
