//! Run settings and engine-wide defaults for the NSC contact pipeline.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{NscError, Result};

/// Default gravity vector applied to every movable body (Y-up).
pub const DEFAULT_GRAVITY: [f64; 3] = [0.0, -9.81, 0.0];

/// Default integration step size (in seconds).
pub const DEFAULT_STEP_SIZE: f64 = 0.01;

/// Iteration cap for the complementarity solve.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Residual below which the complementarity solve is considered converged.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Maximum speed at which penetration is pushed out by the stabilization term.
pub const DEFAULT_CONTACT_RECOVERY_SPEED: f64 = 0.6;

/// Separation below which the collision adapter still keeps a contact.
pub const DEFAULT_COLLISION_ENVELOPE: f64 = 0.0;

/// Contact formulation of a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemType {
    /// Non-smooth contact: complementarity constraints on impulses.
    Nsc,
    /// Smooth contact: penalty springs. Not driven by this pipeline.
    Smc,
}

/// Iterative algorithm applied to the assembled complementarity problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverType {
    /// Accelerated projected gradient descent with adaptive step and restart.
    Apgd,
    /// Spectral projected gradient with Barzilai-Borwein steps.
    BarzilaiBorwein,
    /// Projected Jacobi sweeps.
    Jacobi,
    /// Projected Gauss-Seidel sweeps.
    GaussSeidel,
    /// Active-set projected conjugate gradient.
    ConjugateGradient,
}

impl SolverType {
    pub const ALL: [SolverType; 5] = [
        SolverType::Apgd,
        SolverType::BarzilaiBorwein,
        SolverType::Jacobi,
        SolverType::GaussSeidel,
        SolverType::ConjugateGradient,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SolverType::Apgd => "apgd",
            SolverType::BarzilaiBorwein => "barzilai_borwein",
            SolverType::Jacobi => "jacobi",
            SolverType::GaussSeidel => "gauss_seidel",
            SolverType::ConjugateGradient => "conjugate_gradient",
        }
    }
}

impl fmt::Display for SolverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SolverType {
    type Err = NscError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apgd" => Ok(SolverType::Apgd),
            "bb" | "barzilai_borwein" => Ok(SolverType::BarzilaiBorwein),
            "jacobi" => Ok(SolverType::Jacobi),
            "gs" | "gauss_seidel" => Ok(SolverType::GaussSeidel),
            "cg" | "conjugate_gradient" => Ok(SolverType::ConjugateGradient),
            _ => Err(NscError::UnknownSolverType(s.to_string())),
        }
    }
}

/// Which rows each contact contributes to the unilateral block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverMode {
    /// One normal row per contact, frictionless.
    Normal,
    /// Normal plus two tangent rows projected onto the Coulomb cone.
    Sliding,
}

impl SolverMode {
    pub fn rows_per_contact(&self) -> usize {
        match self {
            SolverMode::Normal => 1,
            SolverMode::Sliding => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub solver_type: SolverType,
    pub solver_mode: SolverMode,
    pub max_iteration: usize,
    pub tolerance: f64,
    /// Clamp on the stabilization speed used to push bodies apart.
    pub contact_recovery_speed: f64,
    /// Seed each solve with the multipliers of the previous step.
    pub warm_start: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            solver_type: SolverType::Apgd,
            solver_mode: SolverMode::Normal,
            max_iteration: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            contact_recovery_speed: DEFAULT_CONTACT_RECOVERY_SPEED,
            warm_start: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionSettings {
    /// Contacts separated by more than this distance are dropped by the adapter.
    pub collision_envelope: f64,
}

impl Default for CollisionSettings {
    fn default() -> Self {
        Self {
            collision_envelope: DEFAULT_COLLISION_ENVELOPE,
        }
    }
}

/// Configuration block shared by every stage of one simulation instance.
///
/// Set once at construction and changed only through the explicit setters on
/// [`crate::world::NscSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub system_type: SystemType,
    pub step_size: f64,
    /// Run the per-contact and per-column loops on the rayon pool.
    pub parallel: bool,
    pub solver: SolverSettings,
    pub collision: CollisionSettings,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            system_type: SystemType::Nsc,
            step_size: DEFAULT_STEP_SIZE,
            parallel: false,
            solver: SolverSettings::default(),
            collision: CollisionSettings::default(),
        }
    }
}

impl RunSettings {
    pub fn validate(&self) -> Result<()> {
        if self.system_type != SystemType::Nsc {
            return Err(NscError::UnsupportedSystemType(self.system_type));
        }
        validate_step_size(self.step_size)?;
        validate_tolerance(self.solver.tolerance)?;
        validate_recovery_speed(self.solver.contact_recovery_speed)?;
        if self.solver.max_iteration == 0 {
            return Err(NscError::ZeroIterations);
        }
        Ok(())
    }
}

pub(crate) fn validate_step_size(step: f64) -> Result<()> {
    if step.is_finite() && step > 0.0 {
        Ok(())
    } else {
        Err(NscError::InvalidStepSize(step))
    }
}

pub(crate) fn validate_tolerance(tolerance: f64) -> Result<()> {
    if tolerance.is_finite() && tolerance >= 0.0 {
        Ok(())
    } else {
        Err(NscError::InvalidTolerance(tolerance))
    }
}

pub(crate) fn validate_recovery_speed(speed: f64) -> Result<()> {
    if speed.is_finite() && speed >= 0.0 {
        Ok(())
    } else {
        Err(NscError::InvalidRecoverySpeed(speed))
    }
}
