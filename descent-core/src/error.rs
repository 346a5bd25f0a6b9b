//! Error types for the solver framework.
//!
//! Recovery is local wherever possible (backtracking, radius reduction,
//! regularization); only non-recoverable states reach the driver, which
//! converts them into a clean [`crate::driver::SolveResult`] rather than
//! propagating.

use thiserror::Error;

/// Errors produced while solving.
#[derive(Error, Debug)]
pub enum SolverError {
    /// A model callback returned NaN or ±∞. Recoverable: the trial iterate
    /// is rejected and the step contracted.
    #[error("evaluation of {quantity} returned a non-finite value")]
    Evaluation {
        /// Which quantity failed (objective, constraints, ...)
        quantity: &'static str,
    },

    /// The symmetric indefinite factorization failed outright.
    #[error("linear solver failure: {0}")]
    LinearSolver(String),

    /// Inertia could not be corrected within the perturbation budget.
    #[error("regularization failure: {0}")]
    Regularization(String),

    /// The local subproblem is unbounded below or errored in the backend.
    #[error("subproblem failure: {0}")]
    Subproblem(String),

    /// Trust-region radius shrank below machine precision.
    #[error("trust-region radius collapsed below {radius:e}")]
    TrustRegionCollapse {
        /// Radius at collapse
        radius: f64,
    },

    /// Line search could not find an acceptable step.
    #[error("line search failed: step length {step_length:e} below tolerance")]
    LineSearchCollapse {
        /// Step length at failure
        step_length: f64,
    },

    /// Inner trial loop exceeded its iteration budget.
    #[error("inner iteration limit ({0}) reached")]
    InnerIterationLimit(usize),

    /// An operation is not available for the selected subproblem.
    #[error("{0} is not implemented for this subproblem")]
    NotImplemented(&'static str),

    /// A configuration value could not be parsed or is unknown.
    #[error("invalid option: {0}")]
    InvalidOption(String),
}

impl SolverError {
    /// Evaluation failures are recoverable inside the trial loop; everything
    /// else aborts the current mechanism.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SolverError::Evaluation { .. })
    }
}
