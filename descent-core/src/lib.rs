//! Descent: a modular nonlinear programming solver
//!
//! This library implements a solver framework for nonlinear, nonconvex
//! optimization problems of the form
//!
//! ```text
//! minimize    f(x)
//! subject to  cL ≤ c(x) ≤ cU
//!             xL ≤ x ≤ xU
//! ```
//!
//! The solver is assembled from four orthogonal ingredients that can be
//! recombined freely:
//!
//! - **Globalization mechanism**: trust region or backtracking line search
//! - **Constraint relaxation**: feasibility restoration or l1 relaxation
//!   (Byrd-Omojokun-Waltz penalty steering)
//! - **Globalization strategy**: filter or l1 merit function
//! - **Subproblem model**: QP, LP, or primal-dual interior point
//!
//! Classical algorithm families fall out as presets: `filtersqp`
//! (trust-region filter SQP), `ipopt` (line-search filter interior point),
//! `byrd` (line-search l1-penalty SQP).
//!
//! # Example
//!
//! ```ignore
//! use descent_core::{solve, Options, TerminationStatus};
//!
//! let mut options = Options::default();
//! options.apply_preset("filtersqp")?;
//! let result = solve(&problem, &options);
//!
//! println!("status: {}", result.status);
//! println!("f(x*) = {}", result.iterate.objective);
//! ```
//!
//! # References
//!
//! - Fletcher & Leyffer, "Nonlinear programming without a penalty function"
//! - Wächter & Biegler, "On the implementation of an interior-point filter
//!   line-search algorithm for large-scale nonlinear programming"
//! - Byrd, Nocedal & Waltz, "Steering exact penalty methods for nonlinear
//!   programming"

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // NLP plumbing carries many parameters

pub mod direction;
pub mod driver;
pub mod error;
pub mod iterate;
pub mod linalg;
pub mod mechanism;
pub mod options;
pub mod problem;
pub mod relaxation;
pub mod solvers;
pub mod statistics;
pub mod strategy;
pub mod subproblem;

pub use direction::{
    ActiveSet, ConstraintFeasibility, ConstraintPartition, Direction, PredictedReductionModel,
    SubproblemStatus,
};
pub use driver::{solve, NlpSolver, SolveResult, TerminationStatus};
pub use error::SolverError;
pub use iterate::{Iterate, Multipliers, ProgressMeasures, Residuals};
pub use options::Options;
pub use problem::{Norm, Problem, Range};
pub use statistics::Statistics;
