//! Backend solver interfaces.
//!
//! The framework consumes two opaque backends: a QP/LP solver for the local
//! models, and a symmetric indefinite factorization exposing inertia for the
//! interior-point regularization. Both are specified as traits; the bundled
//! implementations live in this module.

pub mod interior_qp;
pub mod ldl;

use crate::direction::Direction;
use crate::error::SolverError;
use crate::linalg::sparse_vector::SparseVector;
use crate::linalg::symmetric::SymmetricMatrix;
use crate::problem::Range;

pub use self::interior_qp::InteriorQpSolver;
pub use self::ldl::LdlSolver;

/// Inertia of a symmetric matrix: counts of positive, negative and zero
/// eigenvalues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inertia {
    pub positive: usize,
    pub negative: usize,
    pub zero: usize,
}

/// Symmetric indefinite linear solver backend.
///
/// Factorizations own large workspace buffers; a backend instance releases
/// them when dropped, and every exit path of a subproblem solve drops or
/// reuses the factorization.
pub trait SymmetricIndefiniteSolver {
    /// Factorize the matrix (symbolic analysis is redone when the sparsity
    /// pattern changed). Failure is reported as an error, never a panic.
    fn factorize(&mut self, matrix: &SymmetricMatrix) -> Result<(), SolverError>;

    /// Solve `M x = rhs` with the current factorization.
    fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>, SolverError>;

    /// Inertia of the factored matrix.
    fn inertia(&self) -> Inertia;

    /// Rank of the factored matrix.
    fn rank(&self) -> usize {
        let inertia = self.inertia();
        inertia.positive + inertia.negative
    }

    /// Whether the factored matrix is numerically singular.
    fn is_singular(&self) -> bool {
        0 < self.inertia().zero
    }
}

/// QP/LP solver backend over displacement variables.
///
/// An [`SubproblemStatus::Infeasible`](crate::direction::SubproblemStatus)
/// return must carry a [`ConstraintPartition`](crate::direction::ConstraintPartition)
/// classifying every constraint under the relaxed feasible region, so the
/// caller can form the feasibility problem. Bounds may be ±∞; no big-M
/// substitution is performed.
pub trait QpSolver {
    /// Minimize `½ dᵀHd + gᵀd` over `variables_bounds ∩ {constraints_bounds ∋ Jd}`.
    fn solve_qp(
        &mut self,
        number_variables: usize,
        number_constraints: usize,
        variables_bounds: &[Range],
        constraints_bounds: &[Range],
        linear_objective: &SparseVector,
        constraints_jacobian: &[SparseVector],
        hessian: &SymmetricMatrix,
        initial_point: &[f64],
    ) -> Result<Direction, SolverError>;

    /// Same with the quadratic term dropped.
    fn solve_lp(
        &mut self,
        number_variables: usize,
        number_constraints: usize,
        variables_bounds: &[Range],
        constraints_bounds: &[Range],
        linear_objective: &SparseVector,
        constraints_jacobian: &[SparseVector],
        initial_point: &[f64],
    ) -> Result<Direction, SolverError>;
}
