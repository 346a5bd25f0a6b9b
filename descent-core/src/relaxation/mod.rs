//! Constraint relaxation strategies.
//!
//! This layer knows whether the current step came from the real problem or
//! from a relaxed one. It orchestrates the subproblem calls, owns the
//! globalization strategy, and carries the state machine (restoration phase
//! or penalty parameter) across outer iterations.

pub mod feasibility_restoration;
pub mod l1_relaxation;

use crate::direction::{Direction, PredictedReductionModel};
use crate::error::SolverError;
use crate::iterate::Iterate;
use crate::linalg::norm_inf;
use crate::problem::Problem;
use crate::statistics::Statistics;

pub use feasibility_restoration::{FeasibilityRestoration, Phase};
pub use l1_relaxation::{L1Relaxation, L1RelaxationParameters};

/// Orchestrates subproblem solves under a relaxation scheme.
pub trait ConstraintRelaxation {
    /// Initialize the subproblem and the globalization strategies at the
    /// first iterate.
    fn initialize(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), SolverError>;

    /// Assemble the local model at the current iterate.
    fn create_current_subproblem(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        trust_region_radius: f64,
    ) -> Result<(), SolverError>;

    /// Produce a direction, relaxing the problem if the local model turns
    /// out infeasible. Never surfaces `Infeasible`.
    fn compute_feasible_direction(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<Direction, SolverError>;

    /// Solve the pure feasibility problem (recovery entry point for the
    /// line search).
    fn solve_feasibility_problem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        phase_2_direction: &Direction,
    ) -> Result<Direction, SolverError>;

    /// Second-order correction at the trial point.
    fn compute_second_order_correction(
        &mut self,
        problem: &dyn Problem,
        trial_iterate: &mut Iterate,
    ) -> Result<Direction, SolverError>;

    /// Predicted-reduction evaluator for this direction.
    fn generate_predicted_reduction_model(
        &self,
        problem: &dyn Problem,
        direction: &Direction,
    ) -> PredictedReductionModel;

    /// Whether the trial iterate is acceptable. An evaluation failure makes
    /// the trial non-acceptable rather than erroring.
    fn is_acceptable(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        trial_iterate: &mut Iterate,
        direction: &Direction,
        predicted_reduction_model: &PredictedReductionModel,
        step_length: f64,
    ) -> Result<bool, SolverError>;

    /// Backend solves so far.
    fn number_subproblems_solved(&self) -> usize;

    /// Hessian evaluations so far.
    fn hessian_evaluation_count(&self) -> usize;

    /// Current penalty parameter, when the scheme carries one.
    fn penalty_parameter(&self) -> Option<f64> {
        None
    }
}

/// Map from constraint index to the indices of its elastic variables.
///
/// The negative elastic n_j lifts a violated lower bound
/// (`c_j + n_j ≥ cL_j`), the positive elastic p_j absorbs a violated upper
/// bound (`c_j − p_j ≤ cU_j`). Both are nonnegative and enter the model
/// objective with unit weight.
#[derive(Debug, Clone, Default)]
pub struct ElasticVariables {
    /// (constraint, variable index) of the p_j elastics
    pub positive: Vec<(usize, usize)>,
    /// (constraint, variable index) of the n_j elastics
    pub negative: Vec<(usize, usize)>,
}

impl ElasticVariables {
    /// Number of elastic variables a problem needs (one per finite
    /// constraint bound side).
    pub fn count(problem: &dyn Problem) -> usize {
        let mut count = 0;
        for j in 0..problem.number_constraints() {
            let bounds = problem.constraint_bounds(j);
            if bounds.lb.is_finite() {
                count += 1;
            }
            if bounds.ub.is_finite() {
                count += 1;
            }
        }
        count
    }

    /// Generate the elastic index map; elastics are numbered from
    /// `problem.number_variables()` upward.
    pub fn generate(problem: &dyn Problem) -> Self {
        let mut elastic = ElasticVariables::default();
        let mut index = problem.number_variables();
        for j in 0..problem.number_constraints() {
            let bounds = problem.constraint_bounds(j);
            if bounds.lb.is_finite() {
                elastic.negative.push((j, index));
                index += 1;
            }
            if bounds.ub.is_finite() {
                elastic.positive.push((j, index));
                index += 1;
            }
        }
        elastic
    }

    /// All elastic variable indices.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.negative
            .iter()
            .map(|&(_, i)| i)
            .chain(self.positive.iter().map(|&(_, i)| i))
    }
}

/// Strip elastic components from a direction so that it matches the
/// original variable space again.
pub fn remove_elastics_from_direction(direction: &mut Direction, number_variables: usize) {
    direction.x.truncate(number_variables);
    direction.multipliers.lower_bounds.truncate(number_variables);
    direction.multipliers.upper_bounds.truncate(number_variables);
    direction.active_set.bounds_at_lower.retain(|&i| i < number_variables);
    direction.active_set.bounds_at_upper.retain(|&i| i < number_variables);
    direction.norm = norm_inf(&direction.x);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::Direction;
    use crate::linalg::sparse_vector::SparseVector;
    use crate::linalg::symmetric::SymmetricMatrix;
    use crate::problem::Range;

    struct TwoSided;

    impl Problem for TwoSided {
        fn name(&self) -> &str {
            "two-sided"
        }
        fn number_variables(&self) -> usize {
            2
        }
        fn number_constraints(&self) -> usize {
            2
        }
        fn variable_bounds(&self, _i: usize) -> Range {
            Range::UNBOUNDED
        }
        fn constraint_bounds(&self, j: usize) -> Range {
            if j == 0 {
                Range { lb: 0.0, ub: 1.0 }
            } else {
                Range { lb: f64::NEG_INFINITY, ub: 2.0 }
            }
        }
        fn initial_primal(&self) -> Vec<f64> {
            vec![0.0; 2]
        }
        fn evaluate_objective(&self, _x: &[f64]) -> f64 {
            0.0
        }
        fn evaluate_constraints(&self, _x: &[f64], _constraints: &mut [f64]) {}
        fn evaluate_objective_gradient(&self, _x: &[f64], _gradient: &mut SparseVector) {}
        fn evaluate_constraint_jacobian(&self, _x: &[f64], _jacobian: &mut [SparseVector]) {}
        fn evaluate_lagrangian_hessian(
            &self,
            _x: &[f64],
            _objective_multiplier: f64,
            _multipliers: &[f64],
            _hessian: &mut SymmetricMatrix,
        ) {
        }
    }

    #[test]
    fn elastic_count_follows_finite_sides() {
        let problem = TwoSided;
        // constraint 0 contributes two sides, constraint 1 one side
        assert_eq!(ElasticVariables::count(&problem), 3);

        let elastic = ElasticVariables::generate(&problem);
        assert_eq!(elastic.negative, vec![(0, 2)]);
        assert_eq!(elastic.positive, vec![(0, 3), (1, 4)]);
    }

    #[test]
    fn stripping_restores_the_original_dimension() {
        let mut direction = Direction::zero(4, 1);
        direction.x = vec![1.0, -2.0, 5.0, 7.0];
        direction.active_set.bounds_at_lower = vec![0, 3];
        remove_elastics_from_direction(&mut direction, 2);

        assert_eq!(direction.x.len(), 2);
        assert_eq!(direction.norm, 2.0);
        assert_eq!(direction.active_set.bounds_at_lower, vec![0]);
    }
}
