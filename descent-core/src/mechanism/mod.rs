//! Globalization mechanisms.
//!
//! A mechanism turns directions into accepted iterates: the trust region
//! re-solves the subproblem under a shrinking radius, the line search
//! backtracks along a fixed direction. Both drive the trial loop through
//! [`ConstraintRelaxation::is_acceptable`].

pub mod line_search;
pub mod trust_region;

use crate::direction::Direction;
use crate::error::SolverError;
use crate::iterate::Iterate;
use crate::problem::Problem;
use crate::statistics::Statistics;

pub use line_search::BacktrackingLineSearch;
pub use trust_region::TrustRegion;

/// Produces the next accepted iterate.
pub trait GlobalizationMechanism {
    /// Initialize the nested strategies at the first iterate.
    fn initialize(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), SolverError>;

    /// Compute an acceptable iterate from the current one; returns the new
    /// iterate and the taken step norm.
    fn compute_acceptable_iterate(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<(Iterate, f64), SolverError>;

    /// Backend solves so far.
    fn number_subproblems_solved(&self) -> usize;

    /// Hessian evaluations so far.
    fn hessian_evaluation_count(&self) -> usize;

    /// Penalty parameter of the relaxation, when one exists.
    fn penalty_parameter(&self) -> Option<f64>;
}

/// Trial iterate at `x + α·d`, with multipliers interpolated between the
/// current ones and the direction's full-step estimates. The sign convention
/// on the bound duals is re-enforced after interpolation.
pub fn assemble_trial_iterate(
    current_iterate: &Iterate,
    direction: &Direction,
    step_length: f64,
    number_variables: usize,
) -> Iterate {
    let mut trial = current_iterate.clone();
    for i in 0..number_variables.min(direction.x.len()) {
        trial.x[i] = current_iterate.x[i] + step_length * direction.x[i];
    }
    for j in 0..trial.multipliers.constraints.len().min(direction.multipliers.constraints.len()) {
        trial.multipliers.constraints[j] = current_iterate.multipliers.constraints[j]
            + step_length
                * (direction.multipliers.constraints[j] - current_iterate.multipliers.constraints[j]);
    }
    let bound_count = number_variables.min(direction.multipliers.lower_bounds.len());
    for i in 0..bound_count {
        trial.multipliers.lower_bounds[i] = current_iterate.multipliers.lower_bounds[i]
            + step_length
                * (direction.multipliers.lower_bounds[i] - current_iterate.multipliers.lower_bounds[i]);
        trial.multipliers.upper_bounds[i] = current_iterate.multipliers.upper_bounds[i]
            + step_length
                * (direction.multipliers.upper_bounds[i] - current_iterate.multipliers.upper_bounds[i]);
    }
    trial.multipliers.enforce_signs();
    trial.invalidate_cache();
    trial
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trial_assembly_interpolates_primal_and_dual() {
        let mut current = Iterate::new(vec![1.0, 2.0], 2, 1);
        current.multipliers.constraints[0] = 1.0;

        let mut direction = Direction::zero(2, 1);
        direction.x = vec![2.0, -2.0];
        direction.multipliers.constraints[0] = 3.0;

        let trial = assemble_trial_iterate(&current, &direction, 0.5, 2);
        assert_eq!(trial.x[0], 2.0);
        assert_eq!(trial.x[1], 1.0);
        assert_eq!(trial.multipliers.constraints[0], 2.0);
        assert!(!trial.is_objective_computed);
    }

    #[test]
    fn trial_assembly_enforces_dual_signs() {
        let current = Iterate::new(vec![0.0], 1, 0);
        let mut direction = Direction::zero(1, 0);
        direction.multipliers.lower_bounds[0] = -4.0;
        direction.multipliers.upper_bounds[0] = 4.0;

        let trial = assemble_trial_iterate(&current, &direction, 1.0, 1);
        assert_eq!(trial.multipliers.lower_bounds[0], 0.0);
        assert_eq!(trial.multipliers.upper_bounds[0], 0.0);
    }
}
