//! Trust-region mechanism.
//!
//! Builds the subproblem under the current radius, offers the full step to
//! the relaxation layer, and contracts the radius on rejection (the
//! subproblem is rebuilt because its bounds moved). An accepted step that
//! hits the boundary doubles the radius. The radius collapsing below
//! machine precision is fatal.

use crate::direction::SubproblemStatus;
use crate::error::SolverError;
use crate::iterate::Iterate;
use crate::mechanism::{assemble_trial_iterate, GlobalizationMechanism};
use crate::problem::Problem;
use crate::relaxation::ConstraintRelaxation;
use crate::statistics::{Statistics, DOUBLE_WIDTH, INT_WIDTH};

/// Trust-region trial loop.
pub struct TrustRegion {
    relaxation: Box<dyn ConstraintRelaxation>,
    radius: f64,
    activity_tolerance: f64,
    min_radius: f64,
    max_inner_iterations: usize,
}

impl TrustRegion {
    /// New mechanism with the given initial radius.
    pub fn new(
        relaxation: Box<dyn ConstraintRelaxation>,
        initial_radius: f64,
        activity_tolerance: f64,
        min_radius: f64,
        max_inner_iterations: usize,
    ) -> Self {
        TrustRegion {
            relaxation,
            radius: initial_radius,
            activity_tolerance,
            min_radius,
            max_inner_iterations,
        }
    }

    /// Current trust-region radius.
    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl GlobalizationMechanism for TrustRegion {
    fn initialize(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), SolverError> {
        statistics.add_column("minor", INT_WIDTH);
        statistics.add_column("radius", DOUBLE_WIDTH);
        self.relaxation.initialize(statistics, problem, first_iterate)
    }

    fn compute_acceptable_iterate(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<(Iterate, f64), SolverError> {
        let number_variables = problem.number_variables();

        for inner_iteration in 0..self.max_inner_iterations {
            if self.radius < self.min_radius {
                return Err(SolverError::TrustRegionCollapse { radius: self.radius });
            }

            self.relaxation
                .create_current_subproblem(problem, current_iterate, self.radius)?;
            let mut direction =
                match self.relaxation.compute_feasible_direction(statistics, problem, current_iterate) {
                    Ok(direction) => direction,
                    // failed local solves contract the region and retry
                    Err(error) if error.is_recoverable() => {
                        self.radius /= 2.0;
                        continue;
                    }
                    Err(SolverError::Subproblem(_)) | Err(SolverError::LinearSolver(_)) => {
                        self.radius /= 2.0;
                        continue;
                    }
                    Err(error) => return Err(error),
                };
            if matches!(
                direction.status,
                SubproblemStatus::UnboundedProblem | SubproblemStatus::Error
            ) {
                self.radius /= 2.0;
                continue;
            }

            // multipliers of displacement bounds that sit on the trust
            // region belong to the region, not to the problem
            for i in 0..number_variables.min(direction.x.len()) {
                if (direction.x[i] - self.radius).abs() <= self.activity_tolerance {
                    direction.multipliers.upper_bounds[i] = 0.0;
                } else if (direction.x[i] + self.radius).abs() <= self.activity_tolerance {
                    direction.multipliers.lower_bounds[i] = 0.0;
                }
            }

            let model = self.relaxation.generate_predicted_reduction_model(problem, &direction);
            let mut trial_iterate =
                assemble_trial_iterate(current_iterate, &direction, 1.0, number_variables);
            let accepted = self.relaxation.is_acceptable(
                statistics,
                problem,
                current_iterate,
                &mut trial_iterate,
                &direction,
                &model,
                1.0,
            )?;

            if accepted {
                statistics.add_integer("minor", inner_iteration + 1);
                statistics.add_double("radius", self.radius);
                // grow the region when the step pushed against it
                if self.radius - self.activity_tolerance <= direction.norm {
                    self.radius *= 2.0;
                }
                return Ok((trial_iterate, direction.norm));
            }
            self.radius /= 2.0;
        }
        Err(SolverError::InnerIterationLimit(self.max_inner_iterations))
    }

    fn number_subproblems_solved(&self) -> usize {
        self.relaxation.number_subproblems_solved()
    }

    fn hessian_evaluation_count(&self) -> usize {
        self.relaxation.hessian_evaluation_count()
    }

    fn penalty_parameter(&self) -> Option<f64> {
        self.relaxation.penalty_parameter()
    }
}
