//! Backtracking line search.
//!
//! One subproblem solve per outer iteration (no trust region), then a
//! geometric backtracking loop on the step length. The direction must be a
//! descent direction for the model; when it is not, or when the step
//! collapses, a feasibility-restoration solve is attempted once before
//! failing. Optionally a second-order correction is tried upon the first
//! rejection.

use crate::direction::{Direction, SubproblemStatus};
use crate::error::SolverError;
use crate::iterate::Iterate;
use crate::mechanism::{assemble_trial_iterate, GlobalizationMechanism};
use crate::problem::Problem;
use crate::relaxation::ConstraintRelaxation;
use crate::statistics::{Statistics, DOUBLE_WIDTH};
use crate::subproblem::SecondOrderCorrection;

/// Backtracking line-search trial loop.
pub struct BacktrackingLineSearch {
    relaxation: Box<dyn ConstraintRelaxation>,
    backtracking_ratio: f64,
    step_tolerance: f64,
    max_backtracks: usize,
    soc_strategy: SecondOrderCorrection,
}

impl BacktrackingLineSearch {
    /// New mechanism with the given contraction ratio.
    pub fn new(
        relaxation: Box<dyn ConstraintRelaxation>,
        backtracking_ratio: f64,
        step_tolerance: f64,
        max_backtracks: usize,
        soc_strategy: SecondOrderCorrection,
    ) -> Self {
        BacktrackingLineSearch {
            relaxation,
            backtracking_ratio,
            step_tolerance,
            max_backtracks,
            soc_strategy,
        }
    }

    /// Backtrack along the direction; `Ok(None)` means the step collapsed.
    fn backtrack(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        direction: &Direction,
    ) -> Result<Option<(Iterate, f64)>, SolverError> {
        let number_variables = problem.number_variables();
        let model = self.relaxation.generate_predicted_reduction_model(problem, direction);

        // a zero direction is accepted in place (stationarity of the model)
        if direction.norm == 0.0 {
            let mut trial_iterate =
                assemble_trial_iterate(current_iterate, direction, 1.0, number_variables);
            let accepted = self.relaxation.is_acceptable(
                statistics,
                problem,
                current_iterate,
                &mut trial_iterate,
                direction,
                &model,
                1.0,
            )?;
            return Ok(accepted.then_some((trial_iterate, 0.0)));
        }

        let mut step_length: f64 = 1.0;
        for backtrack in 0..self.max_backtracks {
            if step_length * direction.norm <= self.step_tolerance {
                break;
            }
            let mut trial_iterate =
                assemble_trial_iterate(current_iterate, direction, step_length, number_variables);
            let accepted = self.relaxation.is_acceptable(
                statistics,
                problem,
                current_iterate,
                &mut trial_iterate,
                direction,
                &model,
                step_length,
            )?;
            if accepted {
                statistics.add_double("step length", step_length);
                return Ok(Some((trial_iterate, step_length * direction.norm)));
            }

            // try one second-order correction on the first rejection
            if backtrack == 0 && self.soc_strategy == SecondOrderCorrection::OnRejection {
                if let Some(result) = self.try_second_order_correction(
                    statistics,
                    problem,
                    current_iterate,
                    &mut trial_iterate,
                    &model,
                )? {
                    return Ok(Some(result));
                }
            }
            step_length *= self.backtracking_ratio;
        }
        Ok(None)
    }

    fn try_second_order_correction(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        rejected_trial: &mut Iterate,
        model: &crate::direction::PredictedReductionModel,
    ) -> Result<Option<(Iterate, f64)>, SolverError> {
        let corrected = match self
            .relaxation
            .compute_second_order_correction(problem, rejected_trial)
        {
            Ok(direction) => direction,
            Err(SolverError::NotImplemented(_)) => return Ok(None),
            Err(error) if error.is_recoverable() => return Ok(None),
            Err(error) => return Err(error),
        };
        let corrected_model = self
            .relaxation
            .generate_predicted_reduction_model(problem, &corrected);

        // keep the correction only when it strictly improves the prediction
        if corrected_model.predict(1.0) <= model.predict(1.0) {
            return Ok(None);
        }
        let mut trial_iterate =
            assemble_trial_iterate(current_iterate, &corrected, 1.0, problem.number_variables());
        let accepted = self.relaxation.is_acceptable(
            statistics,
            problem,
            current_iterate,
            &mut trial_iterate,
            &corrected,
            &corrected_model,
            1.0,
        )?;
        if accepted {
            statistics.add_double("step length", 1.0);
            return Ok(Some((trial_iterate, corrected.norm)));
        }
        Ok(None)
    }
}

impl GlobalizationMechanism for BacktrackingLineSearch {
    fn initialize(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), SolverError> {
        statistics.add_column("step length", DOUBLE_WIDTH);
        self.relaxation.initialize(statistics, problem, first_iterate)
    }

    fn compute_acceptable_iterate(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
    ) -> Result<(Iterate, f64), SolverError> {
        self.relaxation
            .create_current_subproblem(problem, current_iterate, f64::INFINITY)?;
        let mut direction =
            self.relaxation
                .compute_feasible_direction(statistics, problem, current_iterate)?;
        if matches!(
            direction.status,
            SubproblemStatus::UnboundedProblem | SubproblemStatus::Error
        ) {
            return Err(SolverError::Subproblem(format!(
                "local model solve returned {:?}",
                direction.status
            )));
        }

        // the model must predict descent; otherwise fall back to the
        // feasibility problem immediately
        let model = self.relaxation.generate_predicted_reduction_model(problem, &direction);
        let mut recovered = false;
        let non_descent =
            0.0 <= model.linear_term() && model.predict(1.0) <= 0.0 && !direction.is_relaxed;
        if 0.0 < direction.norm && non_descent {
            direction = self.relaxation.solve_feasibility_problem(
                statistics,
                problem,
                current_iterate,
                &direction,
            )?;
            recovered = true;
        }

        if let Some(result) = self.backtrack(statistics, problem, current_iterate, &direction)? {
            return Ok(result);
        }

        // the step collapsed: recover through the feasibility problem once
        if !recovered {
            let restoration_direction = self.relaxation.solve_feasibility_problem(
                statistics,
                problem,
                current_iterate,
                &direction,
            )?;
            if let Some(result) =
                self.backtrack(statistics, problem, current_iterate, &restoration_direction)?
            {
                return Ok(result);
            }
        }
        Err(SolverError::LineSearchCollapse {
            step_length: self.step_tolerance,
        })
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
