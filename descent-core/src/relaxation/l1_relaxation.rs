//! l1 relaxation with penalty steering.
//!
//! The constraints are relaxed with nonnegative elastic variables
//! (`c_j + n_j − p_j ∈ [cL_j, cU_j]`) whose sum enters the model objective
//! next to μ·f. The penalty parameter μ is steered per outer iteration by
//! the Byrd-Omojokun-Waltz rules: compare the achievable linearized
//! infeasibility at the current μ against the one at μ = 0, and divide μ
//! until the direction makes sufficient progress toward feasibility and in
//! the merit model. Elastic variables are injected before each backend
//! solve and stripped from the returned direction; they never appear in the
//! iterate.

use crate::direction::{Direction, PredictedReductionModel};
use crate::error::SolverError;
use crate::iterate::{Iterate, Multipliers};
use crate::problem::{Problem, Range};
use crate::relaxation::{remove_elastics_from_direction, ConstraintRelaxation, ElasticVariables};
use crate::statistics::{Statistics, DOUBLE_WIDTH};
use crate::strategy::GlobalizationStrategy;
use crate::subproblem::{complementarity_error, compute_optimality_conditions, Subproblem};

/// Steering constants.
#[derive(Debug, Clone, Copy)]
pub struct L1RelaxationParameters {
    /// Initial penalty parameter μ₀
    pub initial_parameter: f64,
    /// Required fraction of the ideal feasibility decrease (ε₁)
    pub epsilon1: f64,
    /// Required fraction of the ideal merit decrease (ε₂)
    pub epsilon2: f64,
    /// Divisor applied to μ in the inner steering loop
    pub decrease_factor: f64,
}

/// Linearized residuals below this threshold count as zero (inactive
/// elastics from an interior-point backend are tiny, not exact zeros).
const STEERING_TOLERANCE: f64 = 1e-8;

/// Single-phase penalty relaxation.
pub struct L1Relaxation {
    subproblem: Box<dyn Subproblem>,
    strategy: Box<dyn GlobalizationStrategy>,
    elastic: ElasticVariables,
    penalty_parameter: f64,
    parameters: L1RelaxationParameters,
    strategy_resets: usize,
}

impl L1Relaxation {
    /// New relaxation with elastic bookkeeping for the problem.
    pub fn new(
        problem: &dyn Problem,
        subproblem: Box<dyn Subproblem>,
        strategy: Box<dyn GlobalizationStrategy>,
        parameters: L1RelaxationParameters,
    ) -> Self {
        L1Relaxation {
            subproblem,
            strategy,
            elastic: ElasticVariables::generate(problem),
            penalty_parameter: parameters.initial_parameter,
            parameters,
            strategy_resets: 0,
        }
    }

    /// Current penalty parameter μ.
    pub fn current_penalty_parameter(&self) -> f64 {
        self.penalty_parameter
    }

    /// How many times steering forced a strategy reset.
    pub fn strategy_reset_count(&self) -> usize {
        self.strategy_resets
    }

    fn add_elastics_to_subproblem(&mut self, problem: &dyn Problem) {
        let workspace = self.subproblem.workspace_mut();
        for &(j, index) in &self.elastic.positive {
            workspace.objective_gradient.insert(index, 1.0);
            workspace.constraints_jacobian[j].insert(index, -1.0);
            workspace.variables_bounds[index] = Range { lb: 0.0, ub: f64::INFINITY };
        }
        for &(j, index) in &self.elastic.negative {
            workspace.objective_gradient.insert(index, 1.0);
            workspace.constraints_jacobian[j].insert(index, 1.0);
            workspace.variables_bounds[index] = Range { lb: 0.0, ub: f64::INFINITY };
        }
        workspace.number_variables =
            problem.number_variables() + self.elastic.positive.len() + self.elastic.negative.len();
    }

    fn remove_elastics_from_subproblem(&mut self, problem: &dyn Problem) {
        let workspace = self.subproblem.workspace_mut();
        for &(j, index) in &self.elastic.positive {
            workspace.objective_gradient.remove(index);
            workspace.constraints_jacobian[j].remove(index);
        }
        for &(j, index) in &self.elastic.negative {
            workspace.objective_gradient.remove(index);
            workspace.constraints_jacobian[j].remove(index);
        }
        workspace.number_variables = problem.number_variables();
    }

    /// l1 residual of the linearized constraints: sum of the elastic
    /// components of the direction.
    fn linearized_constraint_residual(&self, direction_x: &[f64]) -> f64 {
        self.elastic
            .indices()
            .filter(|&i| i < direction_x.len())
            .map(|i| direction_x[i])
            .sum()
    }

    /// Combined KKT and complementarity error at the given multipliers.
    fn compute_error(
        problem: &dyn Problem,
        iterate: &mut Iterate,
        multipliers: &Multipliers,
        objective_multiplier: f64,
    ) -> Result<f64, SolverError> {
        let mut error = complementarity_error(problem, iterate, multipliers, false)?;
        let gradient = iterate.lagrangian_gradient(problem, objective_multiplier, multipliers)?;
        error += crate::linalg::norm_1(&gradient);
        Ok(error)
    }

    /// Solve with the elastics attached, then clean the subproblem scratch.
    /// The returned direction still carries its elastic components.
    fn solve_subproblem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        objective_multiplier: f64,
    ) -> Result<Direction, SolverError> {
        let mut direction = self.subproblem.solve(statistics, problem, iterate)?;
        direction.objective_multiplier = objective_multiplier;
        self.remove_elastics_from_subproblem(problem);
        Ok(direction)
    }

    /// Rebuild the objective for a new penalty value and re-solve.
    fn resolve_subproblem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        objective_multiplier: f64,
    ) -> Result<Direction, SolverError> {
        self.subproblem.build_objective_model(problem, iterate, objective_multiplier)?;
        self.add_elastics_to_subproblem(problem);
        self.solve_subproblem(statistics, problem, iterate, objective_multiplier)
    }

    /// Byrd's steering rules: update μ and compute the direction.
    fn solve_with_steering_rule(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<Direction, SolverError> {
        let mut direction =
            self.solve_subproblem(statistics, problem, iterate, self.penalty_parameter)?;

        if 0.0 < self.penalty_parameter {
            let mut linearized_residual = self.linearized_constraint_residual(&direction.x);
            let current_infeasibility = iterate.progress.infeasibility;

            // the problem had to be relaxed: consider steering μ down
            if STEERING_TOLERANCE < linearized_residual {
                let penalty_before_steering = self.penalty_parameter;

                // lowest achievable linearized violation (μ = 0)
                let direction_lowest_violation =
                    self.resolve_subproblem(statistics, problem, iterate, 0.0)?;
                let residual_lowest_violation =
                    self.linearized_constraint_residual(&direction_lowest_violation.x);

                let nothing_to_gain = 0.0 < current_infeasibility
                    && current_infeasibility - residual_lowest_violation <= STEERING_TOLERANCE;
                if !nothing_to_gain {
                    let error_lowest_violation = Self::compute_error(
                        problem,
                        iterate,
                        &direction_lowest_violation.multipliers,
                        0.0,
                    )?;
                    if error_lowest_violation <= STEERING_TOLERANCE {
                        self.penalty_parameter = 0.0;
                        direction = direction_lowest_violation.clone();
                    } else {
                        let term = error_lowest_violation / 1.0_f64.max(current_infeasibility);
                        self.penalty_parameter = self.penalty_parameter.min(term * term);
                        if self.penalty_parameter < penalty_before_steering {
                            if self.penalty_parameter == 0.0 {
                                direction = direction_lowest_violation.clone();
                            } else {
                                direction = self.resolve_subproblem(
                                    statistics,
                                    problem,
                                    iterate,
                                    self.penalty_parameter,
                                )?;
                                linearized_residual =
                                    self.linearized_constraint_residual(&direction.x);
                            }
                        }

                        // decrease μ until the direction achieves a fraction
                        // of the ideal feasibility decrease (C1) and of the
                        // ideal merit decrease (C2)
                        let mut condition1 = false;
                        let mut condition2 = false;
                        while !condition2 {
                            if !condition1 {
                                let ideal_decrease_reached = (residual_lowest_violation
                                    <= STEERING_TOLERANCE
                                    && linearized_residual <= STEERING_TOLERANCE)
                                    || (STEERING_TOLERANCE < residual_lowest_violation
                                        && self.parameters.epsilon1
                                            * (current_infeasibility - residual_lowest_violation)
                                            <= current_infeasibility - linearized_residual);
                                if ideal_decrease_reached {
                                    condition1 = true;
                                }
                            }
                            if condition1
                                && self.parameters.epsilon2
                                    * (current_infeasibility - direction_lowest_violation.objective)
                                    <= current_infeasibility - direction.objective
                            {
                                condition2 = true;
                            }
                            if !condition2 {
                                self.penalty_parameter /= self.parameters.decrease_factor;
                                if self.penalty_parameter < 1e-10 {
                                    self.penalty_parameter = 0.0;
                                    condition2 = true;
                                } else {
                                    direction = self.resolve_subproblem(
                                        statistics,
                                        problem,
                                        iterate,
                                        self.penalty_parameter,
                                    )?;
                                    linearized_residual =
                                        self.linearized_constraint_residual(&direction.x);
                                }
                            }
                        }
                    }
                }

                if self.penalty_parameter < penalty_before_steering {
                    self.strategy.reset();
                    self.strategy_resets += 1;
                }
            }
        }
        Ok(direction)
    }

    /// Predicted reduction of the relaxation: the subproblem's model plus
    /// the linearized constraint violation term.
    fn compute_predicted_reduction(
        &self,
        problem: &dyn Problem,
        current_iterate: &Iterate,
        direction: &Direction,
        predicted_reduction_model: &PredictedReductionModel,
        step_length: f64,
    ) -> f64 {
        let current_infeasibility = current_iterate.progress.infeasibility;
        if step_length == 1.0 {
            current_infeasibility + predicted_reduction_model.predict(step_length)
        } else {
            // linearized violation at a partial step: c(x) + α∇c(x)ᵀd
            let linearized_violation: f64 = (0..problem.number_constraints())
                .map(|j| {
                    let component = current_iterate.constraints[j]
                        + step_length * current_iterate.constraints_jacobian[j].dot(&direction.x);
                    problem.constraint_violation_of(component, j)
                })
                .sum();
            current_infeasibility - linearized_violation + predicted_reduction_model.predict(step_length)
        }
    }

    fn check_acceptance_inner(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        trial_iterate: &mut Iterate,
        direction: &Direction,
        predicted_reduction_model: &PredictedReductionModel,
        step_length: f64,
    ) -> Result<bool, SolverError> {
        if self.subproblem.take_definition_changed() {
            self.strategy.reset();
            self.subproblem.compute_progress_measures(problem, current_iterate)?;
        }

        let accept = if direction.norm == 0.0 {
            true
        } else {
            self.subproblem.compute_progress_measures(problem, trial_iterate)?;
            let predicted_reduction = self.compute_predicted_reduction(
                problem,
                current_iterate,
                direction,
                predicted_reduction_model,
                step_length,
            );
            self.strategy.check_acceptance(
                &current_iterate.progress,
                &trial_iterate.progress,
                self.penalty_parameter,
                predicted_reduction,
            )
        };

        if accept {
            statistics.add_double("penalty param.", self.penalty_parameter);
            trial_iterate.multipliers.objective = direction.objective_multiplier;
            compute_optimality_conditions(problem, trial_iterate, direction.objective_multiplier)?;
            self.subproblem.register_accepted_iterate(problem, trial_iterate)?;
        }
        Ok(accept)
    }
}

impl ConstraintRelaxation for L1Relaxation {
    fn initialize(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), SolverError> {
        statistics.add_column("penalty param.", DOUBLE_WIDTH);
        self.subproblem.initialize(statistics, problem, first_iterate)?;
        first_iterate.multipliers.objective = self.penalty_parameter;
        compute_optimality_conditions(problem, first_iterate, self.penalty_parameter)?;
        self.strategy.initialize(first_iterate);
        Ok(())
    }

    fn create_current_subproblem(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        trust_region_radius: f64,
    ) -> Result<(), SolverError> {
        self.subproblem.create_current_subproblem(
            problem,
            iterate,
            self.penalty_parameter,
            trust_region_radius,
        )?;
        self.add_elastics_to_subproblem(problem);
        Ok(())
    }

    fn compute_feasible_direction(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<Direction, SolverError> {
        let mut direction = self.solve_with_steering_rule(statistics, problem, iterate)?;
        remove_elastics_from_direction(&mut direction, problem.number_variables());
        Ok(direction)
    }

    fn solve_feasibility_problem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        _phase_2_direction: &Direction,
    ) -> Result<Direction, SolverError> {
        let mut direction = self.resolve_subproblem(statistics, problem, iterate, 0.0)?;
        remove_elastics_from_direction(&mut direction, problem.number_variables());
        Ok(direction)
    }

    fn compute_second_order_correction(
        &mut self,
        problem: &dyn Problem,
        trial_iterate: &mut Iterate,
    ) -> Result<Direction, SolverError> {
        let mut direction = self.subproblem.compute_second_order_correction(problem, trial_iterate)?;
        remove_elastics_from_direction(&mut direction, problem.number_variables());
        Ok(direction)
    }

    fn generate_predicted_reduction_model(
        &self,
        problem: &dyn Problem,
        direction: &Direction,
    ) -> PredictedReductionModel {
        self.subproblem.generate_predicted_reduction_model(problem, direction)
    }

    fn is_acceptable(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        current_iterate: &mut Iterate,
        trial_iterate: &mut Iterate,
        direction: &Direction,
        predicted_reduction_model: &PredictedReductionModel,
        step_length: f64,
    ) -> Result<bool, SolverError> {
        match self.check_acceptance_inner(
            statistics,
            problem,
            current_iterate,
            trial_iterate,
            direction,
            predicted_reduction_model,
            step_length,
        ) {
            Ok(accept) => Ok(accept),
            Err(error) if error.is_recoverable() => Ok(false),
            Err(error) => Err(error),
        }
    }

    fn number_subproblems_solved(&self) -> usize {
        self.subproblem.number_subproblems_solved()
    }

    fn hessian_evaluation_count(&self) -> usize {
        self.subproblem.hessian_evaluation_count()
    }

    fn penalty_parameter(&self) -> Option<f64> {
        Some(self.penalty_parameter)
    }
}
