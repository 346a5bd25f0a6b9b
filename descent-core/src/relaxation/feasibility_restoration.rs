//! Feasibility restoration.
//!
//! A two-phase state machine. In the optimality phase the normal subproblem
//! is solved; when its linearized feasible region is empty, the subproblem
//! is reformed into a feasibility problem (minimize the linearized violation
//! of the infeasible constraints) and the solver enters the restoration
//! phase. Each phase carries its own globalization strategy; on every phase
//! switch the abandoned strategy is notified of the current point and the
//! entering strategy is reset.

use crate::direction::{
    ConstraintFeasibility, ConstraintPartition, Direction, PredictedReductionModel,
};
use crate::error::SolverError;
use crate::iterate::{Iterate, ProgressMeasures};
use crate::problem::{Norm, Problem};
use crate::relaxation::ConstraintRelaxation;
use crate::statistics::{Statistics, INT_WIDTH};
use crate::strategy::GlobalizationStrategy;
use crate::subproblem::{
    compute_optimality_conditions, set_restoration_multipliers, Subproblem,
};

/// Which problem the steps currently come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Optimality,
    FeasibilityRestoration,
}

/// Two-phase feasibility-restoration relaxation.
pub struct FeasibilityRestoration {
    subproblem: Box<dyn Subproblem>,
    phase_1_strategy: Box<dyn GlobalizationStrategy>,
    phase_2_strategy: Box<dyn GlobalizationStrategy>,
    current_phase: Phase,
    current_partition: Option<ConstraintPartition>,
}

impl FeasibilityRestoration {
    /// New relaxation owning the subproblem and one strategy per phase.
    pub fn new(
        subproblem: Box<dyn Subproblem>,
        phase_1_strategy: Box<dyn GlobalizationStrategy>,
        phase_2_strategy: Box<dyn GlobalizationStrategy>,
    ) -> Self {
        FeasibilityRestoration {
            subproblem,
            phase_1_strategy,
            phase_2_strategy,
            current_phase: Phase::Optimality,
            current_partition: None,
        }
    }

    /// Phase the state machine is in.
    pub fn current_phase(&self) -> Phase {
        self.current_phase
    }

    fn form_feasibility_problem(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        phase_2_direction: &[f64],
        partition: &ConstraintPartition,
    ) -> Result<(), SolverError> {
        // multipliers of the violated constraints take their restoration
        // values before the Hessian is rebuilt
        set_restoration_multipliers(
            &mut self.subproblem.workspace_mut().constraints_multipliers,
            partition,
        );
        self.subproblem.build_objective_model(problem, iterate, 0.0)?;

        iterate.evaluate_constraints(problem)?;
        let constraints = iterate.constraints.clone();
        let workspace = self.subproblem.workspace_mut();
        workspace.compute_feasibility_linear_objective(iterate, partition);
        workspace.generate_feasibility_bounds(problem, &constraints, partition);
        workspace.set_initial_point(phase_2_direction);
        Ok(())
    }

    fn compute_infeasibility_measures(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        partition: &ConstraintPartition,
    ) -> Result<(), SolverError> {
        iterate.evaluate_constraints(problem)?;
        // feasibility measure: residual of all constraints; optimality
        // measure: residual of the linearly infeasible ones only
        let infeasibility = problem.constraint_violation(&iterate.constraints, Norm::L1);
        let objective =
            problem.constraint_violation_subset(&iterate.constraints, &partition.infeasible, Norm::L1);
        iterate.progress = ProgressMeasures { infeasibility, objective };
        Ok(())
    }

    /// Partition built from the pointwise violations of the current iterate,
    /// used when the backend did not provide one.
    fn partition_from_violations(problem: &dyn Problem, iterate: &Iterate) -> ConstraintPartition {
        let mut partition = ConstraintPartition::new(problem.number_constraints());
        for j in 0..problem.number_constraints() {
            let bounds = problem.constraint_bounds(j);
            let value = iterate.constraints[j];
            if value < bounds.lb {
                partition.infeasible.push(j);
                partition.constraint_feasibility[j] = ConstraintFeasibility::InfeasibleLower;
            } else if bounds.ub < value {
                partition.infeasible.push(j);
                partition.constraint_feasibility[j] = ConstraintFeasibility::InfeasibleUpper;
            } else {
                partition.feasible.push(j);
            }
        }
        partition
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
            self.phase_2_strategy.reset();
            self.subproblem.compute_progress_measures(problem, current_iterate)?;
        }

        let step_norm = step_length * direction.norm;
        let mut accept = false;
        if step_norm == 0.0 {
            accept = true;
        } else {
            // restoration → optimality as soon as an un-relaxed direction
            // comes back
            if !direction.is_relaxed && self.current_phase == Phase::FeasibilityRestoration {
                self.current_phase = Phase::Optimality;
                self.subproblem.compute_progress_measures(problem, current_iterate)?;
            }
            // optimality → restoration when a relaxed direction comes back
            else if direction.is_relaxed && self.current_phase == Phase::Optimality {
                self.current_phase = Phase::FeasibilityRestoration;
                let partition = direction
                    .constraint_partition
                    .clone()
                    .expect("a relaxed direction must carry a constraint partition");
                self.phase_2_strategy.notify(current_iterate);
                self.phase_1_strategy.reset();
                self.compute_infeasibility_measures(problem, current_iterate, &partition)?;
                self.phase_1_strategy.notify(current_iterate);
                self.current_partition = Some(partition);
            }

            if self.current_phase == Phase::FeasibilityRestoration {
                let partition = direction
                    .constraint_partition
                    .clone()
                    .or_else(|| self.current_partition.clone())
                    .expect("restoration phase requires a constraint partition");
                self.compute_infeasibility_measures(problem, trial_iterate, &partition)?;
            } else {
                self.subproblem.compute_progress_measures(problem, trial_iterate)?;
            }

            let predicted_reduction = predicted_reduction_model.predict(step_length);
            let strategy = match self.current_phase {
                Phase::Optimality => &mut self.phase_2_strategy,
                Phase::FeasibilityRestoration => &mut self.phase_1_strategy,
            };
            accept = strategy.check_acceptance(
                &current_iterate.progress,
                &trial_iterate.progress,
                direction.objective_multiplier,
                predicted_reduction,
            );
        }

        if accept {
            statistics.add_integer(
                "phase",
                if direction.is_relaxed { 1 } else { 2 },
            );
            if direction.is_relaxed {
                let partition = direction
                    .constraint_partition
                    .as_ref()
                    .expect("a relaxed direction must carry a constraint partition");
                set_restoration_multipliers(&mut trial_iterate.multipliers.constraints, partition);
            }
            trial_iterate.evaluate_objective(problem)?;
            trial_iterate.multipliers.objective = direction.objective_multiplier;
            compute_optimality_conditions(problem, trial_iterate, direction.objective_multiplier)?;
            self.subproblem.register_accepted_iterate(problem, trial_iterate)?;
        }
        Ok(accept)
    }
}

impl ConstraintRelaxation for FeasibilityRestoration {
    fn initialize(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), SolverError> {
        statistics.add_column("phase", INT_WIDTH);
        self.subproblem.initialize(statistics, problem, first_iterate)?;
        first_iterate.multipliers.objective = problem.objective_sign();
        compute_optimality_conditions(problem, first_iterate, problem.objective_sign())?;
        self.phase_1_strategy.initialize(first_iterate);
        self.phase_2_strategy.initialize(first_iterate);
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
            problem.objective_sign(),
            trust_region_radius,
        )
    }

    fn compute_feasible_direction(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<Direction, SolverError> {
        let mut direction = self.subproblem.solve(statistics, problem, iterate)?;
        if direction.status != crate::direction::SubproblemStatus::Infeasible {
            direction.objective_multiplier = problem.objective_sign();
            return Ok(direction);
        }

        // infeasible subproblem: form and solve the feasibility problem
        let partition = direction
            .constraint_partition
            .clone()
            .unwrap_or_else(|| Self::partition_from_violations(problem, iterate));
        let phase_2_x = direction.x.clone();
        self.form_feasibility_problem(problem, iterate, &phase_2_x, &partition)?;
        let mut relaxed = self.subproblem.solve(statistics, problem, iterate)?;
        relaxed.objective_multiplier = 0.0;
        relaxed.constraint_partition = Some(partition);
        relaxed.is_relaxed = true;
        Ok(relaxed)
    }

    fn solve_feasibility_problem(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        phase_2_direction: &Direction,
    ) -> Result<Direction, SolverError> {
        iterate.evaluate_constraints(problem)?;
        let partition = phase_2_direction
            .constraint_partition
            .clone()
            .unwrap_or_else(|| Self::partition_from_violations(problem, iterate));

        if partition.infeasible.is_empty() {
            // nothing to restore; report a zero step
            let mut direction = Direction::zero(problem.number_variables(), problem.number_constraints());
            direction.objective_multiplier = 0.0;
            return Ok(direction);
        }

        self.form_feasibility_problem(problem, iterate, &phase_2_direction.x, &partition)?;
        let mut relaxed = self.subproblem.solve(statistics, problem, iterate)?;
        relaxed.objective_multiplier = 0.0;
        relaxed.constraint_partition = Some(partition);
        relaxed.is_relaxed = true;
        Ok(relaxed)
    }

    fn compute_second_order_correction(
        &mut self,
        problem: &dyn Problem,
        trial_iterate: &mut Iterate,
    ) -> Result<Direction, SolverError> {
        self.subproblem.compute_second_order_correction(problem, trial_iterate)
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
            // a failed evaluation rejects the trial point
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
}
