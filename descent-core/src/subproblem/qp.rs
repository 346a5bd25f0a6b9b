//! QP subproblem.
//!
//! Quadratic model `½ dᵀHd + σ∇fᵀd` with linearized constraints, solved by
//! the QP backend. H comes from the configured Hessian model.

use crate::direction::{Direction, PredictedReductionModel};
use crate::error::SolverError;
use crate::iterate::Iterate;
use crate::problem::Problem;
use crate::solvers::{LdlSolver, QpSolver};
use crate::statistics::Statistics;
use crate::subproblem::hessian::{HessianModel, HessianModelKind};
use crate::subproblem::{
    compute_least_squares_multipliers, compute_standard_progress_measures, Subproblem,
    SubproblemWorkspace,
};

/// Sequential quadratic programming subproblem.
pub struct QpSubproblem {
    workspace: SubproblemWorkspace,
    solver: Box<dyn QpSolver>,
    hessian_model: HessianModel,
    multipliers_max_norm: f64,
    number_subproblems_solved: usize,
    definition_changed: bool,
}

impl QpSubproblem {
    /// New QP subproblem over at most `max_number_variables` variables.
    pub fn new(
        problem: &dyn Problem,
        max_number_variables: usize,
        solver: Box<dyn QpSolver>,
        hessian_model_kind: HessianModelKind,
        convexify: bool,
        multipliers_max_norm: f64,
    ) -> Self {
        QpSubproblem {
            workspace: SubproblemWorkspace::new(
                problem.number_variables(),
                max_number_variables,
                problem.number_constraints(),
            ),
            solver,
            hessian_model: HessianModel::new(
                hessian_model_kind,
                problem.number_variables(),
                problem.hessian_maximum_number_nonzeros(),
                convexify,
            ),
            multipliers_max_norm,
            number_subproblems_solved: 0,
            definition_changed: false,
        }
    }
}

impl Subproblem for QpSubproblem {
    fn initialize(
        &mut self,
        _statistics: &mut Statistics,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), SolverError> {
        first_iterate.evaluate_objective(problem)?;
        first_iterate.evaluate_constraints(problem)?;
        first_iterate.evaluate_objective_gradient(problem)?;
        first_iterate.evaluate_constraint_jacobian(problem)?;

        // estimate initial multipliers when the caller provided none
        if problem.is_constrained() && first_iterate.multipliers.constraints.iter().all(|&m| m == 0.0) {
            let mut linear_solver =
                LdlSolver::new(problem.number_variables() + problem.number_constraints());
            compute_least_squares_multipliers(
                problem,
                first_iterate,
                &mut linear_solver,
                self.multipliers_max_norm,
            )?;
        }
        compute_standard_progress_measures(problem, first_iterate)
    }

    fn create_current_subproblem(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        objective_multiplier: f64,
        trust_region_radius: f64,
    ) -> Result<(), SolverError> {
        iterate.evaluate_constraints(problem)?;
        iterate.evaluate_constraint_jacobian(problem)?;

        self.workspace.number_variables = problem.number_variables();
        self.workspace.set_variable_displacement_bounds(problem, iterate, trust_region_radius);
        let constraints = iterate.constraints.clone();
        self.workspace.set_linearized_constraint_bounds(problem, &constraints);
        self.workspace.set_constraint_jacobian(iterate);
        let m = problem.number_constraints();
        self.workspace.constraints_multipliers.copy_from_slice(&iterate.multipliers.constraints[..m]);
        self.workspace.set_initial_point(&[]);

        self.build_objective_model(problem, iterate, objective_multiplier)
    }

    fn build_objective_model(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        objective_multiplier: f64,
    ) -> Result<(), SolverError> {
        self.hessian_model.evaluate(
            problem,
            iterate,
            objective_multiplier,
            &self.workspace.constraints_multipliers,
        )?;
        self.workspace
            .set_scaled_objective_gradient(problem, iterate, objective_multiplier)
    }

    fn solve(
        &mut self,
        _statistics: &mut Statistics,
        problem: &dyn Problem,
        _iterate: &mut Iterate,
    ) -> Result<Direction, SolverError> {
        let n = self.workspace.number_variables;
        let direction = self.solver.solve_qp(
            n,
            problem.number_constraints(),
            &self.workspace.variables_bounds[..n],
            &self.workspace.constraints_bounds,
            &self.workspace.objective_gradient,
            &self.workspace.constraints_jacobian,
            &self.hessian_model.hessian,
            &self.workspace.initial_point[..n],
        )?;
        self.number_subproblems_solved += 1;
        Ok(direction)
    }

    fn compute_second_order_correction(
        &mut self,
        problem: &dyn Problem,
        trial_iterate: &mut Iterate,
    ) -> Result<Direction, SolverError> {
        // re-linearize the constraint bodies at the trial point
        trial_iterate.evaluate_constraints(problem)?;
        let trial_constraints = trial_iterate.constraints.clone();
        self.workspace.set_linearized_constraint_bounds(problem, &trial_constraints);

        let n = self.workspace.number_variables;
        let direction = self.solver.solve_qp(
            n,
            problem.number_constraints(),
            &self.workspace.variables_bounds[..n],
            &self.workspace.constraints_bounds,
            &self.workspace.objective_gradient,
            &self.workspace.constraints_jacobian,
            &self.hessian_model.hessian,
            &self.workspace.initial_point[..n],
        )?;
        self.number_subproblems_solved += 1;
        Ok(direction)
    }

    fn generate_predicted_reduction_model(
        &self,
        _problem: &dyn Problem,
        direction: &Direction,
    ) -> PredictedReductionModel {
        let linear_term: f64 = self
            .workspace
            .objective_gradient
            .iter()
            .filter(|&(i, _)| i < direction.x.len())
            .map(|(i, v)| v * direction.x[i])
            .sum();
        let quadratic_term = 0.5
            * self
                .hessian_model
                .hessian
                .quadratic_product(&direction.x, &direction.x, direction.x.len());
        PredictedReductionModel::new(-direction.objective, linear_term, quadratic_term)
    }

    fn compute_progress_measures(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), SolverError> {
        compute_standard_progress_measures(problem, iterate)
    }

    fn register_accepted_iterate(
        &mut self,
        _problem: &dyn Problem,
        _iterate: &mut Iterate,
    ) -> Result<(), SolverError> {
        Ok(())
    }

    fn workspace(&self) -> &SubproblemWorkspace {
        &self.workspace
    }

    fn workspace_mut(&mut self) -> &mut SubproblemWorkspace {
        &mut self.workspace
    }

    fn number_subproblems_solved(&self) -> usize {
        self.number_subproblems_solved
    }

    fn hessian_evaluation_count(&self) -> usize {
        self.hessian_model.evaluation_count()
    }

    fn take_definition_changed(&mut self) -> bool {
        let changed = self.definition_changed;
        self.definition_changed = false;
        changed
    }
}
