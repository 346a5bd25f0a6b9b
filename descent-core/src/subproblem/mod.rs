//! Local subproblem models.
//!
//! A subproblem builds a local convex-or-indefinite model of the nonlinear
//! problem at the current iterate and hands it to a backend solver. All
//! models share a [`SubproblemWorkspace`] holding the displacement bounds,
//! the scaled objective gradient and the constraint Jacobian; the
//! constraint-relaxation layer edits this scratch directly when it reforms a
//! feasibility model or injects elastic variables.

pub mod hessian;
pub mod interior_point;
pub mod lp;
pub mod qp;

use crate::direction::{ConstraintFeasibility, ConstraintPartition, Direction, PredictedReductionModel};
use crate::error::SolverError;
use crate::iterate::{Iterate, Multipliers, ProgressMeasures};
use crate::linalg::sparse_vector::SparseVector;
use crate::linalg::symmetric::SymmetricMatrix;
use crate::linalg::norm_inf;
use crate::problem::{Norm, Problem, Range};
use crate::solvers::SymmetricIndefiniteSolver;
use crate::statistics::Statistics;

/// When the mechanism may ask for a second-order correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondOrderCorrection {
    None,
    OnRejection,
    OnAcceptance,
}

/// Scaling divisor of the Ipopt-style residual scalings.
const S_MAX: f64 = 100.0;

/// Mutable scratch shared by every subproblem model.
///
/// `number_variables` can grow past the original n while elastic variables
/// are attached; every buffer is sized for `max_number_variables` up front.
pub struct SubproblemWorkspace {
    /// Current variable count (original n plus any attached elastics)
    pub number_variables: usize,
    /// Largest variable count this workspace can hold
    pub max_number_variables: usize,
    /// Constraint count m
    pub number_constraints: usize,
    /// Displacement bounds per variable
    pub variables_bounds: Vec<Range>,
    /// Bounds of the linearized constraints
    pub constraints_bounds: Vec<Range>,
    /// Scaled model gradient (σ∇f, plus elastic terms)
    pub objective_gradient: SparseVector,
    /// Model Jacobian rows (∇c_j, plus elastic terms)
    pub constraints_jacobian: Vec<SparseVector>,
    /// Multiplier estimates fed to the Hessian model
    pub constraints_multipliers: Vec<f64>,
    /// Warm-start point for the backend
    pub initial_point: Vec<f64>,
}

impl SubproblemWorkspace {
    /// Workspace sized for `max_number_variables` and m constraints.
    pub fn new(number_variables: usize, max_number_variables: usize, number_constraints: usize) -> Self {
        SubproblemWorkspace {
            number_variables,
            max_number_variables,
            number_constraints,
            variables_bounds: vec![Range::UNBOUNDED; max_number_variables],
            constraints_bounds: vec![Range::UNBOUNDED; number_constraints],
            objective_gradient: SparseVector::with_capacity(max_number_variables),
            constraints_jacobian: vec![SparseVector::new(); number_constraints],
            constraints_multipliers: vec![0.0; number_constraints],
            initial_point: vec![0.0; max_number_variables],
        }
    }

    /// Displacement bounds: variable bounds shifted to the current point,
    /// intersected with the trust region (original variables only).
    pub fn set_variable_displacement_bounds(
        &mut self,
        problem: &dyn Problem,
        iterate: &Iterate,
        trust_region_radius: f64,
    ) {
        for i in 0..problem.number_variables() {
            let bounds = problem.variable_bounds(i);
            let lb = (-trust_region_radius).max(bounds.lb - iterate.x[i]);
            let ub = trust_region_radius.min(bounds.ub - iterate.x[i]);
            self.variables_bounds[i] = Range { lb, ub };
        }
    }

    /// Bounds of the linearized constraints: `[cL_j − c_j, cU_j − c_j]`.
    pub fn set_linearized_constraint_bounds(&mut self, problem: &dyn Problem, current_constraints: &[f64]) {
        for j in 0..problem.number_constraints() {
            let bounds = problem.constraint_bounds(j);
            self.constraints_bounds[j] = Range {
                lb: bounds.lb - current_constraints[j],
                ub: bounds.ub - current_constraints[j],
            };
        }
    }

    /// Model gradient σ·∇f (empty when σ = 0; a feasibility objective is set
    /// separately).
    pub fn set_scaled_objective_gradient(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        objective_multiplier: f64,
    ) -> Result<(), SolverError> {
        self.objective_gradient.clear();
        if objective_multiplier != 0.0 {
            iterate.evaluate_objective_gradient(problem)?;
            for (i, derivative) in iterate.objective_gradient.iter() {
                self.objective_gradient.insert(i, objective_multiplier * derivative);
            }
        }
        Ok(())
    }

    /// Copy the Jacobian rows of the iterate into the model.
    pub fn set_constraint_jacobian(&mut self, iterate: &Iterate) {
        for (row, source) in self.constraints_jacobian.iter_mut().zip(&iterate.constraints_jacobian) {
            *row = source.clone();
        }
    }

    /// Feasibility objective: Σ ±∇c_j over the infeasible constraints, the
    /// sign pushing each one back toward its violated bound.
    pub fn compute_feasibility_linear_objective(&mut self, iterate: &Iterate, partition: &ConstraintPartition) {
        self.objective_gradient.clear();
        for &j in &partition.infeasible {
            let sign = match partition.constraint_feasibility[j] {
                ConstraintFeasibility::InfeasibleLower => -1.0,
                _ => 1.0,
            };
            for (i, derivative) in iterate.constraints_jacobian[j].iter() {
                self.objective_gradient.add(i, sign * derivative);
            }
        }
    }

    /// Constraint bounds of the feasibility model: the infeasible side is
    /// forced to its violated bound, feasible constraints keep their range.
    pub fn generate_feasibility_bounds(
        &mut self,
        problem: &dyn Problem,
        current_constraints: &[f64],
        partition: &ConstraintPartition,
    ) {
        for j in 0..problem.number_constraints() {
            let bounds = problem.constraint_bounds(j);
            self.constraints_bounds[j] = match partition.constraint_feasibility[j] {
                ConstraintFeasibility::InfeasibleLower => Range {
                    lb: f64::NEG_INFINITY,
                    ub: bounds.lb - current_constraints[j],
                },
                ConstraintFeasibility::InfeasibleUpper => Range {
                    lb: bounds.ub - current_constraints[j],
                    ub: f64::INFINITY,
                },
                ConstraintFeasibility::Feasible => Range {
                    lb: bounds.lb - current_constraints[j],
                    ub: bounds.ub - current_constraints[j],
                },
            };
        }
    }

    /// Warm-start point for the backend.
    pub fn set_initial_point(&mut self, point: &[f64]) {
        let length = point.len().min(self.initial_point.len());
        self.initial_point[..length].copy_from_slice(&point[..length]);
        for entry in &mut self.initial_point[length..] {
            *entry = 0.0;
        }
    }
}

/// Rewrite the multipliers of the infeasible constraints to the exact
/// restoration values ±1; feasible constraints keep theirs.
pub fn set_restoration_multipliers(constraints_multipliers: &mut [f64], partition: &ConstraintPartition) {
    for &j in &partition.infeasible {
        constraints_multipliers[j] = match partition.constraint_feasibility[j] {
            ConstraintFeasibility::InfeasibleLower => 1.0,
            _ => -1.0,
        };
    }
}

/// A local model of the nonlinear problem at the current iterate.
pub trait Subproblem {
    /// Evaluate the functions at the first iterate, size scratch, estimate
    /// initial multipliers, compute the initial progress measures.
    fn initialize(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), SolverError>;

    /// Assemble the model at the current iterate: displacement bounds under
    /// the trust region, linearized constraint bounds, scaled objective.
    fn create_current_subproblem(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        objective_multiplier: f64,
        trust_region_radius: f64,
    ) -> Result<(), SolverError>;

    /// Re-scale the objective model for a new σ without re-evaluating the
    /// constraints (used when the penalty parameter changes).
    fn build_objective_model(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        objective_multiplier: f64,
    ) -> Result<(), SolverError>;

    /// Solve the model; the returned direction distinguishes optimal,
    /// infeasible, unbounded and errored local solves.
    fn solve(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<Direction, SolverError>;

    /// Re-solve with the constraints re-linearized at the trial point.
    fn compute_second_order_correction(
        &mut self,
        problem: &dyn Problem,
        trial_iterate: &mut Iterate,
    ) -> Result<Direction, SolverError>;

    /// Deferred evaluator of the model's predicted reduction along `direction`.
    fn generate_predicted_reduction_model(
        &self,
        problem: &dyn Problem,
        direction: &Direction,
    ) -> PredictedReductionModel;

    /// Write the (infeasibility, objective) progress pair of the iterate.
    fn compute_progress_measures(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), SolverError>;

    /// Hook called once a trial iterate has been accepted.
    fn register_accepted_iterate(&mut self, problem: &dyn Problem, iterate: &mut Iterate) -> Result<(), SolverError>;

    /// Shared scratch.
    fn workspace(&self) -> &SubproblemWorkspace;

    /// Shared scratch, mutably (the relaxation layer edits it).
    fn workspace_mut(&mut self) -> &mut SubproblemWorkspace;

    /// Number of backend solves so far.
    fn number_subproblems_solved(&self) -> usize;

    /// Number of Hessian evaluations so far.
    fn hessian_evaluation_count(&self) -> usize;

    /// Whether the model parameterization (penalty, barrier) changed since
    /// the last call; reading clears the flag.
    fn take_definition_changed(&mut self) -> bool;
}

/// Compute all first-order residuals of an iterate and store them on it.
///
/// `objective_multiplier` is the σ of the accepted direction; the optimality
/// stationarity uses σ when positive and 1 otherwise.
pub fn compute_optimality_conditions(
    problem: &dyn Problem,
    iterate: &mut Iterate,
    objective_multiplier: f64,
) -> Result<(), SolverError> {
    iterate.evaluate_constraints(problem)?;
    let infeasibility = problem.constraint_violation(&iterate.constraints, Norm::L1);

    let sigma = if 0.0 < objective_multiplier { objective_multiplier } else { 1.0 };
    let multipliers = iterate.multipliers.clone();
    let optimality_gradient = iterate.lagrangian_gradient(problem, sigma, &multipliers)?;
    let feasibility_gradient = iterate.lagrangian_gradient(problem, 0.0, &multipliers)?;

    let optimality_complementarity = complementarity_error(problem, iterate, &multipliers, false)?;
    let feasibility_complementarity = complementarity_error(problem, iterate, &multipliers, true)?;

    let n = problem.number_variables();
    let m = problem.number_constraints();
    let multiplier_norm = multipliers.constraints.iter().map(|v| v.abs()).sum::<f64>()
        + multipliers.lower_bounds[..n].iter().map(|v| v.abs()).sum::<f64>()
        + multipliers.upper_bounds[..n].iter().map(|v| v.abs()).sum::<f64>();
    let scaling = S_MAX.max(multiplier_norm / (n + m) as f64) / S_MAX;

    iterate.residuals.infeasibility = infeasibility;
    iterate.residuals.optimality_stationarity = norm_inf(&optimality_gradient);
    iterate.residuals.feasibility_stationarity = norm_inf(&feasibility_gradient);
    iterate.residuals.optimality_complementarity = optimality_complementarity;
    iterate.residuals.feasibility_complementarity = feasibility_complementarity;
    iterate.residuals.stationarity_scaling = scaling;
    iterate.residuals.complementarity_scaling = scaling;
    Ok(())
}

/// Complementary slackness error.
///
/// On violated constraints the optimality variant charges `|λ_j|·violation`;
/// the feasibility variant charges `|1 ∓ λ_j|·violation` (the restoration
/// multiplier is ±1 at an infeasible stationary point). The two coincide on
/// feasible iterates.
pub fn complementarity_error(
    problem: &dyn Problem,
    iterate: &mut Iterate,
    multipliers: &Multipliers,
    feasibility_variant: bool,
) -> Result<f64, SolverError> {
    let mut error = 0.0;

    for i in 0..problem.number_variables() {
        let bounds = problem.variable_bounds(i);
        if bounds.lb.is_finite() {
            error += (multipliers.lower_bounds[i] * (iterate.x[i] - bounds.lb)).abs();
        }
        if bounds.ub.is_finite() {
            error += (multipliers.upper_bounds[i] * (iterate.x[i] - bounds.ub)).abs();
        }
    }

    iterate.evaluate_constraints(problem)?;
    for j in 0..problem.number_constraints() {
        let bounds = problem.constraint_bounds(j);
        let multiplier_j = multipliers.constraints[j];
        let value = iterate.constraints[j];
        if value < bounds.lb {
            let weight = if feasibility_variant { 1.0 - multiplier_j } else { multiplier_j };
            error += (weight * (bounds.lb - value)).abs();
        } else if bounds.ub < value {
            let weight = if feasibility_variant { 1.0 + multiplier_j } else { multiplier_j };
            error += (weight * (value - bounds.ub)).abs();
        } else if bounds.lb.is_finite() && 0.0 < multiplier_j {
            error += (multiplier_j * (value - bounds.lb)).abs();
        } else if bounds.ub.is_finite() && multiplier_j < 0.0 {
            error += (multiplier_j * (value - bounds.ub)).abs();
        }
    }
    Ok(error)
}

/// Least-squares multiplier estimation: solve
/// `[I Jᵀ; J 0] [v; λ] = [sign·∇f − z_L − z_U; 0]` and adopt λ iff
/// `‖λ‖∞ ≤ multipliers_max_norm`.
pub fn compute_least_squares_multipliers(
    problem: &dyn Problem,
    iterate: &mut Iterate,
    linear_solver: &mut dyn SymmetricIndefiniteSolver,
    multipliers_max_norm: f64,
) -> Result<(), SolverError> {
    iterate.evaluate_objective_gradient(problem)?;
    iterate.evaluate_constraint_jacobian(problem)?;

    let n = problem.number_variables();
    let m = problem.number_constraints();

    let jacobian_nonzeros: usize = iterate.constraints_jacobian.iter().map(SparseVector::len).sum();
    let mut matrix = SymmetricMatrix::with_capacity(n + m, n + m + jacobian_nonzeros, false);
    for i in 0..n {
        matrix.insert(1.0, i, i);
    }
    for (j, row) in iterate.constraints_jacobian.iter().enumerate() {
        for (i, derivative) in row.iter() {
            if i < n {
                matrix.insert(derivative, n + j, i);
            }
        }
        // the (2,2) block is kept quasi-definite for the pivoting-free LDL^T
        matrix.insert(-1e-8, n + j, n + j);
    }

    let mut rhs = vec![0.0; n + m];
    for (i, derivative) in iterate.objective_gradient.iter() {
        if i < n {
            rhs[i] += problem.objective_sign() * derivative;
        }
    }
    for i in 0..n {
        rhs[i] -= iterate.multipliers.lower_bounds[i] + iterate.multipliers.upper_bounds[i];
    }

    linear_solver.factorize(&matrix)?;
    let solution = linear_solver.solve(&rhs)?;

    if norm_inf(&solution[n..]) <= multipliers_max_norm {
        iterate.multipliers.constraints.copy_from_slice(&solution[n..]);
    }
    Ok(())
}

/// Default progress measures: L1 infeasibility and the raw objective.
pub fn compute_standard_progress_measures(
    problem: &dyn Problem,
    iterate: &mut Iterate,
) -> Result<(), SolverError> {
    let infeasibility = iterate.constraint_violation(problem)?;
    let objective = iterate.evaluate_objective(problem)?;
    iterate.progress = ProgressMeasures { infeasibility, objective };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterate::Iterate;

    struct OneConstraint;

    impl Problem for OneConstraint {
        fn name(&self) -> &str {
            "one-constraint"
        }
        fn number_variables(&self) -> usize {
            2
        }
        fn number_constraints(&self) -> usize {
            1
        }
        fn variable_bounds(&self, i: usize) -> Range {
            if i == 0 {
                Range { lb: 0.0, ub: 4.0 }
            } else {
                Range::UNBOUNDED
            }
        }
        fn constraint_bounds(&self, _j: usize) -> Range {
            Range { lb: 1.0, ub: 2.0 }
        }
        fn initial_primal(&self) -> Vec<f64> {
            vec![1.0, 0.0]
        }
        fn evaluate_objective(&self, x: &[f64]) -> f64 {
            x[0] + x[1]
        }
        fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) {
            constraints[0] = x[0] - x[1];
        }
        fn evaluate_objective_gradient(&self, _x: &[f64], gradient: &mut SparseVector) {
            gradient.insert(0, 1.0);
            gradient.insert(1, 1.0);
        }
        fn evaluate_constraint_jacobian(&self, _x: &[f64], jacobian: &mut [SparseVector]) {
            jacobian[0].insert(0, 1.0);
            jacobian[0].insert(1, -1.0);
        }
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
    fn displacement_bounds_intersect_trust_region() {
        let problem = OneConstraint;
        let iterate = Iterate::new(vec![1.0, 0.0], 2, 1);
        let mut workspace = SubproblemWorkspace::new(2, 2, 1);
        workspace.set_variable_displacement_bounds(&problem, &iterate, 2.0);

        // variable 0: bounds [0,4] at x=1 → [-1, 3], clipped to [-1, 2]
        assert_eq!(workspace.variables_bounds[0], Range { lb: -1.0, ub: 2.0 });
        // variable 1: unbounded → trust region only
        assert_eq!(workspace.variables_bounds[1], Range { lb: -2.0, ub: 2.0 });
    }

    #[test]
    fn feasibility_bounds_follow_the_partition() {
        let problem = OneConstraint;
        let mut workspace = SubproblemWorkspace::new(2, 2, 1);
        let mut partition = ConstraintPartition::new(1);
        partition.infeasible.push(0);
        partition.constraint_feasibility[0] = ConstraintFeasibility::InfeasibleLower;

        // c = -3, bounds [1, 2]: violated below; push up to the lower bound
        workspace.generate_feasibility_bounds(&problem, &[-3.0], &partition);
        assert_eq!(workspace.constraints_bounds[0].ub, 4.0);
        assert!(workspace.constraints_bounds[0].lb.is_infinite());
    }

    #[test]
    fn restoration_multipliers_are_plus_minus_one() {
        let mut partition = ConstraintPartition::new(2);
        partition.infeasible = vec![0, 1];
        partition.constraint_feasibility[0] = ConstraintFeasibility::InfeasibleLower;
        partition.constraint_feasibility[1] = ConstraintFeasibility::InfeasibleUpper;

        let mut multipliers = vec![0.3, 0.7];
        set_restoration_multipliers(&mut multipliers, &partition);
        assert_eq!(multipliers, vec![1.0, -1.0]);
    }

    #[test]
    fn complementarity_error_vanishes_at_restoration_multipliers() {
        let problem = OneConstraint;
        // x = (4, 4): c = 0 < lb = 1, violated lower
        let mut iterate = Iterate::new(vec![4.0, 4.0], 2, 1);
        let mut multipliers = Multipliers::new(2, 1);
        multipliers.constraints[0] = 1.0;

        let feasibility = complementarity_error(&problem, &mut iterate, &multipliers, true).unwrap();
        assert!(feasibility.abs() < 1e-15);
        let optimality = complementarity_error(&problem, &mut iterate, &multipliers, false).unwrap();
        assert!((optimality - 1.0).abs() < 1e-15);
    }
}
