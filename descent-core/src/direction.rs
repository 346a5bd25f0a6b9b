//! Subproblem directions and predicted reduction.

use crate::iterate::Multipliers;

/// Outcome of a local subproblem solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubproblemStatus {
    /// Local model solved to optimality
    Optimal,
    /// Linearized feasible region is empty (a partition is attached)
    Infeasible,
    /// Local model is unbounded below
    UnboundedProblem,
    /// Iteration budget hit; best point returned
    SubOptimal,
    /// Backend error
    Error,
}

/// Feasibility of a constraint in the linearized model at the relaxed
/// solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintFeasibility {
    Feasible,
    /// lower bound of the constraint cannot be reached
    InfeasibleLower,
    /// upper bound of the constraint cannot be reached
    InfeasibleUpper,
}

/// Classification of every constraint under the relaxed model, produced by
/// the QP backend when the subproblem is infeasible.
#[derive(Debug, Clone)]
pub struct ConstraintPartition {
    /// Indices of linearly feasible constraints
    pub feasible: Vec<usize>,
    /// Indices of linearly infeasible constraints
    pub infeasible: Vec<usize>,
    /// Per-constraint classification (length m)
    pub constraint_feasibility: Vec<ConstraintFeasibility>,
}

impl ConstraintPartition {
    /// All-feasible partition over m constraints.
    pub fn new(number_constraints: usize) -> Self {
        ConstraintPartition {
            feasible: Vec::with_capacity(number_constraints),
            infeasible: Vec::new(),
            constraint_feasibility: vec![ConstraintFeasibility::Feasible; number_constraints],
        }
    }
}

/// Active variable and constraint bounds at a subproblem solution.
#[derive(Debug, Clone, Default)]
pub struct ActiveSet {
    /// Variables whose displacement sits at its lower bound
    pub bounds_at_lower: Vec<usize>,
    /// Variables whose displacement sits at its upper bound
    pub bounds_at_upper: Vec<usize>,
    /// Constraints active at their lower bound
    pub constraints_at_lower: Vec<usize>,
    /// Constraints active at their upper bound
    pub constraints_at_upper: Vec<usize>,
}

/// Output of a subproblem solve: the primal displacement together with the
/// multiplier estimates at the trial point.
#[derive(Debug, Clone)]
pub struct Direction {
    /// Primal displacement d (length may temporarily include elastics)
    pub x: Vec<f64>,
    /// Multiplier estimates at the trial point (full step)
    pub multipliers: Multipliers,
    /// Solve outcome
    pub status: SubproblemStatus,
    /// σ of the model objective σf + penalty·φ that produced this direction
    pub objective_multiplier: f64,
    /// Model objective value at d
    pub objective: f64,
    /// ‖d‖∞
    pub norm: f64,
    /// Active bounds at the solution
    pub active_set: ActiveSet,
    /// Constraint classification when the model was infeasible
    pub constraint_partition: Option<ConstraintPartition>,
    /// Whether this direction came from a feasibility (restoration) model
    pub is_relaxed: bool,
}

impl Direction {
    /// Zero direction of the given dimensions.
    pub fn zero(number_variables: usize, number_constraints: usize) -> Self {
        Direction {
            x: vec![0.0; number_variables],
            multipliers: Multipliers::new(number_variables, number_constraints),
            status: SubproblemStatus::Optimal,
            objective_multiplier: 1.0,
            objective: 0.0,
            norm: 0.0,
            active_set: ActiveSet::default(),
            constraint_partition: None,
            is_relaxed: false,
        }
    }
}

/// Deferred evaluator of the quadratic predicted reduction
/// `−α(gᵀd + α·½dᵀHd)`, assembled once per direction and reused across the
/// inner backtracking loop.
#[derive(Debug, Clone, Copy)]
pub struct PredictedReductionModel {
    full_step_value: f64,
    linear_term: f64,
    quadratic_term: f64,
}

impl PredictedReductionModel {
    /// Build from the model objective at the full step and the precomputed
    /// linear (gᵀd) and quadratic (½dᵀHd) terms.
    pub fn new(full_step_value: f64, linear_term: f64, quadratic_term: f64) -> Self {
        PredictedReductionModel {
            full_step_value,
            linear_term,
            quadratic_term,
        }
    }

    /// Predicted reduction at step length α ∈ [0, 1].
    pub fn predict(&self, step_length: f64) -> f64 {
        if step_length == 1.0 {
            self.full_step_value
        } else {
            -step_length * (self.linear_term + step_length * self.quadratic_term)
        }
    }

    /// The linear term gᵀd; negative for descent directions.
    pub fn linear_term(&self) -> f64 {
        self.linear_term
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicted_reduction_interpolates() {
        // g'd = -2, d'Hd/2 = 0.5: full reduction = -(-2 + 0.5) = 1.5
        let model = PredictedReductionModel::new(1.5, -2.0, 0.5);
        assert_eq!(model.predict(1.0), 1.5);
        // α = 0.5: -(0.5)(-2 + 0.25)
        assert!((model.predict(0.5) - 0.875).abs() < 1e-15);
        assert_eq!(model.predict(0.0), 0.0);
    }
}
