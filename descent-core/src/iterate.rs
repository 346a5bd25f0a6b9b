//! Optimization iterate.
//!
//! An [`Iterate`] is a candidate point together with lazily cached
//! evaluations, residuals and progress measures. Every cached quantity
//! carries a computed flag; any write to the primal point or the multipliers
//! invalidates the whole cache. Process-wide evaluation counters live here
//! as relaxed atomics: all writers are the single solver thread, the
//! counters are telemetry, not program state.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::SolverError;
use crate::linalg::sparse_vector::SparseVector;
use crate::linalg::symmetric::SymmetricMatrix;
use crate::problem::{Norm, Problem};

/// Objective function evaluations since process start.
pub static NUMBER_EVAL_OBJECTIVE: AtomicUsize = AtomicUsize::new(0);
/// Constraint evaluations since process start.
pub static NUMBER_EVAL_CONSTRAINTS: AtomicUsize = AtomicUsize::new(0);
/// Constraint Jacobian evaluations since process start.
pub static NUMBER_EVAL_JACOBIAN: AtomicUsize = AtomicUsize::new(0);

/// Constraint and bound duals.
///
/// Sign convention: `lower_bounds[i] ≥ 0` (active at lower bound),
/// `upper_bounds[i] ≤ 0` (active at upper bound). [`Multipliers::enforce_signs`]
/// clamps after every write that could break the convention.
#[derive(Debug, Clone)]
pub struct Multipliers {
    /// Constraint duals λ (length m)
    pub constraints: Vec<f64>,
    /// Lower bound duals z_L ≥ 0 (length n, or more with elastic scratch)
    pub lower_bounds: Vec<f64>,
    /// Upper bound duals z_U ≤ 0
    pub upper_bounds: Vec<f64>,
    /// Objective multiplier of the last accepted direction (σ in σf + penalty)
    pub objective: f64,
}

impl Multipliers {
    /// Zero multipliers with objective multiplier 1.
    pub fn new(number_variables: usize, number_constraints: usize) -> Self {
        Multipliers {
            constraints: vec![0.0; number_constraints],
            lower_bounds: vec![0.0; number_variables],
            upper_bounds: vec![0.0; number_variables],
            objective: 1.0,
        }
    }

    /// Clamp bound duals onto their half-lines.
    pub fn enforce_signs(&mut self) {
        for z in &mut self.lower_bounds {
            *z = z.max(0.0);
        }
        for z in &mut self.upper_bounds {
            *z = z.min(0.0);
        }
    }

    /// 1-norm over all constraint and bound duals.
    pub fn norm_1(&self) -> f64 {
        self.constraints.iter().map(|v| v.abs()).sum::<f64>()
            + self.lower_bounds.iter().map(|v| v.abs()).sum::<f64>()
            + self.upper_bounds.iter().map(|v| v.abs()).sum::<f64>()
    }

    /// Whether some dual exceeds `tolerance` in magnitude.
    pub fn not_all_zero(&self, number_variables: usize, tolerance: f64) -> bool {
        if self.constraints.iter().any(|m| tolerance < m.abs()) {
            return true;
        }
        (0..number_variables).any(|i| tolerance < (self.lower_bounds[i] + self.upper_bounds[i]).abs())
    }
}

/// First-order residuals of an iterate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Residuals {
    /// ‖violation(c(x))‖₁
    pub infeasibility: f64,
    /// ‖∇L(x; σ, λ, z)‖∞ with the accepted objective multiplier (or 1)
    pub optimality_stationarity: f64,
    /// ‖∇L(x; 0, λ, z)‖∞, the stationarity of the feasibility measure
    pub feasibility_stationarity: f64,
    /// complementarity charged with |λ_j| on violated constraints
    pub optimality_complementarity: f64,
    /// complementarity charged with |1 ∓ λ_j| on violated constraints
    pub feasibility_complementarity: f64,
    /// Ipopt-style scaling for the stationarity tests
    pub stationarity_scaling: f64,
    /// Ipopt-style scaling for the complementarity tests
    pub complementarity_scaling: f64,
}

/// The two coordinates the filter reasons about.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressMeasures {
    /// Constraint violation (L1)
    pub infeasibility: f64,
    /// Optimality measure (objective, or phase-dependent surrogate)
    pub objective: f64,
}

/// A candidate point with cached evaluations.
#[derive(Debug, Clone)]
pub struct Iterate {
    /// Primal point (length ≥ n; only the first n entries are meaningful)
    pub x: Vec<f64>,
    /// Duals at this point
    pub multipliers: Multipliers,

    /// f(x)
    pub objective: f64,
    /// whether `objective` is valid for the current x
    pub is_objective_computed: bool,

    /// c(x)
    pub constraints: Vec<f64>,
    /// whether `constraints` is valid
    pub are_constraints_computed: bool,

    /// ∇f(x), sparse
    pub objective_gradient: SparseVector,
    /// whether `objective_gradient` is valid
    pub is_objective_gradient_computed: bool,

    /// ∇c(x), one sparse row per constraint
    pub constraints_jacobian: Vec<SparseVector>,
    /// whether `constraints_jacobian` is valid
    pub is_constraints_jacobian_computed: bool,

    /// residuals of the first-order conditions
    pub residuals: Residuals,
    /// (infeasibility, objective) pair used by the globalization strategy
    pub progress: ProgressMeasures,
}

impl Iterate {
    /// New iterate at `x` with zero duals. Scratch is sized for
    /// `max_number_variables` so elastic reformulations fit without
    /// reallocation.
    pub fn new(mut x: Vec<f64>, max_number_variables: usize, number_constraints: usize) -> Self {
        x.resize(max_number_variables, 0.0);
        Iterate {
            x,
            multipliers: Multipliers::new(max_number_variables, number_constraints),
            objective: f64::NAN,
            is_objective_computed: false,
            constraints: vec![0.0; number_constraints],
            are_constraints_computed: false,
            objective_gradient: SparseVector::with_capacity(max_number_variables),
            is_objective_gradient_computed: false,
            constraints_jacobian: vec![SparseVector::new(); number_constraints],
            is_constraints_jacobian_computed: false,
            residuals: Residuals::default(),
            progress: ProgressMeasures::default(),
        }
    }

    /// Invalidate every cached quantity (the primal point or duals changed).
    pub fn invalidate_cache(&mut self) {
        self.is_objective_computed = false;
        self.are_constraints_computed = false;
        self.is_objective_gradient_computed = false;
        self.is_constraints_jacobian_computed = false;
    }

    /// f(x), evaluated once per point.
    pub fn evaluate_objective(&mut self, problem: &dyn Problem) -> Result<f64, SolverError> {
        if !self.is_objective_computed {
            let value = problem.evaluate_objective(&self.x[..problem.number_variables()]);
            if !value.is_finite() {
                return Err(SolverError::Evaluation { quantity: "the objective" });
            }
            self.objective = value;
            self.is_objective_computed = true;
            NUMBER_EVAL_OBJECTIVE.fetch_add(1, Ordering::Relaxed);
        }
        Ok(self.objective)
    }

    /// c(x), evaluated once per point.
    pub fn evaluate_constraints(&mut self, problem: &dyn Problem) -> Result<(), SolverError> {
        if !self.are_constraints_computed {
            problem.evaluate_constraints(&self.x[..problem.number_variables()], &mut self.constraints);
            if self.constraints.iter().any(|c| !c.is_finite()) {
                return Err(SolverError::Evaluation { quantity: "the constraints" });
            }
            self.are_constraints_computed = true;
            NUMBER_EVAL_CONSTRAINTS.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// ∇f(x), evaluated once per point.
    pub fn evaluate_objective_gradient(&mut self, problem: &dyn Problem) -> Result<(), SolverError> {
        if !self.is_objective_gradient_computed {
            self.objective_gradient.clear();
            problem.evaluate_objective_gradient(
                &self.x[..problem.number_variables()],
                &mut self.objective_gradient,
            );
            if !self.objective_gradient.is_finite() {
                return Err(SolverError::Evaluation { quantity: "the objective gradient" });
            }
            self.is_objective_gradient_computed = true;
        }
        Ok(())
    }

    /// ∇c(x), evaluated once per point.
    pub fn evaluate_constraint_jacobian(&mut self, problem: &dyn Problem) -> Result<(), SolverError> {
        if !self.is_constraints_jacobian_computed {
            for row in &mut self.constraints_jacobian {
                row.clear();
            }
            problem.evaluate_constraint_jacobian(
                &self.x[..problem.number_variables()],
                &mut self.constraints_jacobian,
            );
            if self.constraints_jacobian.iter().any(|row| !row.is_finite()) {
                return Err(SolverError::Evaluation { quantity: "the constraint Jacobian" });
            }
            self.is_constraints_jacobian_computed = true;
            NUMBER_EVAL_JACOBIAN.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Fresh Lagrangian Hessian at this point (never cached: σ and λ vary
    /// between calls within one outer iteration).
    pub fn evaluate_lagrangian_hessian(
        &mut self,
        problem: &dyn Problem,
        objective_multiplier: f64,
        multipliers: &[f64],
        hessian: &mut SymmetricMatrix,
    ) {
        problem.evaluate_lagrangian_hessian(
            &self.x[..problem.number_variables()],
            objective_multiplier,
            multipliers,
            hessian,
        );
    }

    /// Dense gradient of the Lagrangian
    /// `σ∇f − Σ λ_j ∇c_j − z_L − z_U` over the first n variables.
    pub fn lagrangian_gradient(
        &mut self,
        problem: &dyn Problem,
        objective_multiplier: f64,
        multipliers: &Multipliers,
    ) -> Result<Vec<f64>, SolverError> {
        let n = problem.number_variables();
        let mut gradient = vec![0.0; n];

        if objective_multiplier != 0.0 {
            self.evaluate_objective_gradient(problem)?;
            for (i, derivative) in self.objective_gradient.iter() {
                // ignore elastic scratch entries
                if i < n {
                    gradient[i] += objective_multiplier * derivative;
                }
            }
        }
        for i in 0..n {
            gradient[i] -= multipliers.lower_bounds[i] + multipliers.upper_bounds[i];
        }
        self.evaluate_constraint_jacobian(problem)?;
        for (j, row) in self.constraints_jacobian.iter().enumerate() {
            let multiplier_j = multipliers.constraints[j];
            if multiplier_j != 0.0 {
                for (i, derivative) in row.iter() {
                    if i < n {
                        gradient[i] -= multiplier_j * derivative;
                    }
                }
            }
        }
        Ok(gradient)
    }

    /// L1 constraint violation at this point.
    pub fn constraint_violation(&mut self, problem: &dyn Problem) -> Result<f64, SolverError> {
        self.evaluate_constraints(problem)?;
        Ok(problem.constraint_violation(&self.constraints, Norm::L1))
    }
}

/// Snapshot of the process-wide evaluation counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationCounts {
    pub objective: usize,
    pub constraints: usize,
    pub jacobian: usize,
}

impl EvaluationCounts {
    /// Current counter values.
    pub fn snapshot() -> Self {
        EvaluationCounts {
            objective: NUMBER_EVAL_OBJECTIVE.load(Ordering::Relaxed),
            constraints: NUMBER_EVAL_CONSTRAINTS.load(Ordering::Relaxed),
            jacobian: NUMBER_EVAL_JACOBIAN.load(Ordering::Relaxed),
        }
    }

    /// Elementwise difference against an earlier snapshot.
    pub fn since(&self, earlier: &EvaluationCounts) -> EvaluationCounts {
        EvaluationCounts {
            objective: self.objective - earlier.objective,
            constraints: self.constraints - earlier.constraints,
            jacobian: self.jacobian - earlier.jacobian,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Range;

    struct Quadratic;

    impl Problem for Quadratic {
        fn name(&self) -> &str {
            "quadratic"
        }
        fn number_variables(&self) -> usize {
            2
        }
        fn number_constraints(&self) -> usize {
            1
        }
        fn variable_bounds(&self, _i: usize) -> Range {
            Range::UNBOUNDED
        }
        fn constraint_bounds(&self, _j: usize) -> Range {
            Range::fixed(1.0)
        }
        fn initial_primal(&self) -> Vec<f64> {
            vec![0.0, 0.0]
        }
        fn evaluate_objective(&self, x: &[f64]) -> f64 {
            0.5 * (x[0] * x[0] + x[1] * x[1])
        }
        fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) {
            constraints[0] = x[0] + x[1];
        }
        fn evaluate_objective_gradient(&self, x: &[f64], gradient: &mut SparseVector) {
            gradient.insert(0, x[0]);
            gradient.insert(1, x[1]);
        }
        fn evaluate_constraint_jacobian(&self, _x: &[f64], jacobian: &mut [SparseVector]) {
            jacobian[0].insert(0, 1.0);
            jacobian[0].insert(1, 1.0);
        }
        fn evaluate_lagrangian_hessian(
            &self,
            _x: &[f64],
            objective_multiplier: f64,
            _multipliers: &[f64],
            hessian: &mut SymmetricMatrix,
        ) {
            hessian.insert(objective_multiplier, 0, 0);
            hessian.insert(objective_multiplier, 1, 1);
        }
    }

    #[test]
    fn repeated_evaluation_hits_the_cache() {
        let problem = Quadratic;
        let mut iterate = Iterate::new(vec![1.0, 2.0], 2, 1);

        assert!((iterate.evaluate_objective(&problem).unwrap() - 2.5).abs() < 1e-15);

        // a cached read must not call the evaluator again: plant a sentinel
        // and check it survives
        iterate.objective = 1234.5;
        assert_eq!(iterate.evaluate_objective(&problem).unwrap(), 1234.5);

        // invalidation forces a fresh evaluation
        iterate.invalidate_cache();
        assert!((iterate.evaluate_objective(&problem).unwrap() - 2.5).abs() < 1e-15);
    }

    #[test]
    fn lagrangian_gradient_signs() {
        let problem = Quadratic;
        let mut iterate = Iterate::new(vec![1.0, 2.0], 2, 1);
        let mut multipliers = Multipliers::new(2, 1);
        multipliers.constraints[0] = 0.5;

        let gradient = iterate.lagrangian_gradient(&problem, 1.0, &multipliers).unwrap();
        // ∇f − λ ∇c = (1, 2) − 0.5·(1, 1)
        assert!((gradient[0] - 0.5).abs() < 1e-15);
        assert!((gradient[1] - 1.5).abs() < 1e-15);
    }

    #[test]
    fn multiplier_signs_are_enforced() {
        let mut multipliers = Multipliers::new(3, 0);
        multipliers.lower_bounds = vec![-1.0, 0.5, 0.0];
        multipliers.upper_bounds = vec![1.0, -0.5, 0.0];
        multipliers.enforce_signs();
        assert!(multipliers.lower_bounds.iter().all(|&z| z >= 0.0));
        assert!(multipliers.upper_bounds.iter().all(|&z| z <= 0.0));
        assert_eq!(multipliers.lower_bounds[1], 0.5);
        assert_eq!(multipliers.upper_bounds[1], -0.5);
    }
}
