//! Reference problems for the end-to-end scenarios.
//!
//! Hand-coded classics from the Hock-Schittkowski collection plus a few
//! synthetic cases. Lagrangian Hessians follow the solver convention
//! σ∇²f − Σ λ_j ∇²c_j.

use descent_core::linalg::sparse_vector::SparseVector;
use descent_core::linalg::symmetric::SymmetricMatrix;
use descent_core::problem::{Problem, Range};

/// HS071: 4 variables, an inequality and an equality constraint.
///
/// ```text
/// minimize    x1 x4 (x1 + x2 + x3) + x3
/// subject to  x1 x2 x3 x4 ≥ 25
///             x1² + x2² + x3² + x4² = 40
///             1 ≤ x ≤ 5
/// ```
pub struct Hs071;

impl Problem for Hs071 {
    fn name(&self) -> &str {
        "hs071"
    }
    fn number_variables(&self) -> usize {
        4
    }
    fn number_constraints(&self) -> usize {
        2
    }
    fn variable_bounds(&self, _i: usize) -> Range {
        Range { lb: 1.0, ub: 5.0 }
    }
    fn constraint_bounds(&self, j: usize) -> Range {
        if j == 0 {
            Range { lb: 25.0, ub: f64::INFINITY }
        } else {
            Range::fixed(40.0)
        }
    }
    fn initial_primal(&self) -> Vec<f64> {
        vec![1.0, 5.0, 5.0, 1.0]
    }
    fn evaluate_objective(&self, x: &[f64]) -> f64 {
        x[0] * x[3] * (x[0] + x[1] + x[2]) + x[2]
    }
    fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) {
        constraints[0] = x[0] * x[1] * x[2] * x[3];
        constraints[1] = x[0] * x[0] + x[1] * x[1] + x[2] * x[2] + x[3] * x[3];
    }
    fn evaluate_objective_gradient(&self, x: &[f64], gradient: &mut SparseVector) {
        gradient.insert(0, x[3] * (2.0 * x[0] + x[1] + x[2]));
        gradient.insert(1, x[0] * x[3]);
        gradient.insert(2, x[0] * x[3] + 1.0);
        gradient.insert(3, x[0] * (x[0] + x[1] + x[2]));
    }
    fn evaluate_constraint_jacobian(&self, x: &[f64], jacobian: &mut [SparseVector]) {
        jacobian[0].insert(0, x[1] * x[2] * x[3]);
        jacobian[0].insert(1, x[0] * x[2] * x[3]);
        jacobian[0].insert(2, x[0] * x[1] * x[3]);
        jacobian[0].insert(3, x[0] * x[1] * x[2]);
        for i in 0..4 {
            jacobian[1].insert(i, 2.0 * x[i]);
        }
    }
    fn evaluate_lagrangian_hessian(
        &self,
        x: &[f64],
        objective_multiplier: f64,
        multipliers: &[f64],
        hessian: &mut SymmetricMatrix,
    ) {
        let sigma = objective_multiplier;
        let (lambda1, lambda2) = (multipliers[0], multipliers[1]);

        // objective block
        hessian.insert(sigma * 2.0 * x[3], 0, 0);
        hessian.insert(sigma * x[3], 1, 0);
        hessian.insert(sigma * x[3], 2, 0);
        hessian.insert(sigma * (2.0 * x[0] + x[1] + x[2]), 3, 0);
        hessian.insert(sigma * x[0], 3, 1);
        hessian.insert(sigma * x[0], 3, 2);

        // product constraint
        hessian.insert(-lambda1 * x[2] * x[3], 1, 0);
        hessian.insert(-lambda1 * x[1] * x[3], 2, 0);
        hessian.insert(-lambda1 * x[0] * x[3], 2, 1);
        hessian.insert(-lambda1 * x[1] * x[2], 3, 0);
        hessian.insert(-lambda1 * x[0] * x[2], 3, 1);
        hessian.insert(-lambda1 * x[0] * x[1], 3, 2);

        // sphere constraint
        for i in 0..4 {
            hessian.insert(-lambda2 * 2.0, i, i);
        }
    }
}

/// HS035 (Beale): convex QP with one linear constraint and bounds.
///
/// Optimum x* = (4/3, 7/9, 4/9), f* = 1/9.
pub struct Hs035;

impl Problem for Hs035 {
    fn name(&self) -> &str {
        "hs035"
    }
    fn number_variables(&self) -> usize {
        3
    }
    fn number_constraints(&self) -> usize {
        1
    }
    fn variable_bounds(&self, _i: usize) -> Range {
        Range { lb: 0.0, ub: f64::INFINITY }
    }
    fn constraint_bounds(&self, _j: usize) -> Range {
        // x1 + x2 + 2 x3 ≤ 3
        Range { lb: f64::NEG_INFINITY, ub: 3.0 }
    }
    fn initial_primal(&self) -> Vec<f64> {
        vec![0.5, 0.5, 0.5]
    }
    fn evaluate_objective(&self, x: &[f64]) -> f64 {
        9.0 - 8.0 * x[0] - 6.0 * x[1] - 4.0 * x[2]
            + 2.0 * x[0] * x[0]
            + 2.0 * x[1] * x[1]
            + x[2] * x[2]
            + 2.0 * x[0] * x[1]
            + 2.0 * x[0] * x[2]
    }
    fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) {
        constraints[0] = x[0] + x[1] + 2.0 * x[2];
    }
    fn evaluate_objective_gradient(&self, x: &[f64], gradient: &mut SparseVector) {
        gradient.insert(0, -8.0 + 4.0 * x[0] + 2.0 * x[1] + 2.0 * x[2]);
        gradient.insert(1, -6.0 + 4.0 * x[1] + 2.0 * x[0]);
        gradient.insert(2, -4.0 + 2.0 * x[2] + 2.0 * x[0]);
    }
    fn evaluate_constraint_jacobian(&self, _x: &[f64], jacobian: &mut [SparseVector]) {
        jacobian[0].insert(0, 1.0);
        jacobian[0].insert(1, 1.0);
        jacobian[0].insert(2, 2.0);
    }
    fn evaluate_lagrangian_hessian(
        &self,
        _x: &[f64],
        objective_multiplier: f64,
        _multipliers: &[f64],
        hessian: &mut SymmetricMatrix,
    ) {
        hessian.insert(objective_multiplier * 4.0, 0, 0);
        hessian.insert(objective_multiplier * 4.0, 1, 1);
        hessian.insert(objective_multiplier * 2.0, 2, 2);
        hessian.insert(objective_multiplier * 2.0, 1, 0);
        hessian.insert(objective_multiplier * 2.0, 2, 0);
    }
}

/// HS013: degenerate at the optimum (constraint qualification fails).
///
/// Optimum x* = (1, 0), f* = 1.
pub struct Hs013;

impl Problem for Hs013 {
    fn name(&self) -> &str {
        "hs013"
    }
    fn number_variables(&self) -> usize {
        2
    }
    fn number_constraints(&self) -> usize {
        1
    }
    fn variable_bounds(&self, _i: usize) -> Range {
        Range { lb: 0.0, ub: f64::INFINITY }
    }
    fn constraint_bounds(&self, _j: usize) -> Range {
        // (1 − x1)³ − x2 ≥ 0
        Range { lb: 0.0, ub: f64::INFINITY }
    }
    fn initial_primal(&self) -> Vec<f64> {
        vec![-2.0, -2.0]
    }
    fn evaluate_objective(&self, x: &[f64]) -> f64 {
        (x[0] - 2.0) * (x[0] - 2.0) + x[1] * x[1]
    }
    fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) {
        constraints[0] = (1.0 - x[0]).powi(3) - x[1];
    }
    fn evaluate_objective_gradient(&self, x: &[f64], gradient: &mut SparseVector) {
        gradient.insert(0, 2.0 * (x[0] - 2.0));
        gradient.insert(1, 2.0 * x[1]);
    }
    fn evaluate_constraint_jacobian(&self, x: &[f64], jacobian: &mut [SparseVector]) {
        jacobian[0].insert(0, -3.0 * (1.0 - x[0]) * (1.0 - x[0]));
        jacobian[0].insert(1, -1.0);
    }
    fn evaluate_lagrangian_hessian(
        &self,
        x: &[f64],
        objective_multiplier: f64,
        multipliers: &[f64],
        hessian: &mut SymmetricMatrix,
    ) {
        hessian.insert(objective_multiplier * 2.0 - multipliers[0] * 6.0 * (1.0 - x[0]), 0, 0);
        hessian.insert(objective_multiplier * 2.0, 1, 1);
    }
}

/// min ½(x1² + x2²) subject to x1 + x2 = 1; a single SQP step solves it.
pub struct SimpleQp;

impl Problem for SimpleQp {
    fn name(&self) -> &str {
        "simple-qp"
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

/// min x subject to x ≤ −1 and x ≥ 1: globally infeasible.
pub struct Contradiction;

impl Problem for Contradiction {
    fn name(&self) -> &str {
        "contradiction"
    }
    fn number_variables(&self) -> usize {
        1
    }
    fn number_constraints(&self) -> usize {
        2
    }
    fn variable_bounds(&self, _i: usize) -> Range {
        Range::UNBOUNDED
    }
    fn constraint_bounds(&self, j: usize) -> Range {
        if j == 0 {
            Range { lb: f64::NEG_INFINITY, ub: -1.0 }
        } else {
            Range { lb: 1.0, ub: f64::INFINITY }
        }
    }
    fn initial_primal(&self) -> Vec<f64> {
        vec![0.0]
    }
    fn evaluate_objective(&self, x: &[f64]) -> f64 {
        x[0]
    }
    fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) {
        constraints[0] = x[0];
        constraints[1] = x[0];
    }
    fn evaluate_objective_gradient(&self, _x: &[f64], gradient: &mut SparseVector) {
        gradient.insert(0, 1.0);
    }
    fn evaluate_constraint_jacobian(&self, _x: &[f64], jacobian: &mut [SparseVector]) {
        jacobian[0].insert(0, 1.0);
        jacobian[1].insert(0, 1.0);
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

/// min −x over the whole real line: unbounded below.
pub struct UnboundedBelow;

impl Problem for UnboundedBelow {
    fn name(&self) -> &str {
        "unbounded"
    }
    fn number_variables(&self) -> usize {
        1
    }
    fn number_constraints(&self) -> usize {
        0
    }
    fn variable_bounds(&self, _i: usize) -> Range {
        Range::UNBOUNDED
    }
    fn constraint_bounds(&self, _j: usize) -> Range {
        unreachable!()
    }
    fn initial_primal(&self) -> Vec<f64> {
        vec![0.0]
    }
    fn evaluate_objective(&self, x: &[f64]) -> f64 {
        -x[0]
    }
    fn evaluate_constraints(&self, _x: &[f64], _constraints: &mut [f64]) {}
    fn evaluate_objective_gradient(&self, _x: &[f64], gradient: &mut SparseVector) {
        gradient.insert(0, -1.0);
    }
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

/// min x subject to x ≥ 10 under a tight trust region: the linearized
/// constraint cannot be met within the region, which forces the penalty
/// steering to act.
pub struct FarConstraint;

impl Problem for FarConstraint {
    fn name(&self) -> &str {
        "far-constraint"
    }
    fn number_variables(&self) -> usize {
        1
    }
    fn number_constraints(&self) -> usize {
        1
    }
    fn variable_bounds(&self, _i: usize) -> Range {
        Range::UNBOUNDED
    }
    fn constraint_bounds(&self, _j: usize) -> Range {
        Range { lb: 10.0, ub: f64::INFINITY }
    }
    fn initial_primal(&self) -> Vec<f64> {
        vec![0.0]
    }
    fn evaluate_objective(&self, x: &[f64]) -> f64 {
        x[0]
    }
    fn evaluate_constraints(&self, x: &[f64], constraints: &mut [f64]) {
        constraints[0] = x[0];
    }
    fn evaluate_objective_gradient(&self, _x: &[f64], gradient: &mut SparseVector) {
        gradient.insert(0, 1.0);
    }
    fn evaluate_constraint_jacobian(&self, _x: &[f64], jacobian: &mut [SparseVector]) {
        jacobian[0].insert(0, 1.0);
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
