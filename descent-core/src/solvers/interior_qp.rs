//! Bundled QP/LP backend.
//!
//! Solves the local models
//!
//! ```text
//! minimize    ½ dᵀHd + gᵀd
//! subject to  lv ≤ d ≤ uv,   lc ≤ Jd ≤ uc
//! ```
//!
//! with a primal-dual interior-point iteration on the displacement box and a
//! slack box for the linearized constraints. The condensed KKT system
//! `[H + Σ_d + δ_w I, Jᵀ; J, −(Σ_s⁻¹ + δ_c I)]` is factored by the LDL^T
//! backend; the primal perturbation δ_w grows geometrically until the
//! inertia is (N, m, 0).
//!
//! When the linearized feasible set is empty the backend re-solves an
//! elastic phase-1 model and classifies every constraint by the violated
//! side, which is what the feasibility-restoration layer consumes. Bounds
//! may be ±∞ and are handled natively.

use crate::direction::{
    ActiveSet, ConstraintFeasibility, ConstraintPartition, Direction, SubproblemStatus,
};
use crate::error::SolverError;
use crate::iterate::Multipliers;
use crate::linalg::sparse_vector::SparseVector;
use crate::linalg::symmetric::SymmetricMatrix;
use crate::linalg::{dot, norm_inf};
use crate::problem::Range;
use crate::solvers::ldl::LdlSolver;
use crate::solvers::{QpSolver, SymmetricIndefiniteSolver};

/// Fraction-to-boundary factor.
const TAU: f64 = 0.995;
/// Centering factor for the monotone barrier decrease.
const SIGMA: f64 = 0.1;
/// Diagonal weight pinning the duals of constraints with no finite bounds.
const FREE_ROW_WEIGHT: f64 = 1e20;
/// Dual regularization of the constraint block.
const DELTA_C: f64 = 1e-8;
/// Primal regularization schedule.
const DELTA_W_INITIAL: f64 = 1e-4;
const DELTA_W_GROWTH: f64 = 8.0;
const DELTA_W_MAX: f64 = 1e40;
/// Divergence guard for unbounded models.
const DIVERGENCE_NORM: f64 = 1e9;
/// Activity detection at the solution.
const ACTIVITY_TOLERANCE: f64 = 1e-7;

/// Interior-point QP/LP backend.
pub struct InteriorQpSolver {
    tolerance: f64,
    max_iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowClass {
    Equality,
    Inequality,
    Free,
}

struct IpState {
    n: usize,
    m: usize,
    d: Vec<f64>,
    s: Vec<f64>,
    lambda: Vec<f64>,
    // one-sided nonnegative duals
    z_dl: Vec<f64>,
    z_du: Vec<f64>,
    z_sl: Vec<f64>,
    z_su: Vec<f64>,
    row_class: Vec<RowClass>,
}

impl InteriorQpSolver {
    /// Backend with the given convergence tolerance and iteration budget.
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        InteriorQpSolver { tolerance, max_iterations }
    }

    fn solve_inner(
        &mut self,
        n: usize,
        m: usize,
        variables_bounds: &[Range],
        constraints_bounds: &[Range],
        linear_objective: &SparseVector,
        constraints_jacobian: &[SparseVector],
        hessian: Option<&SymmetricMatrix>,
        initial_point: &[f64],
        classify_infeasibility: bool,
    ) -> Result<Direction, SolverError> {
        let mut state = initialize_state(n, m, variables_bounds, constraints_bounds, constraints_jacobian, initial_point);
        let g = dense_gradient(linear_objective, n);
        let barrier_pairs = count_barrier_pairs(&state, variables_bounds, constraints_bounds);
        let has_equalities = state.row_class.iter().any(|&c| c == RowClass::Equality);

        let mut ldl = LdlSolver::new(n + m);
        let mut converged = false;
        let mut required_regularization = false;

        for _ in 0..self.max_iterations {
            let residuals = compute_residuals(&state, &g, hessian, variables_bounds, constraints_bounds, constraints_jacobian);

            if self.is_converged(&state, &residuals, barrier_pairs) {
                converged = true;
                break;
            }
            if DIVERGENCE_NORM < norm_inf(&state.d) {
                return Ok(unbounded_direction(&state, &g, hessian));
            }

            // monotone barrier decrease
            let mu = if 0 < barrier_pairs {
                SIGMA * total_complementarity(&state, variables_bounds, constraints_bounds) / barrier_pairs as f64
            } else {
                0.0
            };

            let (delta_d, delta_lambda, used_regularization) = self.newton_step(
                &mut ldl,
                &state,
                &residuals,
                hessian,
                variables_bounds,
                constraints_bounds,
                constraints_jacobian,
                mu,
            )?;
            required_regularization |= used_regularization;

            // a regularized step on a model with nothing to bound it means the
            // model is unbounded below
            if used_regularization && barrier_pairs == 0 && !has_equalities {
                return Ok(unbounded_direction(&state, &g, hessian));
            }

            take_step(
                &mut state,
                &delta_d,
                &delta_lambda,
                &residuals,
                variables_bounds,
                constraints_bounds,
                constraints_jacobian,
                mu,
            );
        }

        if converged {
            return Ok(self.assemble_direction(&state, &g, hessian, variables_bounds, constraints_bounds));
        }

        // No convergence: decide between local infeasibility and plain
        // iteration exhaustion.
        let residuals = compute_residuals(&state, &g, hessian, variables_bounds, constraints_bounds, constraints_jacobian);
        let primal_scale = 1.0 + norm_inf(&state.d) + norm_inf(&state.s);
        if classify_infeasibility && 1e-7 * primal_scale < norm_inf(&residuals.primal) {
            return self.classify_infeasibility(
                n,
                m,
                variables_bounds,
                constraints_bounds,
                constraints_jacobian,
                initial_point,
            );
        }
        let mut direction = self.assemble_direction(&state, &g, hessian, variables_bounds, constraints_bounds);
        direction.status = if required_regularization && norm_inf(&state.d) > 1e6 {
            SubproblemStatus::UnboundedProblem
        } else {
            SubproblemStatus::SubOptimal
        };
        Ok(direction)
    }

    fn is_converged(&self, state: &IpState, residuals: &KktResiduals, barrier_pairs: usize) -> bool {
        let dual_scale = 1.0
            + norm_inf(&state.lambda)
            + norm_inf(&state.z_dl)
            + norm_inf(&state.z_du)
            + norm_inf(&state.z_sl)
            + norm_inf(&state.z_su);
        let primal_scale = 1.0 + norm_inf(&state.d) + norm_inf(&state.s);
        let complementarity = if 0 < barrier_pairs {
            residuals.complementarity / barrier_pairs as f64
        } else {
            0.0
        };
        norm_inf(&residuals.dual) <= self.tolerance * dual_scale
            && norm_inf(&residuals.primal) <= self.tolerance * primal_scale
            && norm_inf(&residuals.slack_dual) <= self.tolerance * dual_scale
            && complementarity <= self.tolerance * dual_scale
    }

    #[allow(clippy::type_complexity)]
    fn newton_step(
        &self,
        ldl: &mut LdlSolver,
        state: &IpState,
        residuals: &KktResiduals,
        hessian: Option<&SymmetricMatrix>,
        variables_bounds: &[Range],
        constraints_bounds: &[Range],
        constraints_jacobian: &[SparseVector],
        mu: f64,
    ) -> Result<(Vec<f64>, Vec<f64>, bool), SolverError> {
        let n = state.n;
        let m = state.m;

        // barrier-condensed diagonal terms
        let mut sigma_d = vec![0.0; n];
        for i in 0..n {
            let bounds = variables_bounds[i];
            if bounds.lb.is_finite() {
                sigma_d[i] += state.z_dl[i] / (state.d[i] - bounds.lb);
            }
            if bounds.ub.is_finite() {
                sigma_d[i] += state.z_du[i] / (bounds.ub - state.d[i]);
            }
        }
        let mut sigma_s_inv = vec![0.0; m];
        for j in 0..m {
            match state.row_class[j] {
                RowClass::Equality => sigma_s_inv[j] = 0.0,
                RowClass::Free => sigma_s_inv[j] = FREE_ROW_WEIGHT,
                RowClass::Inequality => {
                    let bounds = constraints_bounds[j];
                    let mut sigma = 0.0;
                    if bounds.lb.is_finite() {
                        sigma += state.z_sl[j] / (state.s[j] - bounds.lb);
                    }
                    if bounds.ub.is_finite() {
                        sigma += state.z_su[j] / (bounds.ub - state.s[j]);
                    }
                    sigma_s_inv[j] = 1.0 / sigma.max(1e-16);
                }
            }
        }

        // condensed right-hand side
        let mut rhs = vec![0.0; n + m];
        let r_hat_d = barrier_dual_residual(state, residuals, variables_bounds, mu);
        for i in 0..n {
            rhs[i] = -r_hat_d[i];
        }
        let r_hat_s = barrier_slack_residual(state, residuals, constraints_bounds, mu);
        for j in 0..m {
            rhs[n + j] = -residuals.primal[j] - sigma_s_inv[j] * r_hat_s[j];
        }

        // inertia-corrected factorization
        let mut delta_w = 0.0;
        let mut used_regularization = false;
        loop {
            let kkt = assemble_kkt(
                n,
                m,
                hessian,
                &sigma_d,
                &sigma_s_inv,
                constraints_jacobian,
                delta_w,
                DELTA_C,
            );
            let factorization = ldl.factorize(&kkt);
            let inertia_ok = factorization.is_ok() && {
                let inertia = ldl.inertia();
                inertia.positive == n && inertia.negative == m && inertia.zero == 0
            };
            if inertia_ok {
                break;
            }
            used_regularization = true;
            delta_w = if delta_w == 0.0 { DELTA_W_INITIAL } else { delta_w * DELTA_W_GROWTH };
            if DELTA_W_MAX < delta_w {
                return Err(SolverError::Regularization(format!(
                    "KKT inertia not correctable with perturbation {delta_w:e}"
                )));
            }
        }

        let solution = ldl.solve(&rhs)?;
        let delta_d = solution[..n].to_vec();
        let delta_lambda: Vec<f64> = solution[n..].iter().map(|&w| -w).collect();
        Ok((delta_d, delta_lambda, used_regularization))
    }

    fn classify_infeasibility(
        &mut self,
        n: usize,
        m: usize,
        variables_bounds: &[Range],
        constraints_bounds: &[Range],
        constraints_jacobian: &[SparseVector],
        initial_point: &[f64],
    ) -> Result<Direction, SolverError> {
        // elastic phase 1: minimize Σ(n_j + p_j) over the same box
        let mut elastic_lower = vec![usize::MAX; m]; // n_j lifts a violated lower bound
        let mut elastic_upper = vec![usize::MAX; m]; // p_j absorbs a violated upper bound
        let mut total = n;
        for j in 0..m {
            let bounds = constraints_bounds[j];
            if bounds.lb.is_finite() {
                elastic_lower[j] = total;
                total += 1;
            }
            if bounds.ub.is_finite() {
                elastic_upper[j] = total;
                total += 1;
            }
        }

        let mut elastic_variable_bounds = variables_bounds[..n].to_vec();
        elastic_variable_bounds.resize(total, Range { lb: 0.0, ub: f64::INFINITY });

        let mut elastic_objective = SparseVector::with_capacity(total - n);
        for index in n..total {
            elastic_objective.insert(index, 1.0);
        }

        let mut elastic_jacobian: Vec<SparseVector> = constraints_jacobian[..m].to_vec();
        for j in 0..m {
            if elastic_lower[j] != usize::MAX {
                elastic_jacobian[j].insert(elastic_lower[j], 1.0);
            }
            if elastic_upper[j] != usize::MAX {
                elastic_jacobian[j].insert(elastic_upper[j], -1.0);
            }
        }

        let mut elastic_start = initial_point[..n.min(initial_point.len())].to_vec();
        elastic_start.resize(total, 1.0);

        let relaxed = self.solve_inner(
            total,
            m,
            &elastic_variable_bounds,
            constraints_bounds,
            &elastic_objective,
            &elastic_jacobian,
            None,
            &elastic_start,
            false,
        )?;

        let violation: f64 = (n..total).map(|i| relaxed.x[i].max(0.0)).sum();
        if violation <= 1e-7 * (1.0 + norm_inf(&relaxed.x[..n])) {
            // feasible after all; report the non-converged main solve
            let mut direction = relaxed;
            direction.x.truncate(n);
            direction.status = SubproblemStatus::SubOptimal;
            return Ok(direction);
        }

        let mut partition = ConstraintPartition::new(m);
        let threshold = 1e-8 * (1.0 + violation);
        for j in 0..m {
            let lower_violation = if elastic_lower[j] != usize::MAX { relaxed.x[elastic_lower[j]] } else { 0.0 };
            let upper_violation = if elastic_upper[j] != usize::MAX { relaxed.x[elastic_upper[j]] } else { 0.0 };
            if threshold < lower_violation && upper_violation <= lower_violation {
                partition.infeasible.push(j);
                partition.constraint_feasibility[j] = ConstraintFeasibility::InfeasibleLower;
            } else if threshold < upper_violation {
                partition.infeasible.push(j);
                partition.constraint_feasibility[j] = ConstraintFeasibility::InfeasibleUpper;
            } else {
                partition.feasible.push(j);
            }
        }

        let mut x = relaxed.x;
        x.truncate(n);
        let norm = norm_inf(&x);
        Ok(Direction {
            x,
            multipliers: Multipliers::new(n, m),
            status: SubproblemStatus::Infeasible,
            objective_multiplier: 1.0,
            objective: violation,
            norm,
            active_set: ActiveSet::default(),
            constraint_partition: Some(partition),
            is_relaxed: false,
        })
    }

    fn assemble_direction(
        &self,
        state: &IpState,
        g: &[f64],
        hessian: Option<&SymmetricMatrix>,
        variables_bounds: &[Range],
        constraints_bounds: &[Range],
    ) -> Direction {
        let n = state.n;
        let m = state.m;
        // snap numerically-zero displacements so stationary points report an
        // exact zero step
        let mut displacement = state.d.clone();
        for entry in &mut displacement {
            if entry.abs() <= 1e-11 {
                *entry = 0.0;
            }
        }
        let mut multipliers = Multipliers::new(n, m);
        multipliers.constraints.copy_from_slice(&state.lambda);
        for i in 0..n {
            multipliers.lower_bounds[i] = state.z_dl[i];
            multipliers.upper_bounds[i] = -state.z_du[i];
        }
        multipliers.enforce_signs();

        let mut active_set = ActiveSet::default();
        for i in 0..n {
            let bounds = variables_bounds[i];
            if bounds.lb.is_finite() && state.d[i] - bounds.lb <= ACTIVITY_TOLERANCE * (1.0 + bounds.lb.abs()) {
                active_set.bounds_at_lower.push(i);
            } else if bounds.ub.is_finite() && bounds.ub - state.d[i] <= ACTIVITY_TOLERANCE * (1.0 + bounds.ub.abs()) {
                active_set.bounds_at_upper.push(i);
            }
        }
        for j in 0..m {
            let bounds = constraints_bounds[j];
            if bounds.lb.is_finite() && state.s[j] - bounds.lb <= ACTIVITY_TOLERANCE * (1.0 + bounds.lb.abs()) {
                active_set.constraints_at_lower.push(j);
            } else if bounds.ub.is_finite() && bounds.ub - state.s[j] <= ACTIVITY_TOLERANCE * (1.0 + bounds.ub.abs()) {
                active_set.constraints_at_upper.push(j);
            }
        }

        Direction {
            objective: model_objective(&displacement, g, hessian),
            norm: norm_inf(&displacement),
            x: displacement,
            multipliers,
            status: SubproblemStatus::Optimal,
            objective_multiplier: 1.0,
            active_set,
            constraint_partition: None,
            is_relaxed: false,
        }
    }
}

impl QpSolver for InteriorQpSolver {
    fn solve_qp(
        &mut self,
        number_variables: usize,
        number_constraints: usize,
        variables_bounds: &[Range],
        constraints_bounds: &[Range],
        linear_objective: &SparseVector,
        constraints_jacobian: &[SparseVector],
        hessian: &SymmetricMatrix,
        initial_point: &[f64],
    ) -> Result<Direction, SolverError> {
        self.solve_inner(
            number_variables,
            number_constraints,
            variables_bounds,
            constraints_bounds,
            linear_objective,
            constraints_jacobian,
            Some(hessian),
            initial_point,
            true,
        )
    }

    fn solve_lp(
        &mut self,
        number_variables: usize,
        number_constraints: usize,
        variables_bounds: &[Range],
        constraints_bounds: &[Range],
        linear_objective: &SparseVector,
        constraints_jacobian: &[SparseVector],
        initial_point: &[f64],
    ) -> Result<Direction, SolverError> {
        self.solve_inner(
            number_variables,
            number_constraints,
            variables_bounds,
            constraints_bounds,
            linear_objective,
            constraints_jacobian,
            None,
            initial_point,
            true,
        )
    }
}

struct KktResiduals {
    /// Hd + g − Jᵀλ − z_dl + z_du
    dual: Vec<f64>,
    /// Jd − s
    primal: Vec<f64>,
    /// λ − z_sl + z_su (inequality rows)
    slack_dual: Vec<f64>,
    /// Σ slack·dual over all barrier pairs
    complementarity: f64,
}

fn initialize_state(
    n: usize,
    m: usize,
    variables_bounds: &[Range],
    constraints_bounds: &[Range],
    constraints_jacobian: &[SparseVector],
    initial_point: &[f64],
) -> IpState {
    let row_class: Vec<RowClass> = (0..m)
        .map(|j| {
            let bounds = constraints_bounds[j];
            if bounds.is_equality() {
                RowClass::Equality
            } else if bounds.lb.is_finite() || bounds.ub.is_finite() {
                RowClass::Inequality
            } else {
                RowClass::Free
            }
        })
        .collect();

    let mut d = vec![0.0; n];
    for i in 0..n {
        let start = initial_point.get(i).copied().unwrap_or(0.0);
        d[i] = push_inside(start, variables_bounds[i]);
    }

    let mut s = vec![0.0; m];
    let mut z_sl = vec![0.0; m];
    let mut z_su = vec![0.0; m];
    for j in 0..m {
        let value = constraints_jacobian[j].dot(&d);
        match row_class[j] {
            RowClass::Equality => s[j] = constraints_bounds[j].lb,
            RowClass::Free => s[j] = value,
            RowClass::Inequality => {
                let bounds = constraints_bounds[j];
                s[j] = push_inside(value, bounds);
                if bounds.lb.is_finite() {
                    z_sl[j] = 1.0;
                }
                if bounds.ub.is_finite() {
                    z_su[j] = 1.0;
                }
            }
        }
    }

    let mut z_dl = vec![0.0; n];
    let mut z_du = vec![0.0; n];
    for i in 0..n {
        if variables_bounds[i].lb.is_finite() {
            z_dl[i] = 1.0;
        }
        if variables_bounds[i].ub.is_finite() {
            z_du[i] = 1.0;
        }
    }

    IpState { n, m, d, s, lambda: vec![0.0; m], z_dl, z_du, z_sl, z_su, row_class }
}

/// Push a value strictly inside a range (no-op on infinite sides).
fn push_inside(value: f64, bounds: Range) -> f64 {
    if bounds.is_equality() {
        return bounds.lb;
    }
    let width = bounds.ub - bounds.lb;
    let mut result = value;
    if bounds.lb.is_finite() {
        let perturbation = if width.is_finite() {
            (1e-2 * 1.0_f64.max(bounds.lb.abs())).min(1e-2 * width)
        } else {
            1e-2 * 1.0_f64.max(bounds.lb.abs())
        };
        result = result.max(bounds.lb + perturbation);
    }
    if bounds.ub.is_finite() {
        let perturbation = if width.is_finite() {
            (1e-2 * 1.0_f64.max(bounds.ub.abs())).min(1e-2 * width)
        } else {
            1e-2 * 1.0_f64.max(bounds.ub.abs())
        };
        result = result.min(bounds.ub - perturbation);
    }
    result
}

fn dense_gradient(linear_objective: &SparseVector, n: usize) -> Vec<f64> {
    let mut g = vec![0.0; n];
    for (i, v) in linear_objective.iter() {
        if i < n {
            g[i] += v;
        }
    }
    g
}

fn count_barrier_pairs(state: &IpState, variables_bounds: &[Range], constraints_bounds: &[Range]) -> usize {
    let mut pairs = 0;
    for i in 0..state.n {
        pairs += variables_bounds[i].lb.is_finite() as usize + variables_bounds[i].ub.is_finite() as usize;
    }
    for j in 0..state.m {
        if state.row_class[j] == RowClass::Inequality {
            pairs += constraints_bounds[j].lb.is_finite() as usize + constraints_bounds[j].ub.is_finite() as usize;
        }
    }
    pairs
}

fn total_complementarity(state: &IpState, variables_bounds: &[Range], constraints_bounds: &[Range]) -> f64 {
    let mut total = 0.0;
    for i in 0..state.n {
        let bounds = variables_bounds[i];
        if bounds.lb.is_finite() {
            total += (state.d[i] - bounds.lb) * state.z_dl[i];
        }
        if bounds.ub.is_finite() {
            total += (bounds.ub - state.d[i]) * state.z_du[i];
        }
    }
    for j in 0..state.m {
        if state.row_class[j] == RowClass::Inequality {
            let bounds = constraints_bounds[j];
            if bounds.lb.is_finite() {
                total += (state.s[j] - bounds.lb) * state.z_sl[j];
            }
            if bounds.ub.is_finite() {
                total += (bounds.ub - state.s[j]) * state.z_su[j];
            }
        }
    }
    total
}

fn hessian_vector_product(hessian: Option<&SymmetricMatrix>, d: &[f64], out: &mut [f64]) {
    if let Some(h) = hessian {
        for (row, column, value) in h.iter() {
            if row < d.len() && column < d.len() {
                out[row] += value * d[column];
                if row != column {
                    out[column] += value * d[row];
                }
            }
        }
    }
}

fn model_objective(d: &[f64], g: &[f64], hessian: Option<&SymmetricMatrix>) -> f64 {
    let quadratic = hessian.map(|h| h.quadratic_product(d, d, d.len())).unwrap_or(0.0);
    0.5 * quadratic + dot(g, d)
}

fn compute_residuals(
    state: &IpState,
    g: &[f64],
    hessian: Option<&SymmetricMatrix>,
    variables_bounds: &[Range],
    constraints_bounds: &[Range],
    constraints_jacobian: &[SparseVector],
) -> KktResiduals {
    let n = state.n;
    let m = state.m;

    let mut dual = g.to_vec();
    hessian_vector_product(hessian, &state.d, &mut dual);
    for j in 0..m {
        let lambda_j = state.lambda[j];
        if lambda_j != 0.0 {
            for (i, v) in constraints_jacobian[j].iter() {
                if i < n {
                    dual[i] -= lambda_j * v;
                }
            }
        }
    }
    for i in 0..n {
        dual[i] -= state.z_dl[i];
        dual[i] += state.z_du[i];
    }

    let mut primal = vec![0.0; m];
    for j in 0..m {
        primal[j] = constraints_jacobian[j].dot(&state.d) - state.s[j];
    }

    let mut slack_dual = vec![0.0; m];
    for j in 0..m {
        if state.row_class[j] == RowClass::Inequality {
            slack_dual[j] = state.lambda[j] - state.z_sl[j] + state.z_su[j];
        }
    }

    KktResiduals {
        dual,
        primal,
        slack_dual,
        complementarity: total_complementarity(state, variables_bounds, constraints_bounds),
    }
}

fn barrier_dual_residual(state: &IpState, residuals: &KktResiduals, variables_bounds: &[Range], mu: f64) -> Vec<f64> {
    let mut r_hat = residuals.dual.clone();
    for i in 0..state.n {
        let bounds = variables_bounds[i];
        if bounds.lb.is_finite() {
            r_hat[i] += state.z_dl[i] - mu / (state.d[i] - bounds.lb);
        }
        if bounds.ub.is_finite() {
            r_hat[i] += mu / (bounds.ub - state.d[i]) - state.z_du[i];
        }
    }
    r_hat
}

fn barrier_slack_residual(state: &IpState, residuals: &KktResiduals, constraints_bounds: &[Range], mu: f64) -> Vec<f64> {
    let mut r_hat = vec![0.0; state.m];
    for j in 0..state.m {
        match state.row_class[j] {
            RowClass::Equality => {}
            RowClass::Free => r_hat[j] = state.lambda[j],
            RowClass::Inequality => {
                let bounds = constraints_bounds[j];
                r_hat[j] = residuals.slack_dual[j];
                if bounds.lb.is_finite() {
                    r_hat[j] += state.z_sl[j] - mu / (state.s[j] - bounds.lb);
                }
                if bounds.ub.is_finite() {
                    r_hat[j] += mu / (bounds.ub - state.s[j]) - state.z_su[j];
                }
            }
        }
    }
    r_hat
}

fn assemble_kkt(
    n: usize,
    m: usize,
    hessian: Option<&SymmetricMatrix>,
    sigma_d: &[f64],
    sigma_s_inv: &[f64],
    constraints_jacobian: &[SparseVector],
    delta_w: f64,
    delta_c: f64,
) -> SymmetricMatrix {
    let capacity = hessian.map(|h| h.number_nonzeros()).unwrap_or(0)
        + n
        + m
        + constraints_jacobian.iter().map(SparseVector::len).sum::<usize>();
    let mut kkt = SymmetricMatrix::with_capacity(n + m, capacity, false);

    if let Some(h) = hessian {
        for (row, column, value) in h.iter() {
            if row < n && column < n {
                kkt.insert(value, row, column);
            }
        }
    }
    for (i, &sigma) in sigma_d.iter().enumerate() {
        kkt.insert(sigma + delta_w, i, i);
    }
    for j in 0..m {
        for (i, v) in constraints_jacobian[j].iter() {
            if i < n {
                kkt.insert(v, n + j, i);
            }
        }
        kkt.insert(-(sigma_s_inv[j] + delta_c), n + j, n + j);
    }
    kkt
}

fn take_step(
    state: &mut IpState,
    delta_d: &[f64],
    delta_lambda: &[f64],
    residuals: &KktResiduals,
    variables_bounds: &[Range],
    constraints_bounds: &[Range],
    constraints_jacobian: &[SparseVector],
    mu: f64,
) {
    let n = state.n;
    let m = state.m;

    // slack displacement from the primal identity J Δd − Δs = −rp
    let mut delta_s = vec![0.0; m];
    for j in 0..m {
        if state.row_class[j] != RowClass::Equality {
            delta_s[j] = constraints_jacobian[j].dot(delta_d) + residuals.primal[j];
        }
    }

    // dual displacements from the centrality equations
    let mut delta_z_dl = vec![0.0; n];
    let mut delta_z_du = vec![0.0; n];
    for i in 0..n {
        let bounds = variables_bounds[i];
        if bounds.lb.is_finite() {
            let slack = state.d[i] - bounds.lb;
            delta_z_dl[i] = mu / slack - state.z_dl[i] - state.z_dl[i] / slack * delta_d[i];
        }
        if bounds.ub.is_finite() {
            let slack = bounds.ub - state.d[i];
            delta_z_du[i] = mu / slack - state.z_du[i] + state.z_du[i] / slack * delta_d[i];
        }
    }

    // primal fraction-to-boundary
    let mut alpha_primal: f64 = 1.0;
    for i in 0..n {
        let bounds = variables_bounds[i];
        if bounds.lb.is_finite() && delta_d[i] < 0.0 {
            alpha_primal = alpha_primal.min(TAU * (state.d[i] - bounds.lb) / -delta_d[i]);
        }
        if bounds.ub.is_finite() && 0.0 < delta_d[i] {
            alpha_primal = alpha_primal.min(TAU * (bounds.ub - state.d[i]) / delta_d[i]);
        }
    }

    for j in 0..m {
        if state.row_class[j] == RowClass::Inequality {
            let bounds = constraints_bounds[j];
            if bounds.lb.is_finite() && delta_s[j] < 0.0 {
                alpha_primal = alpha_primal.min(TAU * (state.s[j] - bounds.lb) / -delta_s[j]);
            }
            if bounds.ub.is_finite() && 0.0 < delta_s[j] {
                alpha_primal = alpha_primal.min(TAU * (bounds.ub - state.s[j]) / delta_s[j]);
            }
        }
    }

    let mut delta_z_sl = vec![0.0; m];
    let mut delta_z_su = vec![0.0; m];
    for j in 0..m {
        if state.row_class[j] == RowClass::Inequality {
            let bounds = constraints_bounds[j];
            if bounds.lb.is_finite() {
                let slack = state.s[j] - bounds.lb;
                delta_z_sl[j] = mu / slack - state.z_sl[j] - state.z_sl[j] / slack * delta_s[j];
            }
            if bounds.ub.is_finite() {
                let slack = bounds.ub - state.s[j];
                delta_z_su[j] = mu / slack - state.z_su[j] + state.z_su[j] / slack * delta_s[j];
            }
        }
    }

    // dual fraction-to-boundary
    let mut alpha_dual: f64 = 1.0;
    let mut cap = |z: f64, dz: f64| {
        if dz < 0.0 && 0.0 < z {
            alpha_dual = alpha_dual.min(TAU * z / -dz);
        }
    };
    for i in 0..n {
        cap(state.z_dl[i], delta_z_dl[i]);
        cap(state.z_du[i], delta_z_du[i]);
    }
    for j in 0..m {
        cap(state.z_sl[j], delta_z_sl[j]);
        cap(state.z_su[j], delta_z_su[j]);
    }

    for i in 0..n {
        state.d[i] += alpha_primal * delta_d[i];
        state.z_dl[i] += alpha_dual * delta_z_dl[i];
        state.z_du[i] += alpha_dual * delta_z_du[i];
    }
    for j in 0..m {
        state.s[j] += alpha_primal * delta_s[j];
        state.lambda[j] += alpha_dual * delta_lambda[j];
        state.z_sl[j] += alpha_dual * delta_z_sl[j];
        state.z_su[j] += alpha_dual * delta_z_su[j];
    }
}

fn unbounded_direction(state: &IpState, g: &[f64], hessian: Option<&SymmetricMatrix>) -> Direction {
    let mut direction = Direction::zero(state.n, state.m);
    direction.x.copy_from_slice(&state.d);
    direction.norm = norm_inf(&state.d);
    direction.objective = model_objective(&state.d, g, hessian);
    direction.status = SubproblemStatus::UnboundedProblem;
    direction
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(lb: f64, ub: f64) -> Range {
        Range { lb, ub }
    }

    #[test]
    fn equality_constrained_quadratic() {
        // min ½(d1² + d2²) s.t. d1 + d2 = 1 → d = (0.5, 0.5), λ = 0.5
        let mut hessian = SymmetricMatrix::with_capacity(2, 2, false);
        hessian.insert(1.0, 0, 0);
        hessian.insert(1.0, 1, 1);
        let jacobian = vec![[(0, 1.0), (1, 1.0)].into_iter().collect::<SparseVector>()];
        let gradient = SparseVector::new();

        let mut solver = InteriorQpSolver::new(1e-9, 100);
        let direction = solver
            .solve_qp(
                2,
                1,
                &[Range::UNBOUNDED, Range::UNBOUNDED],
                &[Range::fixed(1.0)],
                &gradient,
                &jacobian,
                &hessian,
                &[0.0, 0.0],
            )
            .unwrap();

        assert_eq!(direction.status, SubproblemStatus::Optimal);
        assert!((direction.x[0] - 0.5).abs() < 1e-6, "d = {:?}", direction.x);
        assert!((direction.x[1] - 0.5).abs() < 1e-6);
        assert!((direction.multipliers.constraints[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn box_constrained_lp() {
        // min -d over d ∈ [-2, 3] → d = 3, upper bound active
        let gradient: SparseVector = [(0, -1.0)].into_iter().collect();
        let mut solver = InteriorQpSolver::new(1e-9, 200);
        let direction = solver
            .solve_lp(1, 0, &[range(-2.0, 3.0)], &[], &gradient, &[], &[0.0])
            .unwrap();
        assert_eq!(direction.status, SubproblemStatus::Optimal);
        assert!((direction.x[0] - 3.0).abs() < 1e-5, "d = {:?}", direction.x);
        assert!(direction.active_set.bounds_at_upper.contains(&0));
    }

    #[test]
    fn unbounded_lp_is_detected() {
        // min -d, d free: unbounded below
        let gradient: SparseVector = [(0, -1.0)].into_iter().collect();
        let mut solver = InteriorQpSolver::new(1e-9, 200);
        let direction = solver
            .solve_lp(1, 0, &[Range::UNBOUNDED], &[], &gradient, &[], &[0.0])
            .unwrap();
        assert_eq!(direction.status, SubproblemStatus::UnboundedProblem);
    }

    #[test]
    fn infeasible_rows_are_classified() {
        // d ≤ -1 and d ≥ 1 cannot hold together
        let jacobian = vec![
            [(0, 1.0)].into_iter().collect::<SparseVector>(),
            [(0, 1.0)].into_iter().collect::<SparseVector>(),
        ];
        let gradient: SparseVector = [(0, 1.0)].into_iter().collect();
        let mut solver = InteriorQpSolver::new(1e-9, 100);
        let direction = solver
            .solve_lp(
                1,
                2,
                &[Range::UNBOUNDED],
                &[range(f64::NEG_INFINITY, -1.0), range(1.0, f64::INFINITY)],
                &gradient,
                &jacobian,
                &[0.0],
            )
            .unwrap();

        assert_eq!(direction.status, SubproblemStatus::Infeasible);
        let partition = direction.constraint_partition.as_ref().unwrap();
        assert_eq!(partition.constraint_feasibility[0], ConstraintFeasibility::InfeasibleUpper);
        assert_eq!(partition.constraint_feasibility[1], ConstraintFeasibility::InfeasibleLower);
        assert_eq!(partition.infeasible.len(), 2);
        // minimal total violation of the two half-lines is 2
        assert!((direction.objective - 2.0).abs() < 1e-5);
    }

    #[test]
    fn inequality_constraint_with_bounds() {
        // min ½d² - 2d s.t. d ≤ 1 (via constraint row), d ∈ [-5, 5] → d = 1
        let mut hessian = SymmetricMatrix::with_capacity(1, 1, false);
        hessian.insert(1.0, 0, 0);
        let gradient: SparseVector = [(0, -2.0)].into_iter().collect();
        let jacobian = vec![[(0, 1.0)].into_iter().collect::<SparseVector>()];

        let mut solver = InteriorQpSolver::new(1e-9, 100);
        let direction = solver
            .solve_qp(
                1,
                1,
                &[range(-5.0, 5.0)],
                &[range(f64::NEG_INFINITY, 1.0)],
                &gradient,
                &jacobian,
                &hessian,
                &[0.0],
            )
            .unwrap();

        assert_eq!(direction.status, SubproblemStatus::Optimal);
        assert!((direction.x[0] - 1.0).abs() < 1e-6, "d = {:?}", direction.x);
        // upper-side multiplier is negative in the solver convention
        assert!(direction.multipliers.constraints[0] < -0.5);
    }
}
