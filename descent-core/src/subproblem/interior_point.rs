//! Primal-dual interior-point subproblem.
//!
//! Maintains a barrier parameter μ driven to zero by the Fiacco-McCormick
//! update, and produces one inertia-corrected primal-dual Newton step of the
//! μ-barrier problem per solve. General constraints are handled through
//! internal slacks `s` with `c(x) − s = 0`; the slacks and their duals never
//! appear in the iterate.
//!
//! The step is computed in displacement space on the condensed KKT system
//! `[W + Σ_x + δ_w I, Jᵀ; J, −(Σ_s⁻¹ + δ_c I)]`, whose required inertia is
//! (n, m, 0); the primal perturbation δ_w grows geometrically until the
//! factorization agrees, and exhausting the budget is a fatal regularization
//! failure.

use crate::direction::{ActiveSet, Direction, PredictedReductionModel};
use crate::error::SolverError;
use crate::iterate::{Iterate, Multipliers, ProgressMeasures};
use crate::linalg::norm_inf;
use crate::linalg::sparse_vector::SparseVector;
use crate::linalg::symmetric::SymmetricMatrix;
use crate::problem::{Norm, Problem, Range};
use crate::solvers::ldl::LdlSolver;
use crate::solvers::SymmetricIndefiniteSolver;
use crate::statistics::Statistics;
use crate::statistics::DOUBLE_WIDTH;
use crate::subproblem::hessian::{HessianModel, HessianModelKind};
use crate::subproblem::{
    compute_least_squares_multipliers, Subproblem, SubproblemWorkspace,
};

/// Barrier strategy constants (see the Fiacco-McCormick update).
pub struct BarrierParameters {
    pub initial: f64,
    pub kappa_mu: f64,
    pub theta_mu: f64,
    pub kappa_epsilon: f64,
    pub kappa_sigma: f64,
    pub tau_min: f64,
    pub tolerance: f64,
}

/// Regularization schedule of the KKT system.
pub struct RegularizationParameters {
    pub initial_value: f64,
    pub increase_factor: f64,
    pub max_value: f64,
}

const DELTA_C: f64 = 1e-8;
/// Floor keeping barrier denominators harmless.
const SLACK_FLOOR: f64 = 1e-16;

/// Interior-point model of the nonlinear problem.
pub struct InteriorPointSubproblem {
    workspace: SubproblemWorkspace,
    hessian_model: HessianModel,
    barrier: BarrierParameters,
    regularization: RegularizationParameters,
    multipliers_max_norm: f64,

    mu: f64,
    objective_multiplier: f64,
    /// internal constraint slacks, strictly inside their ranges
    slacks: Vec<f64>,
    /// nonnegative duals of the slack box (lower and upper side)
    slack_duals_lower: Vec<f64>,
    slack_duals_upper: Vec<f64>,

    ldl: LdlSolver,
    /// barrier gradient at the last solve, for the predicted-reduction model
    barrier_gradient: Vec<f64>,
    /// condensed bound curvature at the last solve
    sigma_x_cache: Vec<f64>,
    number_subproblems_solved: usize,
    definition_changed: bool,
}

impl InteriorPointSubproblem {
    /// New interior-point subproblem.
    pub fn new(
        problem: &dyn Problem,
        max_number_variables: usize,
        hessian_model_kind: HessianModelKind,
        barrier: BarrierParameters,
        regularization: RegularizationParameters,
        multipliers_max_norm: f64,
    ) -> Self {
        let n = problem.number_variables();
        let m = problem.number_constraints();
        let mu = barrier.initial;
        InteriorPointSubproblem {
            workspace: SubproblemWorkspace::new(n, max_number_variables, m),
            hessian_model: HessianModel::new(
                hessian_model_kind,
                n,
                problem.hessian_maximum_number_nonzeros(),
                false,
            ),
            barrier,
            regularization,
            multipliers_max_norm,
            mu,
            objective_multiplier: 1.0,
            slacks: vec![0.0; m],
            slack_duals_lower: vec![0.0; m],
            slack_duals_upper: vec![0.0; m],
            ldl: LdlSolver::new(n + m),
            barrier_gradient: vec![0.0; n],
            sigma_x_cache: vec![0.0; n],
            number_subproblems_solved: 0,
            definition_changed: false,
        }
    }

    /// Current barrier parameter.
    pub fn barrier_parameter(&self) -> f64 {
        self.mu
    }

    fn reset_slacks(&mut self, problem: &dyn Problem, iterate: &mut Iterate) -> Result<(), SolverError> {
        iterate.evaluate_constraints(problem)?;
        for j in 0..problem.number_constraints() {
            let bounds = problem.constraint_bounds(j);
            if bounds.is_equality() {
                self.slacks[j] = bounds.lb;
                self.slack_duals_lower[j] = 0.0;
                self.slack_duals_upper[j] = 0.0;
            } else {
                self.slacks[j] = push_inside(iterate.constraints[j], bounds);
                self.slack_duals_lower[j] = if bounds.lb.is_finite() {
                    (self.mu / (self.slacks[j] - bounds.lb).max(SLACK_FLOOR)).min(self.multipliers_max_norm)
                } else {
                    0.0
                };
                self.slack_duals_upper[j] = if bounds.ub.is_finite() {
                    (self.mu / (bounds.ub - self.slacks[j]).max(SLACK_FLOOR)).min(self.multipliers_max_norm)
                } else {
                    0.0
                };
            }
        }
        Ok(())
    }

    /// Barrier-augmented objective: σf − μ·Σ log(distances to the finite
    /// bounds of the variables and of the constraint values).
    fn barrier_objective(&self, problem: &dyn Problem, iterate: &mut Iterate) -> Result<f64, SolverError> {
        let objective = iterate.evaluate_objective(problem)?;
        iterate.evaluate_constraints(problem)?;

        let mut barrier_terms = 0.0;
        for i in 0..problem.number_variables() {
            let bounds = problem.variable_bounds(i);
            if bounds.lb.is_finite() {
                barrier_terms += (iterate.x[i] - bounds.lb).max(SLACK_FLOOR).ln();
            }
            if bounds.ub.is_finite() {
                barrier_terms += (bounds.ub - iterate.x[i]).max(SLACK_FLOOR).ln();
            }
        }
        for j in 0..problem.number_constraints() {
            let bounds = problem.constraint_bounds(j);
            if !bounds.is_equality() {
                if bounds.lb.is_finite() {
                    barrier_terms += (iterate.constraints[j] - bounds.lb).max(SLACK_FLOOR).ln();
                }
                if bounds.ub.is_finite() {
                    barrier_terms += (bounds.ub - iterate.constraints[j]).max(SLACK_FLOOR).ln();
                }
            }
        }
        Ok(self.objective_multiplier * objective - self.mu * barrier_terms)
    }

    /// Error of the μ-perturbed first-order conditions, used to gate the
    /// barrier decrease.
    fn barrier_error(&self, problem: &dyn Problem, iterate: &mut Iterate) -> Result<f64, SolverError> {
        let multipliers = iterate.multipliers.clone();
        let gradient = iterate.lagrangian_gradient(problem, self.objective_multiplier, &multipliers)?;
        let mut error = norm_inf(&gradient);

        iterate.evaluate_constraints(problem)?;
        error = error.max(problem.constraint_violation(&iterate.constraints, Norm::Linf));

        for i in 0..problem.number_variables() {
            let bounds = problem.variable_bounds(i);
            if bounds.lb.is_finite() {
                error = error
                    .max((multipliers.lower_bounds[i] * (iterate.x[i] - bounds.lb) - self.mu).abs());
            }
            if bounds.ub.is_finite() {
                error = error
                    .max((-multipliers.upper_bounds[i] * (bounds.ub - iterate.x[i]) - self.mu).abs());
            }
        }
        Ok(error)
    }
}

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

impl Subproblem for InteriorPointSubproblem {
    fn initialize(
        &mut self,
        statistics: &mut Statistics,
        problem: &dyn Problem,
        first_iterate: &mut Iterate,
    ) -> Result<(), SolverError> {
        statistics.add_column("barrier param.", DOUBLE_WIDTH);

        // the starting point must be strictly interior to the variable bounds
        for i in 0..problem.number_variables() {
            first_iterate.x[i] = push_inside(first_iterate.x[i], problem.variable_bounds(i));
        }
        first_iterate.invalidate_cache();

        first_iterate.evaluate_objective(problem)?;
        first_iterate.evaluate_constraints(problem)?;
        first_iterate.evaluate_objective_gradient(problem)?;
        first_iterate.evaluate_constraint_jacobian(problem)?;

        // bound duals start at unity on their finite sides
        for i in 0..problem.number_variables() {
            let bounds = problem.variable_bounds(i);
            first_iterate.multipliers.lower_bounds[i] = if bounds.lb.is_finite() { 1.0 } else { 0.0 };
            first_iterate.multipliers.upper_bounds[i] = if bounds.ub.is_finite() { -1.0 } else { 0.0 };
        }
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
        self.reset_slacks(problem, first_iterate)?;
        self.compute_progress_measures(problem, first_iterate)
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

        self.build_objective_model(problem, iterate, objective_multiplier)
    }

    fn build_objective_model(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
        objective_multiplier: f64,
    ) -> Result<(), SolverError> {
        self.objective_multiplier = objective_multiplier;
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
        iterate: &mut Iterate,
    ) -> Result<Direction, SolverError> {
        let n = problem.number_variables();
        let m = problem.number_constraints();
        let mu = self.mu;
        let tau = self.barrier.tau_min.max(1.0 - mu);

        // displacement boxes: d = 0 and the slack displacement t₀ = s − c(x)
        // are strictly interior by construction
        let variable_box = &self.workspace.variables_bounds[..n];
        let constraint_box = &self.workspace.constraints_bounds;
        let t0: Vec<f64> = (0..m).map(|j| self.slacks[j] - iterate.constraints[j]).collect();

        // internal nonnegative bound duals
        let z_lower: Vec<f64> = iterate.multipliers.lower_bounds[..n].to_vec();
        let z_upper: Vec<f64> = iterate.multipliers.upper_bounds[..n].iter().map(|&z| -z).collect();

        // condensed diagonal terms
        let mut sigma_x = vec![0.0; n];
        for i in 0..n {
            let bounds = variable_box[i];
            if bounds.lb.is_finite() {
                sigma_x[i] += z_lower[i] / (-bounds.lb).max(SLACK_FLOOR);
            }
            if bounds.ub.is_finite() {
                sigma_x[i] += z_upper[i] / bounds.ub.max(SLACK_FLOOR);
            }
        }
        let mut sigma_s_inv = vec![0.0; m];
        for j in 0..m {
            let bounds = constraint_box[j];
            if bounds.is_equality() {
                sigma_s_inv[j] = 0.0;
            } else {
                let mut sigma = 0.0;
                if bounds.lb.is_finite() {
                    sigma += self.slack_duals_lower[j] / (t0[j] - bounds.lb).max(SLACK_FLOOR);
                }
                if bounds.ub.is_finite() {
                    sigma += self.slack_duals_upper[j] / (bounds.ub - t0[j]).max(SLACK_FLOOR);
                }
                sigma_s_inv[j] = if sigma <= SLACK_FLOOR { 1e20 } else { 1.0 / sigma };
            }
        }

        // primal-dual right-hand side
        let mut r_hat_d = vec![0.0; n];
        for (i, g) in self.workspace.objective_gradient.iter() {
            if i < n {
                r_hat_d[i] += g;
            }
        }
        for j in 0..m {
            let lambda_j = self.workspace.constraints_multipliers[j];
            if lambda_j != 0.0 {
                for (i, v) in self.workspace.constraints_jacobian[j].iter() {
                    if i < n {
                        r_hat_d[i] -= lambda_j * v;
                    }
                }
            }
        }
        for i in 0..n {
            let bounds = variable_box[i];
            if bounds.lb.is_finite() {
                r_hat_d[i] -= mu / (-bounds.lb).max(SLACK_FLOOR);
            }
            if bounds.ub.is_finite() {
                r_hat_d[i] += mu / bounds.ub.max(SLACK_FLOOR);
            }
        }

        let mut rhs = vec![0.0; n + m];
        for i in 0..n {
            rhs[i] = -r_hat_d[i];
        }
        for j in 0..m {
            let bounds = constraint_box[j];
            let rp_j = -t0[j];
            let mut r_hat_s = self.workspace.constraints_multipliers[j];
            if !bounds.is_equality() {
                if bounds.lb.is_finite() {
                    r_hat_s -= mu / (t0[j] - bounds.lb).max(SLACK_FLOOR);
                }
                if bounds.ub.is_finite() {
                    r_hat_s += mu / (bounds.ub - t0[j]).max(SLACK_FLOOR);
                }
            }
            rhs[n + j] = -rp_j - if bounds.is_equality() { 0.0 } else { sigma_s_inv[j] * r_hat_s };
        }

        // inertia-corrected factorization: target (n, m, 0)
        let mut delta_w = 0.0;
        loop {
            let mut kkt = SymmetricMatrix::with_capacity(
                n + m,
                self.hessian_model.hessian.number_nonzeros()
                    + n
                    + m
                    + self.workspace.constraints_jacobian.iter().map(SparseVector::len).sum::<usize>(),
                false,
            );
            for (row, column, value) in self.hessian_model.hessian.iter() {
                if row < n && column < n {
                    kkt.insert(value, row, column);
                }
            }
            for i in 0..n {
                kkt.insert(sigma_x[i] + delta_w, i, i);
            }
            for j in 0..m {
                for (i, v) in self.workspace.constraints_jacobian[j].iter() {
                    if i < n {
                        kkt.insert(v, n + j, i);
                    }
                }
                kkt.insert(-(sigma_s_inv[j] + DELTA_C), n + j, n + j);
            }

            let inertia_ok = self.ldl.factorize(&kkt).is_ok() && {
                let inertia = self.ldl.inertia();
                inertia.positive == n && inertia.negative == m && inertia.zero == 0
            };
            if inertia_ok {
                break;
            }
            delta_w = if delta_w == 0.0 {
                self.regularization.initial_value
            } else {
                delta_w * self.regularization.increase_factor
            };
            if self.regularization.max_value < delta_w {
                return Err(SolverError::Regularization(format!(
                    "barrier KKT inertia not correctable with perturbation {delta_w:e}"
                )));
            }
        }

        let solution = self.ldl.solve(&rhs)?;
        let delta_d = &solution[..n];
        let delta_lambda: Vec<f64> = solution[n..].iter().map(|&w| -w).collect();
        let delta_t: Vec<f64> = (0..m)
            .map(|j| {
                if constraint_box[j].is_equality() {
                    0.0
                } else {
                    self.workspace.constraints_jacobian[j]
                        .iter()
                        .filter(|&(i, _)| i < n)
                        .map(|(i, v)| v * delta_d[i])
                        .sum::<f64>()
                        - t0[j]
                }
            })
            .collect();

        // dual displacements from the μ-centrality equations
        let mut delta_z_lower = vec![0.0; n];
        let mut delta_z_upper = vec![0.0; n];
        for i in 0..n {
            let bounds = variable_box[i];
            if bounds.lb.is_finite() {
                let slack = (-bounds.lb).max(SLACK_FLOOR);
                delta_z_lower[i] = mu / slack - z_lower[i] - z_lower[i] / slack * delta_d[i];
            }
            if bounds.ub.is_finite() {
                let slack = bounds.ub.max(SLACK_FLOOR);
                delta_z_upper[i] = mu / slack - z_upper[i] + z_upper[i] / slack * delta_d[i];
            }
        }
        let mut delta_z_slack_lower = vec![0.0; m];
        let mut delta_z_slack_upper = vec![0.0; m];
        for j in 0..m {
            let bounds = constraint_box[j];
            if !bounds.is_equality() {
                if bounds.lb.is_finite() {
                    let slack = (t0[j] - bounds.lb).max(SLACK_FLOOR);
                    delta_z_slack_lower[j] =
                        mu / slack - self.slack_duals_lower[j] - self.slack_duals_lower[j] / slack * delta_t[j];
                }
                if bounds.ub.is_finite() {
                    let slack = (bounds.ub - t0[j]).max(SLACK_FLOOR);
                    delta_z_slack_upper[j] =
                        mu / slack - self.slack_duals_upper[j] + self.slack_duals_upper[j] / slack * delta_t[j];
                }
            }
        }

        // primal and dual fraction-to-boundary
        let mut alpha_primal: f64 = 1.0;
        for i in 0..n {
            let bounds = variable_box[i];
            if bounds.lb.is_finite() && delta_d[i] < 0.0 {
                alpha_primal = alpha_primal.min(tau * (-bounds.lb) / -delta_d[i]);
            }
            if bounds.ub.is_finite() && 0.0 < delta_d[i] {
                alpha_primal = alpha_primal.min(tau * bounds.ub / delta_d[i]);
            }
        }
        for j in 0..m {
            let bounds = constraint_box[j];
            if !bounds.is_equality() {
                if bounds.lb.is_finite() && delta_t[j] < 0.0 {
                    alpha_primal = alpha_primal.min(tau * (t0[j] - bounds.lb) / -delta_t[j]);
                }
                if bounds.ub.is_finite() && 0.0 < delta_t[j] {
                    alpha_primal = alpha_primal.min(tau * (bounds.ub - t0[j]) / delta_t[j]);
                }
            }
        }
        let mut alpha_dual: f64 = 1.0;
        let mut cap = |z: f64, dz: f64| {
            if dz < 0.0 && 0.0 < z {
                alpha_dual = alpha_dual.min(tau * z / -dz);
            }
        };
        for i in 0..n {
            cap(z_lower[i], delta_z_lower[i]);
            cap(z_upper[i], delta_z_upper[i]);
        }
        for j in 0..m {
            cap(self.slack_duals_lower[j], delta_z_slack_lower[j]);
            cap(self.slack_duals_upper[j], delta_z_slack_upper[j]);
        }

        // apply the dual step to the internal slack duals right away
        for j in 0..m {
            self.slack_duals_lower[j] += alpha_dual * delta_z_slack_lower[j];
            self.slack_duals_upper[j] += alpha_dual * delta_z_slack_upper[j];
            self.slacks[j] = iterate.constraints[j] + t0[j] + alpha_primal * delta_t[j];
        }

        let mut multipliers = Multipliers::new(n, m);
        for j in 0..m {
            multipliers.constraints[j] =
                self.workspace.constraints_multipliers[j] + alpha_dual * delta_lambda[j];
        }
        for i in 0..n {
            multipliers.lower_bounds[i] = z_lower[i] + alpha_dual * delta_z_lower[i];
            multipliers.upper_bounds[i] = -(z_upper[i] + alpha_dual * delta_z_upper[i]);
        }
        multipliers.enforce_signs();

        // barrier gradient over x, cached for the predicted-reduction model
        self.barrier_gradient = vec![0.0; n];
        for (i, g) in self.workspace.objective_gradient.iter() {
            if i < n {
                self.barrier_gradient[i] += g;
            }
        }
        for i in 0..n {
            let bounds = variable_box[i];
            if bounds.lb.is_finite() {
                self.barrier_gradient[i] -= mu / (-bounds.lb).max(SLACK_FLOOR);
            }
            if bounds.ub.is_finite() {
                self.barrier_gradient[i] += mu / bounds.ub.max(SLACK_FLOOR);
            }
        }
        self.sigma_x_cache = sigma_x.clone();

        let x: Vec<f64> = delta_d.iter().map(|&d| alpha_primal * d).collect();
        let norm = norm_inf(&x);
        let linear_term: f64 = x.iter().zip(&self.barrier_gradient).map(|(d, g)| d * g).sum();
        let quadratic_term = 0.5
            * (self.hessian_model.hessian.quadratic_product(&x, &x, n)
                + x.iter().zip(&self.sigma_x_cache).map(|(d, s)| s * d * d).sum::<f64>());

        self.number_subproblems_solved += 1;
        Ok(Direction {
            objective: linear_term + quadratic_term,
            x,
            multipliers,
            status: crate::direction::SubproblemStatus::Optimal,
            objective_multiplier: self.objective_multiplier,
            norm,
            active_set: ActiveSet::default(),
            constraint_partition: None,
            is_relaxed: false,
        })
    }

    fn compute_second_order_correction(
        &mut self,
        _problem: &dyn Problem,
        _trial_iterate: &mut Iterate,
    ) -> Result<Direction, SolverError> {
        Err(SolverError::NotImplemented("second-order correction"))
    }

    fn generate_predicted_reduction_model(
        &self,
        _problem: &dyn Problem,
        direction: &Direction,
    ) -> PredictedReductionModel {
        let length = direction.x.len().min(self.barrier_gradient.len());
        let linear_term: f64 = direction.x[..length]
            .iter()
            .zip(&self.barrier_gradient[..length])
            .map(|(d, g)| d * g)
            .sum();
        let quadratic_term = 0.5
            * (self
                .hessian_model
                .hessian
                .quadratic_product(&direction.x, &direction.x, length)
                + direction.x[..length]
                    .iter()
                    .zip(&self.sigma_x_cache[..length])
                    .map(|(d, s)| s * d * d)
                    .sum::<f64>());
        PredictedReductionModel::new(-direction.objective, linear_term, quadratic_term)
    }

    fn compute_progress_measures(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), SolverError> {
        let infeasibility = iterate.constraint_violation(problem)?;
        let objective = self.barrier_objective(problem, iterate)?;
        iterate.progress = ProgressMeasures { infeasibility, objective };
        Ok(())
    }

    fn register_accepted_iterate(
        &mut self,
        problem: &dyn Problem,
        iterate: &mut Iterate,
    ) -> Result<(), SolverError> {
        let n = problem.number_variables();

        // σ-truncation keeps the bound duals in the μ-dependent corridor
        let kappa_sigma = self.barrier.kappa_sigma;
        for i in 0..n {
            let bounds = problem.variable_bounds(i);
            if bounds.lb.is_finite() {
                let slack = (iterate.x[i] - bounds.lb).max(SLACK_FLOOR);
                let lower = self.mu / (kappa_sigma * slack);
                let upper = kappa_sigma * self.mu / slack;
                iterate.multipliers.lower_bounds[i] =
                    iterate.multipliers.lower_bounds[i].clamp(lower, upper);
            }
            if bounds.ub.is_finite() {
                let slack = (bounds.ub - iterate.x[i]).max(SLACK_FLOOR);
                let lower = self.mu / (kappa_sigma * slack);
                let upper = kappa_sigma * self.mu / slack;
                iterate.multipliers.upper_bounds[i] =
                    -(-iterate.multipliers.upper_bounds[i]).clamp(lower, upper);
            }
        }

        // re-center the internal slacks at the accepted point
        self.reset_slacks(problem, iterate)?;

        // Fiacco-McCormick barrier decrease once the μ-system is solved well
        // enough
        let error = self.barrier_error(problem, iterate)?;
        if error <= self.barrier.kappa_epsilon * self.mu {
            let mu_next = (self.barrier.tolerance / 10.0)
                .max((self.barrier.kappa_mu * self.mu).min(self.mu.powf(self.barrier.theta_mu)));
            if mu_next < self.mu {
                self.mu = mu_next;
                self.definition_changed = true;
            }
        }
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
