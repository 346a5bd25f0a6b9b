//! Solver driver.
//!
//! Builds the four-ingredient pipeline from the options, runs the outer
//! loop, classifies termination, and reports a [`SolveResult`]. The driver
//! never panics or propagates errors out of the loop: fatal mechanism
//! failures terminate cleanly with the best iterate seen and an explanatory
//! message.

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::SolverError;
use crate::iterate::{EvaluationCounts, Iterate};
use crate::mechanism::{BacktrackingLineSearch, GlobalizationMechanism, TrustRegion};
use crate::options::Options;
use crate::problem::Problem;
use crate::relaxation::{
    ConstraintRelaxation, ElasticVariables, FeasibilityRestoration, L1Relaxation,
    L1RelaxationParameters,
};
use crate::solvers::InteriorQpSolver;
use crate::statistics::{Statistics, DOUBLE_WIDTH, INT_WIDTH};
use crate::strategy::{FilterConstants, FilterStrategy, GlobalizationStrategy, L1MeritStrategy};
use crate::subproblem::hessian::HessianModelKind;
use crate::subproblem::interior_point::{
    BarrierParameters, InteriorPointSubproblem, RegularizationParameters,
};
use crate::subproblem::lp::LpSubproblem;
use crate::subproblem::qp::QpSubproblem;
use crate::subproblem::{SecondOrderCorrection, Subproblem};

/// Classification of the final iterate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStatus {
    /// No optimality certificate
    NotOptimal,
    /// Feasible KKT point (positive objective multiplier)
    FeasibleKktPoint,
    /// Feasible Fritz-John point (constraint qualification failure)
    FjPoint,
    /// Stationary point of the constraint violation, primal infeasible
    InfeasibleKktPoint,
    /// Step collapsed while primal feasible
    FeasibleSmallStep,
    /// Step collapsed while primal infeasible
    InfeasibleSmallStep,
}

impl fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TerminationStatus::NotOptimal => "not optimal",
            TerminationStatus::FeasibleKktPoint => "feasible KKT point",
            TerminationStatus::FjPoint => "Fritz-John point",
            TerminationStatus::InfeasibleKktPoint => "infeasible stationary point",
            TerminationStatus::FeasibleSmallStep => "feasible small step",
            TerminationStatus::InfeasibleSmallStep => "infeasible small step",
        };
        write!(f, "{text}")
    }
}

/// Outcome of a solve.
pub struct SolveResult {
    /// Final status
    pub status: TerminationStatus,
    /// Best iterate found
    pub iterate: Iterate,
    /// Outer iterations performed
    pub iterations: usize,
    /// Wall time of the solve
    pub cpu_time: Duration,
    /// Objective evaluations during this solve
    pub objective_evaluations: usize,
    /// Constraint evaluations during this solve
    pub constraint_evaluations: usize,
    /// Jacobian evaluations during this solve
    pub jacobian_evaluations: usize,
    /// Hessian evaluations during this solve
    pub hessian_evaluations: usize,
    /// Backend subproblem solves during this solve
    pub subproblems_solved: usize,
    /// Final penalty parameter, for penalty-based relaxations
    pub penalty_parameter: Option<f64>,
    /// Diagnostic message when the mechanism failed
    pub message: Option<String>,
}

/// Outer solver loop over a configured mechanism.
pub struct NlpSolver {
    mechanism: Box<dyn GlobalizationMechanism>,
    tolerance: f64,
    max_iterations: usize,
    small_step_factor: f64,
    max_number_variables: usize,
    verbose: bool,
}

impl NlpSolver {
    /// Build the four-ingredient pipeline from the options.
    pub fn from_options(problem: &dyn Problem, options: &Options) -> Result<Self, SolverError> {
        let mechanism = build_mechanism(problem, options)?;
        let uses_elastics = options.get_str("constraint-relaxation")? == "l1-relaxation";
        let max_number_variables = problem.number_variables()
            + if uses_elastics { ElasticVariables::count(problem) } else { 0 };
        Ok(NlpSolver {
            mechanism,
            tolerance: options.get_f64("tolerance")?,
            max_iterations: options.get_usize("max_iterations")?,
            small_step_factor: options.get_f64("small_step_factor")?,
            max_number_variables,
            verbose: options.get_bool("verbose")?,
        })
    }

    /// Run the solver from the given starting point.
    pub fn solve(
        &mut self,
        problem: &dyn Problem,
        initial_primal: Vec<f64>,
        initial_dual: Vec<f64>,
    ) -> SolveResult {
        let timer = Instant::now();
        let counts_before = EvaluationCounts::snapshot();

        let mut statistics = Statistics::new(self.verbose);
        statistics.add_column("major", INT_WIDTH);
        statistics.add_column("step norm", DOUBLE_WIDTH);
        statistics.add_column("objective", DOUBLE_WIDTH);
        if problem.is_constrained() {
            statistics.add_column("primal infeas.", DOUBLE_WIDTH);
        }
        statistics.add_column("complementarity", DOUBLE_WIDTH);
        statistics.add_column("stationarity", DOUBLE_WIDTH);

        let mut current_iterate = Iterate::new(
            initial_primal,
            self.max_number_variables,
            problem.number_constraints(),
        );
        let length = initial_dual.len().min(current_iterate.multipliers.constraints.len());
        current_iterate.multipliers.constraints[..length].copy_from_slice(&initial_dual[..length]);

        let mut message = None;
        if let Err(error) = self
            .mechanism
            .initialize(&mut statistics, problem, &mut current_iterate)
        {
            return self.assemble_result(
                problem,
                current_iterate,
                TerminationStatus::NotOptimal,
                0,
                timer.elapsed(),
                &counts_before,
                Some(error.to_string()),
            );
        }

        let mut status = self.check_termination(problem, &current_iterate, f64::INFINITY);
        let mut major_iterations = 0;

        while status == TerminationStatus::NotOptimal && major_iterations < self.max_iterations {
            statistics.new_line();
            major_iterations += 1;

            match self
                .mechanism
                .compute_acceptable_iterate(&mut statistics, problem, &mut current_iterate)
            {
                Ok((new_iterate, step_norm)) => {
                    status = self.check_termination(problem, &new_iterate, step_norm);
                    statistics.add_integer("major", major_iterations);
                    statistics.add_double("step norm", step_norm);
                    if new_iterate.is_objective_computed {
                        statistics.add_double("objective", new_iterate.objective);
                    }
                    if problem.is_constrained() {
                        statistics.add_double("primal infeas.", new_iterate.residuals.infeasibility);
                    }
                    statistics.add_double(
                        "complementarity",
                        new_iterate
                            .residuals
                            .optimality_complementarity
                            .min(new_iterate.residuals.feasibility_complementarity),
                    );
                    statistics.add_double(
                        "stationarity",
                        new_iterate
                            .residuals
                            .optimality_stationarity
                            .min(new_iterate.residuals.feasibility_stationarity),
                    );
                    statistics.print_current_line();
                    current_iterate = new_iterate;
                }
                Err(error) => {
                    message = Some(error.to_string());
                    break;
                }
            }
        }

        self.assemble_result(
            problem,
            current_iterate,
            status,
            major_iterations,
            timer.elapsed(),
            &counts_before,
            message,
        )
    }

    fn assemble_result(
        &self,
        problem: &dyn Problem,
        mut iterate: Iterate,
        status: TerminationStatus,
        iterations: usize,
        cpu_time: Duration,
        counts_before: &EvaluationCounts,
        message: Option<String>,
    ) -> SolveResult {
        // make sure the reported objective is evaluated
        let _ = iterate.evaluate_objective(problem);
        let counts = EvaluationCounts::snapshot().since(counts_before);
        SolveResult {
            status,
            iterate,
            iterations,
            cpu_time,
            objective_evaluations: counts.objective,
            constraint_evaluations: counts.constraints,
            jacobian_evaluations: counts.jacobian,
            hessian_evaluations: self.mechanism.hessian_evaluation_count(),
            subproblems_solved: self.mechanism.number_subproblems_solved(),
            penalty_parameter: self.mechanism.penalty_parameter(),
            message,
        }
    }

    /// Classify the iterate against the first-order conditions.
    fn check_termination(
        &self,
        problem: &dyn Problem,
        iterate: &Iterate,
        step_norm: f64,
    ) -> TerminationStatus {
        let residuals = &iterate.residuals;
        let optimality_stationarity =
            residuals.optimality_stationarity / residuals.stationarity_scaling <= self.tolerance;
        let feasibility_stationarity =
            residuals.feasibility_stationarity / residuals.stationarity_scaling <= self.tolerance;
        let optimality_complementarity =
            residuals.optimality_complementarity / residuals.complementarity_scaling <= self.tolerance;
        let feasibility_complementarity =
            residuals.feasibility_complementarity / residuals.complementarity_scaling <= self.tolerance;
        let primal_feasibility = residuals.infeasibility <= self.tolerance;
        let no_trivial_duals = iterate
            .multipliers
            .not_all_zero(problem.number_variables(), self.tolerance);

        if optimality_complementarity && primal_feasibility {
            if feasibility_stationarity && no_trivial_duals && iterate.multipliers.objective <= 0.0 {
                // feasible stationary point with a vanishing objective
                // multiplier: constraint qualification failure
                return TerminationStatus::FjPoint;
            }
            if 0.0 < iterate.multipliers.objective && optimality_stationarity {
                return TerminationStatus::FeasibleKktPoint;
            }
        } else if feasibility_complementarity && feasibility_stationarity && !primal_feasibility {
            return TerminationStatus::InfeasibleKktPoint;
        }
        if step_norm <= self.tolerance / self.small_step_factor {
            return if primal_feasibility {
                TerminationStatus::FeasibleSmallStep
            } else {
                TerminationStatus::InfeasibleSmallStep
            };
        }
        TerminationStatus::NotOptimal
    }
}

/// Convenience entry point: build the pipeline and solve from the model's
/// starting point.
pub fn solve(problem: &dyn Problem, options: &Options) -> Result<SolveResult, SolverError> {
    let mut solver = NlpSolver::from_options(problem, options)?;
    Ok(solver.solve(problem, problem.initial_primal(), problem.initial_dual()))
}

fn build_strategy(options: &Options) -> Result<Box<dyn GlobalizationStrategy>, SolverError> {
    match options.get_str("strategy")? {
        "filter" => {
            let constants = FilterConstants {
                beta: options.get_f64("filter_Beta")?,
                gamma: options.get_f64("filter_Gamma")?,
                ubd: options.get_f64("filter_ubd")?,
                fact: options.get_f64("filter_fact")?,
                switching_delta: options.get_f64("filter_switching_delta")?,
                s_theta: options.get_f64("filter_s_theta")?,
                armijo_fraction: options.get_f64("armijo_decrease_fraction")?,
                capacity: options.get_usize("filter_capacity")?,
            };
            Ok(Box::new(FilterStrategy::new(constants)))
        }
        "l1-penalty" => Ok(Box::new(L1MeritStrategy::new(
            options.get_f64("armijo_decrease_fraction")?,
        ))),
        other => Err(SolverError::InvalidOption(format!("unknown strategy '{other}'"))),
    }
}

fn build_subproblem(
    problem: &dyn Problem,
    options: &Options,
    max_number_variables: usize,
) -> Result<Box<dyn Subproblem>, SolverError> {
    let hessian_model_kind = HessianModelKind::from_option(options.get_str("hessian_model")?)?;
    let multipliers_max_norm = options.get_f64("multipliers_max_norm")?;
    let use_trust_region = options.get_str("mechanism")? == "TR";
    let qp_solver = Box::new(InteriorQpSolver::new(
        options.get_f64("qp_tolerance")?,
        options.get_usize("qp_max_iterations")?,
    ));

    match options.get_str("subproblem")? {
        "QP" => Ok(Box::new(QpSubproblem::new(
            problem,
            max_number_variables,
            qp_solver,
            hessian_model_kind,
            // without a trust region the model must stay bounded below
            !use_trust_region,
            multipliers_max_norm,
        ))),
        "LP" => Ok(Box::new(LpSubproblem::new(
            problem,
            max_number_variables,
            qp_solver,
            multipliers_max_norm,
        ))),
        "primal_dual_interior_point" | "IPM" => {
            let barrier = BarrierParameters {
                initial: options.get_f64("barrier_initial_parameter")?,
                kappa_mu: options.get_f64("barrier_kappa_mu")?,
                theta_mu: options.get_f64("barrier_theta_mu")?,
                kappa_epsilon: options.get_f64("barrier_kappa_epsilon")?,
                kappa_sigma: options.get_f64("barrier_kappa_sigma")?,
                tau_min: options.get_f64("barrier_tau_min")?,
                tolerance: options.get_f64("tolerance")?,
            };
            let regularization = RegularizationParameters {
                initial_value: options.get_f64("regularization_initial_value")?,
                increase_factor: options.get_f64("regularization_increase_factor")?,
                max_value: options.get_f64("regularization_max_value")?,
            };
            Ok(Box::new(InteriorPointSubproblem::new(
                problem,
                max_number_variables,
                hessian_model_kind,
                barrier,
                regularization,
                multipliers_max_norm,
            )))
        }
        other => Err(SolverError::InvalidOption(format!("unknown subproblem '{other}'"))),
    }
}

fn build_relaxation(
    problem: &dyn Problem,
    options: &Options,
) -> Result<Box<dyn ConstraintRelaxation>, SolverError> {
    match options.get_str("constraint-relaxation")? {
        "feasibility-restoration" => {
            let subproblem = build_subproblem(problem, options, problem.number_variables())?;
            Ok(Box::new(FeasibilityRestoration::new(
                subproblem,
                build_strategy(options)?,
                build_strategy(options)?,
            )))
        }
        "l1-relaxation" => {
            let max_number_variables =
                problem.number_variables() + ElasticVariables::count(problem);
            let subproblem = build_subproblem(problem, options, max_number_variables)?;
            let parameters = L1RelaxationParameters {
                initial_parameter: options.get_f64("l1_relaxation_initial_parameter")?,
                epsilon1: options.get_f64("l1_relaxation_epsilon1")?,
                epsilon2: options.get_f64("l1_relaxation_epsilon2")?,
                decrease_factor: options.get_f64("l1_relaxation_decrease_factor")?,
            };
            Ok(Box::new(L1Relaxation::new(
                problem,
                subproblem,
                build_strategy(options)?,
                parameters,
            )))
        }
        other => Err(SolverError::InvalidOption(format!(
            "unknown constraint-relaxation '{other}'"
        ))),
    }
}

fn build_mechanism(
    problem: &dyn Problem,
    options: &Options,
) -> Result<Box<dyn GlobalizationMechanism>, SolverError> {
    let relaxation = build_relaxation(problem, options)?;
    match options.get_str("mechanism")? {
        "TR" => Ok(Box::new(TrustRegion::new(
            relaxation,
            options.get_f64("TR_radius")?,
            options.get_f64("TR_activity_tolerance")?,
            options.get_f64("TR_min_radius")?,
            options.get_usize("TR_max_inner_iterations")?,
        ))),
        "LS" => {
            let soc_strategy = match options.get_str("soc")? {
                "none" => SecondOrderCorrection::None,
                "on_rejection" => SecondOrderCorrection::OnRejection,
                "on_acceptance" => SecondOrderCorrection::OnAcceptance,
                other => {
                    return Err(SolverError::InvalidOption(format!("unknown soc mode '{other}'")));
                }
            };
            Ok(Box::new(BacktrackingLineSearch::new(
                relaxation,
                options.get_f64("LS_backtracking_ratio")?,
                options.get_f64("LS_step_tolerance")?,
                options.get_usize("LS_max_backtracks")?,
                soc_strategy,
            )))
        }
        other => Err(SolverError::InvalidOption(format!("unknown mechanism '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterate::Residuals;
    use crate::linalg::sparse_vector::SparseVector;
    use crate::linalg::symmetric::SymmetricMatrix;
    use crate::problem::Range;

    struct Trivial;

    impl Problem for Trivial {
        fn name(&self) -> &str {
            "trivial"
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
            x[0] * x[0]
        }
        fn evaluate_constraints(&self, _x: &[f64], _constraints: &mut [f64]) {}
        fn evaluate_objective_gradient(&self, x: &[f64], gradient: &mut SparseVector) {
            gradient.insert(0, 2.0 * x[0]);
        }
        fn evaluate_constraint_jacobian(&self, _x: &[f64], _jacobian: &mut [SparseVector]) {}
        fn evaluate_lagrangian_hessian(
            &self,
            _x: &[f64],
            objective_multiplier: f64,
            _multipliers: &[f64],
            hessian: &mut SymmetricMatrix,
        ) {
            hessian.insert(2.0 * objective_multiplier, 0, 0);
        }
    }

    fn solver() -> NlpSolver {
        NlpSolver::from_options(&Trivial, &Options::default()).unwrap()
    }

    fn iterate_with_residuals(residuals: Residuals, objective_multiplier: f64) -> Iterate {
        let mut iterate = Iterate::new(vec![0.0], 1, 0);
        iterate.residuals = residuals;
        iterate.multipliers.objective = objective_multiplier;
        iterate
    }

    #[test]
    fn kkt_point_classification() {
        let solver = solver();
        let residuals = Residuals {
            infeasibility: 0.0,
            optimality_stationarity: 1e-12,
            feasibility_stationarity: 1.0,
            optimality_complementarity: 1e-12,
            feasibility_complementarity: 1e-12,
            stationarity_scaling: 1.0,
            complementarity_scaling: 1.0,
        };
        let iterate = iterate_with_residuals(residuals, 1.0);
        assert_eq!(
            solver.check_termination(&Trivial, &iterate, 1.0),
            TerminationStatus::FeasibleKktPoint
        );
    }

    #[test]
    fn infeasible_stationary_classification() {
        let solver = solver();
        let residuals = Residuals {
            infeasibility: 2.0,
            optimality_stationarity: 1.0,
            feasibility_stationarity: 1e-12,
            optimality_complementarity: 1.0,
            feasibility_complementarity: 1e-12,
            stationarity_scaling: 1.0,
            complementarity_scaling: 1.0,
        };
        let iterate = iterate_with_residuals(residuals, 0.0);
        assert_eq!(
            solver.check_termination(&Trivial, &iterate, 1.0),
            TerminationStatus::InfeasibleKktPoint
        );
    }

    #[test]
    fn small_step_classification() {
        let solver = solver();
        let residuals = Residuals {
            infeasibility: 0.0,
            optimality_stationarity: 1.0,
            feasibility_stationarity: 1.0,
            optimality_complementarity: 1.0,
            feasibility_complementarity: 1.0,
            stationarity_scaling: 1.0,
            complementarity_scaling: 1.0,
        };
        let iterate = iterate_with_residuals(residuals, 1.0);
        assert_eq!(
            solver.check_termination(&Trivial, &iterate, 1e-15),
            TerminationStatus::FeasibleSmallStep
        );
        assert_eq!(
            solver.check_termination(&Trivial, &iterate, 1.0),
            TerminationStatus::NotOptimal
        );
    }

    #[test]
    fn unknown_ingredients_are_rejected() {
        let mut options = Options::default();
        options.set("mechanism", "simulated-annealing");
        assert!(NlpSolver::from_options(&Trivial, &options).is_err());
    }
}
