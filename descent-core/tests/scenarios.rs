//! End-to-end scenarios over the reference problems.

mod common;

use common::*;
use descent_core::{solve, Options, TerminationStatus};

fn options_with_preset(preset: &str) -> Options {
    let mut options = Options::default();
    options.apply_preset(preset).unwrap();
    options
}

#[test]
fn hs071_filter_sqp_reaches_the_known_optimum() {
    let mut options = options_with_preset("filtersqp");
    options.set("tolerance", "1e-7");

    let result = solve(&Hs071, &options).unwrap();
    assert_eq!(
        result.status,
        TerminationStatus::FeasibleKktPoint,
        "unexpected status ({:?}): {:?}",
        result.status,
        result.message
    );

    let expected = [1.0, 4.7429994, 3.8211503, 1.3794082];
    for (i, &value) in expected.iter().enumerate() {
        assert!(
            (result.iterate.x[i] - value).abs() < 1e-4,
            "x[{i}] = {} (expected {value})",
            result.iterate.x[i]
        );
    }
    assert!((result.iterate.objective - 17.0140173).abs() < 1e-4);
    // the product constraint is active from below, so its dual is positive
    assert!(0.0 < result.iterate.multipliers.constraints[0]);
}

#[test]
fn hs071_interior_point_preset() {
    let mut options = options_with_preset("ipopt");
    options.set("tolerance", "1e-7");

    let result = solve(&Hs071, &options).unwrap();
    assert!(
        matches!(
            result.status,
            TerminationStatus::FeasibleKktPoint | TerminationStatus::FeasibleSmallStep
        ),
        "unexpected status ({:?}): {:?}",
        result.status,
        result.message
    );

    let expected = [1.0, 4.7429994, 3.8211503, 1.3794082];
    for (i, &value) in expected.iter().enumerate() {
        assert!(
            (result.iterate.x[i] - value).abs() < 1e-3,
            "x[{i}] = {} (expected {value})",
            result.iterate.x[i]
        );
    }
    assert!((result.iterate.objective - 17.0140173).abs() < 1e-3);
}

#[test]
fn hs035_converges_to_the_analytic_solution() {
    let mut options = options_with_preset("filtersqp");
    options.set("tolerance", "1e-7");

    let result = solve(&Hs035, &options).unwrap();
    assert_eq!(
        result.status,
        TerminationStatus::FeasibleKktPoint,
        "unexpected status ({:?}): {:?}",
        result.status,
        result.message
    );

    let expected = [4.0 / 3.0, 7.0 / 9.0, 4.0 / 9.0];
    for (i, &value) in expected.iter().enumerate() {
        assert!(
            (result.iterate.x[i] - value).abs() < 1e-5,
            "x[{i}] = {} (expected {value})",
            result.iterate.x[i]
        );
    }
    assert!((result.iterate.objective - 1.0 / 9.0).abs() < 1e-5);
}

#[test]
fn contradictory_constraints_report_an_infeasible_stationary_point() {
    let mut options = options_with_preset("filtersqp");
    options.set("tolerance", "1e-7");

    let result = solve(&Contradiction, &options).unwrap();
    assert_eq!(
        result.status,
        TerminationStatus::InfeasibleKktPoint,
        "unexpected status ({:?}): {:?}",
        result.status,
        result.message
    );
    // between the two half-lines every point violates the constraints by 2
    assert!((result.iterate.residuals.infeasibility - 2.0).abs() < 1e-6);
    assert!(result.iterate.residuals.feasibility_stationarity < 1e-6);
}

#[test]
fn unbounded_problem_terminates_cleanly_under_line_search() {
    let mut options = options_with_preset("byrd");
    options.set("max_iterations", "15");

    let result = solve(&UnboundedBelow, &options).unwrap();
    // no certificate exists; the driver must still produce a result
    assert_eq!(result.status, TerminationStatus::NotOptimal);
    assert!(result.iterations <= 15);
}

#[test]
fn unbounded_problem_exhausts_trust_region_iterations() {
    let mut options = options_with_preset("filtersqp");
    options.set("max_iterations", "15");

    let result = solve(&UnboundedBelow, &options).unwrap();
    assert_eq!(result.status, TerminationStatus::NotOptimal);
    // every accepted step strictly decreases the objective
    assert!(result.iterate.objective < 0.0);
}

#[test]
fn simple_qp_solves_in_one_step() {
    let mut options = options_with_preset("filtersqp");
    options.set("tolerance", "1e-7");

    let result = solve(&SimpleQp, &options).unwrap();
    assert_eq!(
        result.status,
        TerminationStatus::FeasibleKktPoint,
        "unexpected status ({:?}): {:?}",
        result.status,
        result.message
    );
    assert!(result.iterations <= 2, "took {} iterations", result.iterations);
    assert!((result.iterate.x[0] - 0.5).abs() < 1e-6);
    assert!((result.iterate.x[1] - 0.5).abs() < 1e-6);
    // stationarity x = λ·(1, 1) gives λ = 0.5
    assert!((result.iterate.multipliers.constraints[0] - 0.5).abs() < 1e-5);
}

#[test]
fn penalty_steering_decreases_the_penalty_parameter() {
    let mut options = options_with_preset("byrd");
    // a tight trust region makes the linearized constraint unreachable
    options.set("mechanism", "TR");
    options.set("TR_radius", "1");
    options.set("max_iterations", "30");

    let result = solve(&FarConstraint, &options).unwrap();
    let penalty = result.penalty_parameter.expect("l1 relaxation reports a penalty");
    assert!(
        penalty < 1.0,
        "steering should have decreased the penalty, still at {penalty}"
    );
    // steering never increases the parameter
    assert!(0.0 <= penalty);
}

#[test]
fn hs013_byrd_descends_to_the_constrained_region() {
    let mut options = options_with_preset("byrd");
    options.set("max_iterations", "500");

    let result = solve(&Hs013, &options).unwrap();
    // the optimum (1, 0) violates constraint qualification; the solver must
    // still end up feasible and close in objective
    assert!(
        result.iterate.residuals.infeasibility < 1e-4,
        "infeasibility {}",
        result.iterate.residuals.infeasibility
    );
    assert!(
        result.iterate.objective < 1.5,
        "objective {} too far from f* = 1",
        result.iterate.objective
    );
    let penalty = result.penalty_parameter.expect("l1 relaxation reports a penalty");
    assert!(penalty <= 1.0);
}

#[test]
fn evaluation_counters_are_reported() {
    let options = options_with_preset("filtersqp");
    let result = solve(&SimpleQp, &options).unwrap();
    assert!(0 < result.objective_evaluations);
    assert!(0 < result.constraint_evaluations);
    assert!(0 < result.jacobian_evaluations);
    assert!(0 < result.subproblems_solved);
}

#[test]
fn elastic_variables_never_leak_into_the_iterate() {
    let mut options = options_with_preset("byrd");
    options.set("max_iterations", "50");

    let result = solve(&Hs035, &options).unwrap();
    // the iterate carries scratch sized for the elastics, but the meaningful
    // primal entries are exactly the problem variables
    assert!(result.iterate.x.len() >= 3);
    for &value in &result.iterate.x[..3] {
        assert!(value.is_finite());
    }
    assert!(result.iterate.residuals.infeasibility < 1e-5);
}
