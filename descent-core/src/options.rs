//! Solver configuration.
//!
//! Options are a string→string map with typed accessors. Presets select
//! canonical ingredient combinations; individual keys can then be
//! overridden. Every recognized key has a default, so components can read
//! unconditionally.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::SolverError;

/// String-keyed option map.
#[derive(Debug, Clone)]
pub struct Options {
    entries: BTreeMap<String, String>,
}

impl Default for Options {
    fn default() -> Self {
        let mut options = Options { entries: BTreeMap::new() };
        for (key, value) in DEFAULTS {
            options.set(key, value);
        }
        options
    }
}

/// Default option table.
const DEFAULTS: &[(&str, &str)] = &[
    // ingredient selection
    ("mechanism", "TR"),
    ("constraint-relaxation", "feasibility-restoration"),
    ("strategy", "filter"),
    ("subproblem", "QP"),
    ("hessian_model", "exact"),
    ("soc", "none"),
    // termination
    ("tolerance", "1e-8"),
    ("max_iterations", "500"),
    ("small_step_factor", "100"),
    // trust region
    ("TR_radius", "10"),
    ("TR_activity_tolerance", "1e-6"),
    ("TR_min_radius", "1e-16"),
    ("TR_max_inner_iterations", "60"),
    // line search
    ("LS_backtracking_ratio", "0.5"),
    ("LS_max_backtracks", "30"),
    ("LS_step_tolerance", "1e-12"),
    // filter
    ("filter_Beta", "0.999"),
    ("filter_Gamma", "0.001"),
    ("filter_ubd", "1e2"),
    ("filter_fact", "1.25"),
    ("filter_switching_delta", "0.999"),
    ("filter_s_theta", "2"),
    ("filter_capacity", "50"),
    // Armijo
    ("armijo_decrease_fraction", "1e-4"),
    // l1 relaxation
    ("l1_relaxation_initial_parameter", "1"),
    ("l1_relaxation_epsilon1", "0.1"),
    ("l1_relaxation_epsilon2", "0.1"),
    ("l1_relaxation_decrease_factor", "10"),
    // multiplier estimation
    ("multipliers_max_norm", "1e3"),
    // interior point
    ("barrier_initial_parameter", "0.1"),
    ("barrier_kappa_mu", "0.2"),
    ("barrier_theta_mu", "1.5"),
    ("barrier_kappa_epsilon", "10"),
    ("barrier_kappa_sigma", "1e10"),
    ("barrier_tau_min", "0.99"),
    ("regularization_initial_value", "1e-4"),
    ("regularization_increase_factor", "8"),
    ("regularization_max_value", "1e40"),
    // QP backend
    ("qp_tolerance", "1e-9"),
    ("qp_max_iterations", "200"),
    // reporting
    ("verbose", "false"),
];

impl Options {
    /// Set a key (any key is accepted; unknown keys are inert).
    pub fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    /// Raw string value.
    pub fn get_str(&self, key: &str) -> Result<&str, SolverError> {
        self.entries
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| SolverError::InvalidOption(format!("unknown option '{key}'")))
    }

    /// Floating-point value.
    pub fn get_f64(&self, key: &str) -> Result<f64, SolverError> {
        let raw = self.get_str(key)?;
        raw.parse::<f64>()
            .map_err(|_| SolverError::InvalidOption(format!("option '{key}' = '{raw}' is not a number")))
    }

    /// Unsigned integer value.
    pub fn get_usize(&self, key: &str) -> Result<usize, SolverError> {
        let raw = self.get_str(key)?;
        raw.parse::<usize>()
            .map_err(|_| SolverError::InvalidOption(format!("option '{key}' = '{raw}' is not an integer")))
    }

    /// Boolean value ("true"/"false"/"1"/"0").
    pub fn get_bool(&self, key: &str) -> Result<bool, SolverError> {
        match self.get_str(key)? {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            raw => Err(SolverError::InvalidOption(format!(
                "option '{key}' = '{raw}' is not a boolean"
            ))),
        }
    }

    /// Apply a named preset (shortcuts for state-of-the-art combinations).
    pub fn apply_preset(&mut self, preset: &str) -> Result<(), SolverError> {
        match preset {
            "ipopt" => {
                self.set("mechanism", "LS");
                self.set("constraint-relaxation", "feasibility-restoration");
                self.set("strategy", "filter");
                self.set("subproblem", "primal_dual_interior_point");
                self.set("filter_Beta", "0.99999");
                self.set("filter_Gamma", "1e-5");
                self.set("armijo_decrease_fraction", "1e-4");
                self.set("LS_backtracking_ratio", "0.5");
            }
            "filtersqp" => {
                self.set("mechanism", "TR");
                self.set("constraint-relaxation", "feasibility-restoration");
                self.set("strategy", "filter");
                self.set("subproblem", "QP");
            }
            "byrd" => {
                self.set("mechanism", "LS");
                self.set("constraint-relaxation", "l1-relaxation");
                self.set("strategy", "l1-penalty");
                self.set("subproblem", "QP");
                self.set("l1_relaxation_initial_parameter", "1");
                self.set("LS_backtracking_ratio", "0.5");
                self.set("armijo_decrease_fraction", "1e-8");
                self.set("l1_relaxation_epsilon1", "0.1");
                self.set("l1_relaxation_epsilon2", "0.1");
                self.set("tolerance", "1e-6");
            }
            _ => {
                return Err(SolverError::InvalidOption(format!("unknown preset '{preset}'")));
            }
        }
        Ok(())
    }

    /// Iterate over all (key, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.iter() {
            writeln!(f, "{key} = {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_readable() {
        let options = Options::default();
        assert_eq!(options.get_str("mechanism").unwrap(), "TR");
        assert_eq!(options.get_f64("TR_radius").unwrap(), 10.0);
        assert_eq!(options.get_usize("max_iterations").unwrap(), 500);
        assert!(!options.get_bool("verbose").unwrap());
    }

    #[test]
    fn preset_overrides_and_survives_user_overrides() {
        let mut options = Options::default();
        options.apply_preset("byrd").unwrap();
        assert_eq!(options.get_str("strategy").unwrap(), "l1-penalty");
        assert_eq!(options.get_f64("tolerance").unwrap(), 1e-6);

        options.set("tolerance", "1e-7");
        assert_eq!(options.get_f64("tolerance").unwrap(), 1e-7);
    }

    #[test]
    fn bad_values_error_at_read_time() {
        let mut options = Options::default();
        options.set("tolerance", "NaN-ish");
        assert!(options.get_f64("tolerance").is_err());
        assert!(options.get_str("no_such_key").is_err());
        assert!(options.apply_preset("sqpmax").is_err());
    }
}
