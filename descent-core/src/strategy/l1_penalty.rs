//! l1 merit strategy.
//!
//! Accepts a trial iterate when the merit function `μ·φ + θ` (penalized
//! objective plus infeasibility) achieves an Armijo fraction of the
//! predicted reduction. No filter is carried.

use crate::iterate::{Iterate, ProgressMeasures};
use crate::strategy::GlobalizationStrategy;

/// Armijo acceptance on the l1 merit function.
pub struct L1MeritStrategy {
    armijo_fraction: f64,
}

impl L1MeritStrategy {
    /// New strategy with the given sufficient-decrease fraction.
    pub fn new(armijo_fraction: f64) -> Self {
        L1MeritStrategy { armijo_fraction }
    }
}

impl GlobalizationStrategy for L1MeritStrategy {
    fn initialize(&mut self, _first_iterate: &Iterate) {}

    fn check_acceptance(
        &mut self,
        current_progress: &ProgressMeasures,
        trial_progress: &ProgressMeasures,
        objective_multiplier: f64,
        predicted_reduction: f64,
    ) -> bool {
        let current_merit =
            objective_multiplier * current_progress.objective + current_progress.infeasibility;
        let trial_merit =
            objective_multiplier * trial_progress.objective + trial_progress.infeasibility;
        let actual_reduction = current_merit - trial_merit;

        // machine-precision allowance so exact stationary points pass
        let tolerance = 1e-15 * (1.0 + current_merit.abs());
        self.armijo_fraction * predicted_reduction.max(0.0) <= actual_reduction + tolerance
    }

    fn notify(&mut self, _iterate: &Iterate) {}

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merit_decrease_is_accepted() {
        let mut strategy = L1MeritStrategy::new(1e-4);
        let current = ProgressMeasures { infeasibility: 2.0, objective: 5.0 };
        let trial = ProgressMeasures { infeasibility: 1.0, objective: 5.0 };
        // merit drops from 7 to 6 with predicted reduction 1
        assert!(strategy.check_acceptance(&current, &trial, 1.0, 1.0));
    }

    #[test]
    fn merit_increase_is_rejected() {
        let mut strategy = L1MeritStrategy::new(1e-4);
        let current = ProgressMeasures { infeasibility: 0.0, objective: 5.0 };
        let trial = ProgressMeasures { infeasibility: 0.5, objective: 5.0 };
        assert!(!strategy.check_acceptance(&current, &trial, 1.0, 1.0));
    }

    #[test]
    fn penalty_weight_scales_the_objective() {
        let mut strategy = L1MeritStrategy::new(0.5);
        let current = ProgressMeasures { infeasibility: 1.0, objective: 0.0 };
        // objective worsens a lot but μ is tiny and feasibility improves
        let trial = ProgressMeasures { infeasibility: 0.0, objective: 50.0 };
        assert!(strategy.check_acceptance(&current, &trial, 1e-4, 1.0));
        // with μ = 1 the same trial is rejected
        assert!(!strategy.check_acceptance(&current, &trial, 1.0, 1.0));
    }
}
