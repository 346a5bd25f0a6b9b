//! Globalization strategies.
//!
//! A strategy decides whether a trial iterate is acceptable given the
//! current and trial progress measures, the objective multiplier of the
//! direction, and the predicted reduction of the local model.

pub mod filter;
pub mod l1_penalty;

use crate::iterate::{Iterate, ProgressMeasures};

pub use filter::{Filter, FilterConstants, FilterStrategy};
pub use l1_penalty::L1MeritStrategy;

/// Accepts or rejects trial iterates.
pub trait GlobalizationStrategy {
    /// Record the starting point (sets envelopes).
    fn initialize(&mut self, first_iterate: &Iterate);

    /// Whether the trial point is acceptable.
    fn check_acceptance(
        &mut self,
        current_progress: &ProgressMeasures,
        trial_progress: &ProgressMeasures,
        objective_multiplier: f64,
        predicted_reduction: f64,
    ) -> bool;

    /// Record an iterate unconditionally (used across phase switches to
    /// prevent cycling).
    fn notify(&mut self, iterate: &Iterate);

    /// Clear all history (phase switch or penalty update).
    fn reset(&mut self);
}
