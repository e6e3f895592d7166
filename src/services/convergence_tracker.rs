//! Stop-condition tracking for the generational loop.

use crate::domain::models::{OptimizationConfig, StopReason};

/// Below this magnitude the previous best is treated as zero and the
/// improvement is measured absolutely.
const RELATIVE_EPSILON: f64 = 1e-9;

/// Fractional improvement from `previous` to `current`.
pub fn relative_improvement(previous: f64, current: f64) -> f64 {
    let delta = current - previous;
    if previous.abs() < RELATIVE_EPSILON {
        delta
    } else {
        delta / previous.abs()
    }
}

/// Watches best-fitness values one generation at a time.
#[derive(Debug, Clone)]
pub struct ConvergenceTracker {
    generation_limit: usize,
    threshold: f64,
    patience: usize,
    previous_best: Option<f64>,
    stale_streak: usize,
}

impl ConvergenceTracker {
    pub fn new(config: &OptimizationConfig) -> Self {
        Self {
            generation_limit: config.effective_generations(),
            threshold: config.convergence_threshold,
            patience: config.convergence_patience.max(1),
            previous_best: None,
            stale_streak: 0,
        }
    }

    /// Replay a whole best-fitness history and report the resulting stop reason.
    pub fn evaluate_history(config: &OptimizationConfig, history: &[f64]) -> Option<StopReason> {
        let mut tracker = Self::new(config);
        history
            .iter()
            .enumerate()
            .fold(None, |_, (index, best)| tracker.observe(index, *best))
    }

    /// Record the best fitness of generation `index`.
    ///
    /// The generation limit takes precedence over convergence when both hold.
    pub fn observe(&mut self, index: usize, best_fitness: f64) -> Option<StopReason> {
        if let Some(previous) = self.previous_best {
            if relative_improvement(previous, best_fitness) < self.threshold {
                self.stale_streak += 1;
            } else {
                self.stale_streak = 0;
            }
        }
        self.previous_best = Some(best_fitness);

        if index >= self.generation_limit {
            Some(StopReason::GenerationLimit)
        } else if self.stale_streak >= self.patience {
            Some(StopReason::Converged)
        } else {
            None
        }
    }

    pub const fn stale_streak(&self) -> usize {
        self.stale_streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(generations: usize, threshold: f64, patience: usize) -> OptimizationConfig {
        OptimizationConfig {
            generations,
            convergence_threshold: threshold,
            convergence_patience: patience,
            ..Default::default()
        }
    }

    #[test]
    fn test_generation_limit_after_requested_generations() {
        let config = config(3, 0.0, 1);
        assert_eq!(ConvergenceTracker::evaluate_history(&config, &[0.1, 0.2, 0.3]), None);
        assert_eq!(
            ConvergenceTracker::evaluate_history(&config, &[0.1, 0.2, 0.3, 0.4]),
            Some(StopReason::GenerationLimit)
        );
    }

    #[test]
    fn test_max_iterations_caps_generations() {
        let config = OptimizationConfig {
            generations: 10,
            max_iterations: 1,
            convergence_threshold: 0.0,
            ..Default::default()
        };
        assert_eq!(
            ConvergenceTracker::evaluate_history(&config, &[0.1, 0.2]),
            Some(StopReason::GenerationLimit)
        );
    }

    #[test]
    fn test_plateau_converges_with_single_generation_patience() {
        let config = config(10, 0.05, 1);
        let mut tracker = ConvergenceTracker::new(&config);

        assert_eq!(tracker.observe(0, 0.50), None);
        assert_eq!(tracker.observe(1, 0.60), None);
        assert_eq!(tracker.observe(2, 0.61), Some(StopReason::Converged));
    }

    #[test]
    fn test_patience_window_resets_on_improvement() {
        let config = config(10, 0.05, 2);
        let mut tracker = ConvergenceTracker::new(&config);

        assert_eq!(tracker.observe(0, 1.0), None);
        assert_eq!(tracker.observe(1, 1.0), None);
        assert_eq!(tracker.stale_streak(), 1);
        assert_eq!(tracker.observe(2, 2.0), None);
        assert_eq!(tracker.stale_streak(), 0);
        assert_eq!(tracker.observe(3, 2.0), None);
        assert_eq!(tracker.observe(4, 2.0), Some(StopReason::Converged));
    }

    #[test]
    fn test_zero_threshold_never_converges_on_flat_history() {
        let config = config(5, 0.0, 1);
        assert_eq!(
            ConvergenceTracker::evaluate_history(&config, &[0.4, 0.4, 0.4]),
            None
        );
    }

    #[test]
    fn test_relative_improvement_falls_back_to_absolute_near_zero() {
        assert!((relative_improvement(0.0, 0.3) - 0.3).abs() < f64::EPSILON);
        assert!((relative_improvement(2.0, 3.0) - 0.5).abs() < f64::EPSILON);
        assert!(relative_improvement(-2.0, -1.0) > 0.0);
    }
}
