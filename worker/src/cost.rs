//! Compute cost accounting (§5, grounded on `ComputeConfig` /
//! `_update_compute_cost` in `enhanced_document_processor.py`): `cost_per_hour`
//! dollars accrue against wall-clock time, and the orchestrator checks the
//! running total against `max_budget` after every batch.
//!
//! The original recomputes cost from the *full* elapsed time since the
//! processor started on every call and adds the result to a running total,
//! which double-counts on every repeated call. This accrues only the time
//! elapsed since the previous call, which is the total the original was
//! presumably trying to track.

use std::sync::Mutex;
use std::time::Instant;

pub struct CostTracker {
    cost_per_hour: f64,
    max_budget: f64,
    last_update: Mutex<Instant>,
    total_cost: Mutex<f64>,
}

impl CostTracker {
    pub fn new(cost_per_hour: f64, max_budget: f64) -> Self {
        Self { cost_per_hour, max_budget, last_update: Mutex::new(Instant::now()), total_cost: Mutex::new(0.0) }
    }

    /// Accrues cost for the time elapsed since the previous call (or
    /// construction) and returns the new running total.
    pub fn accrue(&self) -> f64 {
        let mut last = self.last_update.lock().expect("cost tracker mutex poisoned");
        let elapsed_hours = last.elapsed().as_secs_f64() / 3600.0;
        *last = Instant::now();
        let mut total = self.total_cost.lock().expect("cost tracker mutex poisoned");
        *total += self.cost_per_hour * elapsed_hours;
        *total
    }

    pub fn total(&self) -> f64 {
        *self.total_cost.lock().expect("cost tracker mutex poisoned")
    }

    pub fn budget_exceeded(&self) -> bool {
        self.total() >= self.max_budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn accrues_cost_proportional_to_elapsed_time() {
        let tracker = CostTracker::new(3600.0, f64::INFINITY); // $1/sec for easy math
        sleep(Duration::from_millis(50));
        let total = tracker.accrue();
        assert!(total > 0.0, "expected some cost to accrue, got {total}");
    }

    #[test]
    fn budget_exceeded_flips_once_total_reaches_max() {
        let tracker = CostTracker::new(1_000_000_000.0, 0.001);
        sleep(Duration::from_millis(20));
        tracker.accrue();
        assert!(tracker.budget_exceeded());
    }

    #[test]
    fn zero_cost_per_hour_never_exceeds_a_finite_budget() {
        let tracker = CostTracker::new(0.0, 10.0);
        sleep(Duration::from_millis(10));
        tracker.accrue();
        assert!(!tracker.budget_exceeded());
    }
}
