//! Per-generation aggregate statistics over the resource ledger.

use std::collections::HashMap;

use serde::Serialize;

/// Aggregates computed from one generation's final ledger and donation
/// counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationStats {
    pub total_resources: f64,
    pub average_resources: f64,
    pub std_dev: f64,
    /// Spread between the richest and poorest agent (max − min).
    pub inequality: f64,
    pub successful_donations: u32,
    pub failed_donations: u32,
}

impl GenerationStats {
    /// Compute stats from a ledger snapshot. An empty ledger yields zeros.
    pub fn from_ledger(
        resources: &HashMap<String, f64>,
        successful_donations: u32,
        failed_donations: u32,
    ) -> Self {
        if resources.is_empty() {
            return Self {
                total_resources: 0.0,
                average_resources: 0.0,
                std_dev: 0.0,
                inequality: 0.0,
                successful_donations,
                failed_donations,
            };
        }

        let count = resources.len() as f64;
        let total: f64 = resources.values().sum();
        let mean = total / count;
        let sum_squares: f64 = resources.values().map(|r| (r - mean) * (r - mean)).sum();
        let std_dev = (sum_squares / count).sqrt();

        let max = resources.values().cloned().fold(f64::MIN, f64::max);
        let min = resources.values().cloned().fold(f64::MAX, f64::min);

        Self {
            total_resources: total,
            average_resources: mean,
            std_dev,
            inequality: max - min,
            successful_donations,
            failed_donations,
        }
    }

    /// Donation success rate in percent; 0 when no donations were attempted.
    pub fn success_rate_percent(&self) -> f64 {
        let attempts = self.successful_donations + self.failed_donations;
        if attempts == 0 {
            return 0.0;
        }
        f64::from(self.successful_donations) / f64::from(attempts) * 100.0
    }
}
