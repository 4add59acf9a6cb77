use serde::{Deserialize, Serialize};

use super::AlgorithmType;

/// Normalized live statistics of a running miner.
///
/// An empty record (no speeds, zero power) is the valid "no data" value
/// returned whenever a poll fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiStatsRecord {
    /// Total speed per algorithm, in H/s.
    pub per_algorithm_speed: Vec<(AlgorithmType, f64)>,
    /// Total power usage in watts.
    pub total_power_usage: i32,
}

impl ApiStatsRecord {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(algorithm: AlgorithmType, speed: f64, power: i32) -> Self {
        Self {
            per_algorithm_speed: vec![(algorithm, speed)],
            total_power_usage: power,
        }
    }

    /// Sum of all per-algorithm speeds.
    pub fn total_speed(&self) -> f64 {
        self.per_algorithm_speed.iter().map(|(_, speed)| speed).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_speed() == 0.0 && self.total_power_usage == 0
    }
}
