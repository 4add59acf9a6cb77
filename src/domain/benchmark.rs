use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Selects how long a benchmark runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BenchmarkPerformanceType {
    Quick,
    #[default]
    Standard,
    Precise,
}

/// Per-family benchmark durations, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkDurations {
    pub quick: u64,
    pub standard: u64,
    pub precise: u64,
}

impl BenchmarkDurations {
    pub const fn new(quick: u64, standard: u64, precise: u64) -> Self {
        Self {
            quick,
            standard,
            precise,
        }
    }

    pub fn duration(&self, performance: BenchmarkPerformanceType) -> Duration {
        let secs = match performance {
            BenchmarkPerformanceType::Quick => self.quick,
            BenchmarkPerformanceType::Standard => self.standard,
            BenchmarkPerformanceType::Precise => self.precise,
        };
        Duration::from_secs(secs)
    }
}

/// When a benchmark has collected enough samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionRule {
    /// The first valid sample completes the run.
    FirstSample,
    /// Complete after `max(1, floor(duration / interval))` samples.
    SampleInterval(Duration),
}

impl CompletionRule {
    /// Number of samples needed to complete a run of `duration`.
    pub fn target_samples(&self, duration: Duration) -> u32 {
        match self {
            CompletionRule::FirstSample => 1,
            CompletionRule::SampleInterval(interval) => {
                if interval.is_zero() {
                    return 1;
                }
                let iterations = duration.as_secs_f64() / interval.as_secs_f64();
                std::cmp::max(1, iterations.floor() as u32)
            }
        }
    }
}

/// Everything the benchmark engine needs to know about one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkPlan {
    pub duration: Duration,
    pub completion: CompletionRule,
    /// Developer fee in percent, deducted from the averaged speed.
    pub dev_fee_percent: f64,
}

impl BenchmarkPlan {
    pub fn target_samples(&self) -> u32 {
        self.completion.target_samples(self.duration)
    }
}

/// Benchmark state machine.
///
/// `Idle -> Running -> {Succeeded, TimedOut, Cancelled, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BenchmarkState {
    Idle,
    Running,
    Succeeded,
    TimedOut,
    Cancelled,
    Failed,
}

impl BenchmarkState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BenchmarkState::Idle | BenchmarkState::Running)
    }
}

/// Terminal value of one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Averaged speed in H/s, fee corrected.
    pub speed: f64,
    /// True only for `Succeeded`.
    pub ok: bool,
    pub message: String,
    pub state: BenchmarkState,
}

impl BenchmarkResult {
    pub fn succeeded(speed: f64) -> Self {
        Self {
            speed,
            ok: true,
            message: String::new(),
            state: BenchmarkState::Succeeded,
        }
    }

    pub fn timed_out(speed: f64) -> Self {
        Self {
            speed,
            ok: false,
            message: "Benchmark timed out".to_string(),
            state: BenchmarkState::TimedOut,
        }
    }

    pub fn cancelled(speed: f64) -> Self {
        Self {
            speed,
            ok: false,
            message: "Benchmark cancelled".to_string(),
            state: BenchmarkState::Cancelled,
        }
    }

    pub fn failed(speed: f64, message: impl Into<String>) -> Self {
        Self {
            speed,
            ok: false,
            message: message.into(),
            state: BenchmarkState::Failed,
        }
    }
}

/// Running average of benchmark samples with fee correction.
#[derive(Debug, Clone, Default)]
pub struct SampleAverage {
    sum: f64,
    count: u32,
    fee_fraction: f64,
}

impl SampleAverage {
    pub fn new(dev_fee_percent: f64) -> Self {
        Self {
            sum: 0.0,
            count: 0,
            fee_fraction: (dev_fee_percent / 100.0).clamp(0.0, 1.0),
        }
    }

    /// Record a sample. Non-positive and non-finite samples are ignored.
    pub fn push(&mut self, sample: f64) -> bool {
        if !sample.is_finite() || sample <= 0.0 {
            return false;
        }
        self.sum += sample;
        self.count += 1;
        true
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Current best estimate, after the fee deduction.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.sum / self.count as f64) * (1.0 - self.fee_fraction)
    }
}
