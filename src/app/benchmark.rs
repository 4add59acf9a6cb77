use std::time::Duration;

use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::config::BenchmarkConfig;
use crate::domain::{BenchmarkPlan, BenchmarkResult, DomainError, SampleAverage};
use crate::ports::{LineRead, MinerProcess};

/// Drives one benchmark run over a launched miner process.
///
/// The wait loop races three conditions: cancellation, the deadline
/// (`duration + grace`) and a fixed polling tick. On every tick all
/// buffered output lines are fed to the sample extractor. Whatever the
/// outcome, the process is terminated before `run` returns.
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkEngine {
    poll_interval: Duration,
    grace: Duration,
}

enum Verdict {
    Succeeded,
    TimedOut,
    Cancelled,
    Failed(String),
}

impl BenchmarkEngine {
    pub fn new(poll_interval: Duration, grace: Duration) -> Self {
        Self {
            poll_interval,
            grace,
        }
    }

    pub fn from_config(config: &BenchmarkConfig) -> Self {
        Self::new(config.poll_interval(), config.grace())
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub async fn run<F>(
        &self,
        process: &mut dyn MinerProcess,
        plan: &BenchmarkPlan,
        mut check_line: F,
        cancel: &CancellationToken,
    ) -> BenchmarkResult
    where
        F: FnMut(&str) -> Result<Option<f64>, DomainError> + Send,
    {
        let started = Instant::now();
        let deadline = started + plan.duration + self.grace;
        let target = plan.target_samples();
        let mut average = SampleAverage::new(plan.dev_fee_percent);

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            pid = ?process.id(),
            duration_secs = plan.duration.as_secs(),
            target_samples = target,
            dev_fee = plan.dev_fee_percent,
            "Benchmark running"
        );

        let verdict = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Verdict::Cancelled,
                _ = sleep_until(deadline) => break Verdict::TimedOut,
                _ = ticker.tick() => {
                    if let Some(verdict) = drain(process, &mut check_line, &mut average, target) {
                        break verdict;
                    }
                }
            }
        };

        process.terminate().await;

        let speed = average.average();
        let result = match verdict {
            Verdict::Succeeded => BenchmarkResult::succeeded(speed),
            Verdict::TimedOut => BenchmarkResult::timed_out(speed),
            Verdict::Cancelled => BenchmarkResult::cancelled(speed),
            Verdict::Failed(message) => BenchmarkResult::failed(speed, message),
        };

        info!(
            state = ?result.state,
            speed = result.speed,
            samples = average.count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Benchmark finished"
        );
        result
    }
}

/// Consume every buffered line. Returns a verdict once the run is over.
fn drain<F>(
    process: &mut dyn MinerProcess,
    check_line: &mut F,
    average: &mut SampleAverage,
    target: u32,
) -> Option<Verdict>
where
    F: FnMut(&str) -> Result<Option<f64>, DomainError>,
{
    loop {
        match process.try_next_line() {
            LineRead::Line(line) => match check_line(&line) {
                Ok(Some(sample)) => {
                    if average.push(sample) {
                        debug!(sample = sample, count = average.count(), "Benchmark sample");
                    }
                    if average.count() >= target {
                        return Some(Verdict::Succeeded);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, line = %line, "Failed to parse benchmark output");
                    return Some(Verdict::Failed(e.to_string()));
                }
            },
            LineRead::Pending => return None,
            LineRead::Closed => {
                warn!(samples = average.count(), "Miner exited during benchmark");
                return Some(Verdict::Failed(
                    "Miner process exited before the benchmark completed".to_string(),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::ScriptedProcess;
    use crate::domain::{BenchmarkState, CompletionRule};
    use std::sync::atomic::Ordering;

    fn engine() -> BenchmarkEngine {
        BenchmarkEngine::new(Duration::from_millis(500), Duration::from_secs(5))
    }

    fn plan(duration_secs: u64, completion: CompletionRule, fee: f64) -> BenchmarkPlan {
        BenchmarkPlan {
            duration: Duration::from_secs(duration_secs),
            completion,
            dev_fee_percent: fee,
        }
    }

    fn numeric(line: &str) -> Result<Option<f64>, DomainError> {
        Ok(line.trim().parse::<f64>().ok())
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_duration_plus_grace() {
        let (mut process, terminated) = ScriptedProcess::new(&[(3, "starting up")], false);
        let started = Instant::now();

        let result = engine()
            .run(
                &mut process,
                &plan(20, CompletionRule::FirstSample, 0.0),
                numeric,
                &CancellationToken::new(),
            )
            .await;

        let elapsed = started.elapsed();
        assert_eq!(result.state, BenchmarkState::TimedOut);
        assert!(!result.ok);
        assert_eq!(result.speed, 0.0);
        assert!(elapsed >= Duration::from_secs(25));
        assert!(elapsed <= Duration::from_millis(25_500));
        assert!(terminated.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_samples_complete_before_timeout() {
        let (mut process, terminated) = ScriptedProcess::new(
            &[(30, "1000"), (45, "noise"), (60, "1000"), (90, "1000")],
            false,
        );
        let started = Instant::now();

        let result = engine()
            .run(
                &mut process,
                &plan(90, CompletionRule::SampleInterval(Duration::from_secs(30)), 2.0),
                numeric,
                &CancellationToken::new(),
            )
            .await;

        let elapsed = started.elapsed();
        assert_eq!(result.state, BenchmarkState::Succeeded);
        assert!(result.ok);
        assert!((result.speed - 980.0).abs() < 1e-9);
        assert!(elapsed >= Duration::from_secs(90));
        assert!(elapsed < Duration::from_secs(91));
        assert!(terminated.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_run_terminates_process() {
        let (mut process, terminated) = ScriptedProcess::new(&[(5, "1500")], false);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            trigger.cancel();
        });

        let result = engine()
            .run(
                &mut process,
                &plan(60, CompletionRule::SampleInterval(Duration::from_secs(20)), 0.0),
                numeric,
                &cancel,
            )
            .await;

        assert_eq!(result.state, BenchmarkState::Cancelled);
        assert!(!result.ok);
        assert_eq!(result.speed, 1500.0);
        assert!(terminated.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_sample_completes() {
        let (mut process, _terminated) =
            ScriptedProcess::new(&[(1, "warming up"), (2, "0"), (4, "250.5")], true);

        let result = engine()
            .run(
                &mut process,
                &plan(20, CompletionRule::FirstSample, 0.0),
                numeric,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.state, BenchmarkState::Succeeded);
        assert_eq!(result.speed, 250.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_exit_fails() {
        let (mut process, terminated) = ScriptedProcess::new(&[(2, "fatal: no devices")], true);

        let result = engine()
            .run(
                &mut process,
                &plan(20, CompletionRule::FirstSample, 0.0),
                numeric,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.state, BenchmarkState::Failed);
        assert!(!result.ok);
        assert!(result.message.contains("exited"));
        assert!(terminated.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_error_fails() {
        let (mut process, _terminated) = ScriptedProcess::new(&[(1, "garbage")], false);

        let result = engine()
            .run(
                &mut process,
                &plan(20, CompletionRule::FirstSample, 0.0),
                |_line: &str| -> Result<Option<f64>, DomainError> {
                    Err(DomainError::Telemetry("unreadable".to_string()))
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.state, BenchmarkState::Failed);
        assert!(result.message.contains("unreadable"));
    }
}
