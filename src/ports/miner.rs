use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::{
    AlgorithmType, ApiStatsRecord, BenchmarkDurations, CompletionRule, Device, DomainError,
    MinerOptionsPackage, MiningSession,
};

/// How to ask a running miner for its statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsQuery {
    /// Write `request` to `127.0.0.1:port` and read one reply buffer.
    Tcp { port: u16, request: String },
    /// HTTP GET against the miner's local API.
    Http { url: String },
}

/// Inputs shared by mining and benchmark command lines.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub session: &'a MiningSession,
    /// Rendered extra launch parameters from the options package.
    pub extra_parameters: &'a str,
    /// Payout user; the demo user for benchmarks.
    pub username: &'a str,
    /// Local API port, when the miner should expose its API.
    pub api_port: Option<u16>,
}

/// Behaviour of one miner family (one third-party binary).
///
/// Every concrete adapter is a thin configuration of the shared lifecycle:
/// it names algorithms, renders arguments, picks benchmark durations,
/// extracts speed samples from output lines and parses its stats reply.
pub trait MinerFamily: Send + Sync {
    /// Stable family key, e.g. `"nbminer"`.
    fn name(&self) -> &'static str;

    /// File name of the executable inside the plugin's `bins` directory.
    fn executable_name(&self) -> &'static str;

    /// The binary's name for `algorithm`, `None` when unsupported.
    fn algorithm_name(&self, algorithm: AlgorithmType) -> Option<&'static str>;

    /// Built-in options package.
    fn default_options(&self) -> MinerOptionsPackage {
        MinerOptionsPackage::default()
    }

    /// Algorithms each device can run, keyed by device uuid. Devices with
    /// no supported algorithm are left out.
    fn supported_algorithms(&self, devices: &[Device]) -> BTreeMap<String, Vec<AlgorithmType>>;

    fn benchmark_durations(&self) -> BenchmarkDurations;

    fn completion_rule(&self) -> CompletionRule;

    /// Built-in developer fee in percent.
    fn default_dev_fee(&self, _algorithm: AlgorithmType) -> f64 {
        0.0
    }

    /// Fee in effect for a run, given the rendered extra parameters and any
    /// configured override.
    fn dev_fee_percent(
        &self,
        algorithm: AlgorithmType,
        _extra_parameters: &str,
        configured: Option<f64>,
    ) -> f64 {
        configured.unwrap_or_else(|| self.default_dev_fee(algorithm))
    }

    fn mining_arguments(&self, ctx: &CommandContext<'_>) -> Result<String, DomainError>;

    fn benchmark_arguments(
        &self,
        ctx: &CommandContext<'_>,
        duration: Duration,
    ) -> Result<String, DomainError>;

    /// Speed sample (H/s) carried by one output line, if any.
    fn extract_sample(
        &self,
        line: &str,
        session: &MiningSession,
    ) -> Result<Option<f64>, DomainError>;

    fn stats_query(&self, api_port: u16) -> StatsQuery;

    /// Normalize a stats reply. Devices absent from the reply are skipped;
    /// reply entries for devices outside the session are ignored.
    fn parse_stats(
        &self,
        reply: &str,
        session: &MiningSession,
    ) -> Result<ApiStatsRecord, DomainError>;
}
