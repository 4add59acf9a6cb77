use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::{
    AlgorithmType, ApiStatsRecord, BenchmarkDurations, CompletionRule, Device, DeviceKind,
    DomainError, MiningSession,
};
use crate::miners::{hashrate_after, host_and_port, join_args};
use crate::ports::{CommandContext, MinerFamily, StatsQuery};

pub const FAMILY: &str = "ewbf";

const DEFAULT_FEE_PERCENT: f64 = 2.0;
const MIN_MEMORY: u64 = 2 << 30;
const TOTAL_SPEED: &str = "Total speed:";

/// EWBF Equihash miner for NVIDIA GPUs.
///
/// The binary charges a 2% fee unless told otherwise; when the launch
/// parameters do not set `--fee` explicitly, `--fee 0` is appended and the
/// fee is treated as zero.
#[derive(Debug, Default)]
pub struct EwbfFamily;

impl EwbfFamily {
    fn arguments(&self, ctx: &CommandContext<'_>) -> Result<String, DomainError> {
        let session = ctx.session;
        let algo = self.algorithm_name(session.algorithm()).ok_or_else(|| {
            DomainError::Initialization(format!("ewbf does not support {}", session.algorithm()))
        })?;
        let (host, port) = host_and_port(session.location_url())?;

        let mut algorithm_param = format!("--algo {}", algo);
        if session.algorithm() == AlgorithmType::ZHash {
            algorithm_param.push_str(" --pers auto");
        }
        let api = ctx
            .api_port
            .map(|port| format!("--api 127.0.0.1:{}", port))
            .unwrap_or_default();
        let fee = if sets_fee(ctx.extra_parameters) {
            ""
        } else {
            "--fee 0"
        };

        Ok(join_args(&[
            &algorithm_param,
            &format!("--cuda_devices {}", session.device_ids(" ")),
            &format!("--user {}", ctx.username),
            &format!("--server {}", host),
            &format!("--port {}", port),
            "--pass x",
            &api,
            ctx.extra_parameters,
            fee,
        ]))
    }
}

fn sets_fee(extra_parameters: &str) -> bool {
    extra_parameters.contains("--fee")
}

impl MinerFamily for EwbfFamily {
    fn name(&self) -> &'static str {
        FAMILY
    }

    fn executable_name(&self) -> &'static str {
        "miner"
    }

    fn algorithm_name(&self, algorithm: AlgorithmType) -> Option<&'static str> {
        match algorithm {
            AlgorithmType::ZHash => Some("144_5"),
            _ => None,
        }
    }

    fn supported_algorithms(&self, devices: &[Device]) -> BTreeMap<String, Vec<AlgorithmType>> {
        devices
            .iter()
            .filter(|d| d.kind == DeviceKind::Nvidia && d.memory_bytes >= MIN_MEMORY)
            .map(|d| (d.uuid.clone(), vec![AlgorithmType::ZHash]))
            .collect()
    }

    fn benchmark_durations(&self) -> BenchmarkDurations {
        BenchmarkDurations::new(60, 90, 120)
    }

    fn completion_rule(&self) -> CompletionRule {
        CompletionRule::SampleInterval(Duration::from_secs(30))
    }

    fn default_dev_fee(&self, _algorithm: AlgorithmType) -> f64 {
        DEFAULT_FEE_PERCENT
    }

    fn dev_fee_percent(
        &self,
        algorithm: AlgorithmType,
        extra_parameters: &str,
        configured: Option<f64>,
    ) -> f64 {
        if !sets_fee(extra_parameters) {
            return 0.0;
        }
        configured.unwrap_or_else(|| self.default_dev_fee(algorithm))
    }

    fn mining_arguments(&self, ctx: &CommandContext<'_>) -> Result<String, DomainError> {
        self.arguments(ctx)
    }

    fn benchmark_arguments(
        &self,
        ctx: &CommandContext<'_>,
        _duration: Duration,
    ) -> Result<String, DomainError> {
        Ok(join_args(&[&self.arguments(ctx)?, "--color 0 --boff"]))
    }

    fn extract_sample(
        &self,
        line: &str,
        _session: &MiningSession,
    ) -> Result<Option<f64>, DomainError> {
        if !line.contains(TOTAL_SPEED) || !line.contains("Sol") {
            return Ok(None);
        }
        Ok(hashrate_after(line, TOTAL_SPEED).filter(|speed| *speed > 0.0))
    }

    fn stats_query(&self, api_port: u16) -> StatsQuery {
        StatsQuery::Tcp {
            port: api_port,
            request: "{\"method\":\"getstat\"}\n".to_string(),
        }
    }

    fn parse_stats(
        &self,
        reply: &str,
        session: &MiningSession,
    ) -> Result<ApiStatsRecord, DomainError> {
        let response: StatResponse = serde_json::from_str(reply)
            .map_err(|e| DomainError::Telemetry(format!("invalid getstat reply: {}", e)))?;
        if let Some(error) = response.error.filter(|e| !e.is_null()) {
            return Err(DomainError::Telemetry(format!("miner API error: {}", error)));
        }

        let mut speed = 0.0;
        let mut power = 0.0;
        for device in session.devices() {
            let Some(stat) = response
                .result
                .iter()
                .find(|r| r.cudaid == Some(i64::from(device.id)))
            else {
                continue;
            };
            speed += stat.speed_sps;
            power += stat.gpu_power_usage;
        }

        Ok(ApiStatsRecord::single(session.algorithm(), speed, power as i32))
    }
}

#[derive(Debug, Default, Deserialize)]
struct StatResponse {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    result: Vec<DeviceStat>,
}

#[derive(Debug, Default, Deserialize)]
struct DeviceStat {
    #[serde(default)]
    cudaid: Option<i64>,
    #[serde(default)]
    speed_sps: f64,
    #[serde(default)]
    gpu_power_usage: f64,
}
