use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::domain::{
    AlgorithmType, ApiStatsRecord, BenchmarkDurations, CompletionRule, Device, DeviceKind,
    DomainError, MiningSession,
};
use crate::miners::{hashrate_after, join_args};
use crate::ports::{CommandContext, MinerFamily, StatsQuery};

pub const FAMILY: &str = "nbminer";
pub const PLUGIN_UUID: &str = "d9e7ea80-4bfb-11e9-a481-e144ccd86993";

const MIN_GRIN29_MEMORY: u64 = 5 << 30;
const MIN_GRIN31_MEMORY: u64 = 8 << 30;

/// NBMiner: CUDA miner with an HTTP status API.
///
/// NBMiner numbers GPUs by its own CUDA ordering. The mapping from device id
/// to CUDA index is built when supported algorithms are computed: NVIDIA
/// devices ordered by id get sequential indices.
#[derive(Debug, Default)]
pub struct NbMinerFamily {
    cuda_ids: RwLock<BTreeMap<u32, u32>>,
}

impl NbMinerFamily {
    pub fn new() -> Self {
        Self::default()
    }

    /// CUDA index for `device_id`; the device id itself when unmapped.
    pub fn cuda_id(&self, device_id: u32) -> u32 {
        self.cuda_ids
            .read()
            .get(&device_id)
            .copied()
            .unwrap_or(device_id)
    }

    fn arguments(&self, ctx: &CommandContext<'_>) -> Result<String, DomainError> {
        let session = ctx.session;
        let algo = self.algorithm_name(session.algorithm()).ok_or_else(|| {
            DomainError::Initialization(format!("nbminer does not support {}", session.algorithm()))
        })?;
        let devices = session
            .devices()
            .map(|d| self.cuda_id(d.id).to_string())
            .collect::<Vec<_>>()
            .join(",");
        let api = ctx
            .api_port
            .map(|port| format!("--api 127.0.0.1:{}", port))
            .unwrap_or_default();

        Ok(join_args(&[
            &format!("-a {}", algo),
            &format!("-o {}", session.location_url()),
            &format!("-u {}", ctx.username),
            &api,
            &format!("-d {}", devices),
            "-RUN",
            ctx.extra_parameters,
        ]))
    }
}

impl MinerFamily for NbMinerFamily {
    fn name(&self) -> &'static str {
        FAMILY
    }

    fn executable_name(&self) -> &'static str {
        "nbminer"
    }

    fn algorithm_name(&self, algorithm: AlgorithmType) -> Option<&'static str> {
        match algorithm {
            AlgorithmType::GrinCuckaroo29 => Some("cuckaroo"),
            AlgorithmType::GrinCuckatoo31 => Some("cuckatoo"),
            AlgorithmType::DaggerHashimoto => Some("ethash"),
            _ => None,
        }
    }

    fn supported_algorithms(&self, devices: &[Device]) -> BTreeMap<String, Vec<AlgorithmType>> {
        let mut gpus: Vec<&Device> = devices
            .iter()
            .filter(|d| d.kind == DeviceKind::Nvidia)
            .collect();
        gpus.sort_by_key(|d| d.id);

        let mut cuda_ids = self.cuda_ids.write();
        cuda_ids.clear();
        let mut supported = BTreeMap::new();
        for (index, gpu) in gpus.into_iter().enumerate() {
            cuda_ids.insert(gpu.id, index as u32);

            let mut algorithms = Vec::new();
            if gpu.memory_bytes >= MIN_GRIN29_MEMORY {
                algorithms.push(AlgorithmType::GrinCuckaroo29);
            }
            if gpu.memory_bytes >= MIN_GRIN31_MEMORY {
                algorithms.push(AlgorithmType::GrinCuckatoo31);
            }
            if !algorithms.is_empty() {
                supported.insert(gpu.uuid.clone(), algorithms);
            }
        }
        supported
    }

    fn benchmark_durations(&self) -> BenchmarkDurations {
        BenchmarkDurations::new(20, 60, 120)
    }

    fn completion_rule(&self) -> CompletionRule {
        CompletionRule::SampleInterval(Duration::from_secs(20))
    }

    fn default_dev_fee(&self, algorithm: AlgorithmType) -> f64 {
        match algorithm {
            AlgorithmType::GrinCuckaroo29 | AlgorithmType::GrinCuckatoo31 => 2.0,
            AlgorithmType::DaggerHashimoto => 0.65,
            _ => 0.0,
        }
    }

    fn mining_arguments(&self, ctx: &CommandContext<'_>) -> Result<String, DomainError> {
        self.arguments(ctx)
    }

    fn benchmark_arguments(
        &self,
        ctx: &CommandContext<'_>,
        _duration: Duration,
    ) -> Result<String, DomainError> {
        self.arguments(ctx)
    }

    /// Per-GPU report lines look like `[12:00:00] INFO - 0: 1.52 g/s`.
    fn extract_sample(
        &self,
        line: &str,
        session: &MiningSession,
    ) -> Result<Option<f64>, DomainError> {
        let Some(device) = session.devices().next() else {
            return Ok(None);
        };
        let marker = format!(" - {}: ", self.cuda_id(device.id));
        Ok(hashrate_after(line, &marker).filter(|speed| *speed > 0.0))
    }

    fn stats_query(&self, api_port: u16) -> StatsQuery {
        StatsQuery::Http {
            url: format!("http://127.0.0.1:{}/api/v1/status", api_port),
        }
    }

    fn parse_stats(
        &self,
        reply: &str,
        session: &MiningSession,
    ) -> Result<ApiStatsRecord, DomainError> {
        let status: StatusResponse = serde_json::from_str(reply)
            .map_err(|e| DomainError::Telemetry(format!("invalid status reply: {}", e)))?;

        let mut speed = 0.0;
        let mut power = 0.0;
        for device in session.devices() {
            let cuda_id = i64::from(self.cuda_id(device.id));
            let Some(stat) = status.miner.devices.iter().find(|d| d.id == Some(cuda_id)) else {
                continue;
            };
            speed += stat.hashrate_raw;
            power += stat.power;
        }

        Ok(ApiStatsRecord::single(session.algorithm(), speed, power as i32))
    }
}

#[derive(Debug, Default, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    miner: MinerStatus,
}

#[derive(Debug, Default, Deserialize)]
struct MinerStatus {
    #[serde(default)]
    devices: Vec<DeviceStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct DeviceStatus {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    hashrate_raw: f64,
    #[serde(default)]
    power: f64,
}
