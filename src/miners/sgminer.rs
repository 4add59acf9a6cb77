use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::{
    AlgorithmType, ApiStatsRecord, BenchmarkDurations, CompletionRule, Device, DeviceKind,
    DomainError, MinerOption, MinerOptionsPackage, MiningSession,
};
use crate::miners::{hashrate_after, join_args};
use crate::ports::{CommandContext, MinerFamily, StatsQuery};

pub const FAMILY: &str = "sgminer";

const AVG_MARKER: &str = "(avg):";

/// sgminer and its forks: OpenCL miner for AMD GPUs with a JSON `devs` API.
#[derive(Debug, Default)]
pub struct SgminerFamily;

impl SgminerFamily {
    fn base_arguments(&self, ctx: &CommandContext<'_>) -> Result<String, DomainError> {
        let session = ctx.session;
        let algo = self.algorithm_name(session.algorithm()).ok_or_else(|| {
            DomainError::Initialization(format!("sgminer does not support {}", session.algorithm()))
        })?;
        let platform = session
            .devices()
            .find_map(|d| d.platform)
            .unwrap_or(0);

        Ok(join_args(&[
            &format!("-k {}", algo),
            &format!("-o {}", session.location_url()),
            &format!("-u {}", ctx.username),
            "-p x",
            ctx.extra_parameters,
            &format!("--gpu-platform {}", platform),
            &format!("-d {}", session.device_ids(",")),
        ]))
    }
}

impl MinerFamily for SgminerFamily {
    fn name(&self) -> &'static str {
        FAMILY
    }

    fn executable_name(&self) -> &'static str {
        "sgminer"
    }

    fn algorithm_name(&self, algorithm: AlgorithmType) -> Option<&'static str> {
        match algorithm {
            AlgorithmType::NeoScrypt => Some("neoscrypt"),
            AlgorithmType::Keccak => Some("keccak"),
            AlgorithmType::DaggerHashimoto => Some("ethash"),
            AlgorithmType::X16R => Some("x16r"),
            _ => None,
        }
    }

    fn default_options(&self) -> MinerOptionsPackage {
        MinerOptionsPackage {
            general_options: vec![
                MinerOption::single("KeccakUnroll", "--keccak-unroll", "--keccak-unroll", Some("0")),
                MinerOption::single(
                    "HamsiExpandBig",
                    "--hamsi-expand-big",
                    "--hamsi-expand-big",
                    Some("4"),
                ),
                MinerOption::single("Nfactor", "--nfactor", "--nfactor", Some("10")),
                MinerOption::multi("Intensity", "-I", "--intensity", "d", ","),
                MinerOption::multi("Xintensity", "-X", "--xintensity", "-1", ","),
                MinerOption::multi("Rawintensity", "--rawintensity", "--rawintensity", "-1", ","),
                MinerOption::multi(
                    "ThreadConcurrency",
                    "--thread-concurrency",
                    "--thread-concurrency",
                    "-1",
                    ",",
                ),
                MinerOption::multi("Worksize", "-w", "--worksize", "-1", ","),
                MinerOption::multi("GpuThreads", "-g", "--gpu-threads", "-1", ","),
                MinerOption::multi("LookupGap", "--lookup-gap", "--lookup-gap", "-1", ","),
                MinerOption::flag("RemoveDisabled", "--remove-disabled"),
            ],
            temperature_options: vec![
                MinerOption::multi("GpuFan", "--gpu-fan", "--gpu-fan", "30-60", ","),
                MinerOption::multi("TempCutoff", "--temp-cutoff", "--temp-cutoff", "95", ","),
                MinerOption::multi("TempOverheat", "--temp-overheat", "--temp-overheat", "85", ","),
                MinerOption::multi("TempTarget", "--temp-target", "--temp-target", "75", ","),
                MinerOption::flag("AutoFan", "--auto-fan"),
                MinerOption::flag("AutoGpu", "--auto-gpu"),
            ],
        }
    }

    fn supported_algorithms(&self, devices: &[Device]) -> BTreeMap<String, Vec<AlgorithmType>> {
        devices
            .iter()
            .filter(|d| d.kind == DeviceKind::Amd)
            .map(|d| {
                (
                    d.uuid.clone(),
                    vec![
                        AlgorithmType::NeoScrypt,
                        AlgorithmType::Keccak,
                        AlgorithmType::DaggerHashimoto,
                        AlgorithmType::X16R,
                    ],
                )
            })
            .collect()
    }

    fn benchmark_durations(&self) -> BenchmarkDurations {
        BenchmarkDurations::new(60, 90, 180)
    }

    fn completion_rule(&self) -> CompletionRule {
        CompletionRule::FirstSample
    }

    fn mining_arguments(&self, ctx: &CommandContext<'_>) -> Result<String, DomainError> {
        let base = self.base_arguments(ctx)?;
        let api = ctx
            .api_port
            .map(|port| format!("--api-listen --api-port={}", port))
            .unwrap_or_default();
        Ok(join_args(&[&base, &api]))
    }

    /// Schedules the miner to stop on its own once the benchmark window ends
    /// and disables the curses UI so output can be read line by line.
    fn benchmark_arguments(
        &self,
        ctx: &CommandContext<'_>,
        duration: Duration,
    ) -> Result<String, DomainError> {
        let stop_at = chrono::Local::now()
            + chrono::Duration::from_std(duration)
                .map_err(|e| DomainError::Initialization(e.to_string()))?;
        let base = self.base_arguments(ctx)?;
        Ok(join_args(&[
            &format!("--sched-stop {}", stop_at.format("%H:%M")),
            "-T",
            &base,
        ]))
    }

    fn extract_sample(
        &self,
        line: &str,
        session: &MiningSession,
    ) -> Result<Option<f64>, DomainError> {
        let Some(device) = session.devices().next() else {
            return Ok(None);
        };
        if !mentions_gpu(line, device.id) || !line.contains(AVG_MARKER) {
            return Ok(None);
        }
        Ok(hashrate_after(line, AVG_MARKER).filter(|speed| *speed > 0.0))
    }

    fn stats_query(&self, api_port: u16) -> StatsQuery {
        StatsQuery::Tcp {
            port: api_port,
            request: r#"{"command": "devs"}"#.to_string(),
        }
    }

    fn parse_stats(
        &self,
        reply: &str,
        session: &MiningSession,
    ) -> Result<ApiStatsRecord, DomainError> {
        let root: DevsRoot = serde_json::from_str(reply)
            .map_err(|e| DomainError::Telemetry(format!("invalid devs reply: {}", e)))?;

        let total: f64 = session
            .devices()
            .filter_map(|device| {
                root.devs
                    .iter()
                    .find(|stat| stat.gpu == Some(i64::from(device.id)))
            })
            .map(|stat| stat.khs_5s * 1000.0)
            .sum();

        Ok(ApiStatsRecord::single(session.algorithm(), total, 0))
    }
}

/// `GPU<id>` present as a whole token, so `GPU1` does not match `GPU10`.
fn mentions_gpu(line: &str, id: u32) -> bool {
    let needle = format!("GPU{}", id);
    line.match_indices(&needle).any(|(at, _)| {
        !line[at + needle.len()..]
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_digit())
    })
}

#[derive(Debug, Default, Deserialize)]
struct DevsRoot {
    #[serde(rename = "DEVS", default)]
    devs: Vec<DevStat>,
}

#[derive(Debug, Default, Deserialize)]
struct DevStat {
    #[serde(rename = "GPU", default)]
    gpu: Option<i64>,
    #[serde(rename = "KHS 5s", default)]
    khs_5s: f64,
}
