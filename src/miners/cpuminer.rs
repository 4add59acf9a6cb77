use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::{
    AlgorithmType, ApiStatsRecord, BenchmarkDurations, CompletionRule, Device, DeviceKind,
    DomainError, MinerOption, MinerOptionsPackage, MiningSession,
};
use crate::miners::join_args;
use crate::ports::{CommandContext, MinerFamily, StatsQuery};

pub const FAMILY: &str = "cpuminer";
pub const PLUGIN_UUID: &str = "1cdf69c0-4991-11e9-87d3-6b57d758e2c6";

/// cpuminer-opt: single-process CPU miner with a `KEY=VALUE;` text API.
#[derive(Debug, Default)]
pub struct CpuMinerFamily;

impl MinerFamily for CpuMinerFamily {
    fn name(&self) -> &'static str {
        FAMILY
    }

    fn executable_name(&self) -> &'static str {
        "cpuminer"
    }

    fn algorithm_name(&self, algorithm: AlgorithmType) -> Option<&'static str> {
        match algorithm {
            AlgorithmType::Lyra2Z => Some("lyra2z"),
            _ => None,
        }
    }

    fn default_options(&self) -> MinerOptionsPackage {
        MinerOptionsPackage {
            general_options: vec![
                MinerOption::single("cpuminer_threads", "-t", "--threads=", None),
                MinerOption::single("cpuminer_priority", "--cpu-priority", "", Some("0")),
                MinerOption::single("cpuminer_affinity", "--cpu-affinity", "", None),
            ],
            temperature_options: Vec::new(),
        }
    }

    fn supported_algorithms(&self, devices: &[Device]) -> BTreeMap<String, Vec<AlgorithmType>> {
        devices
            .iter()
            .filter(|d| d.kind == DeviceKind::Cpu)
            .map(|d| (d.uuid.clone(), vec![AlgorithmType::Lyra2Z]))
            .collect()
    }

    fn benchmark_durations(&self) -> BenchmarkDurations {
        BenchmarkDurations::new(20, 60, 120)
    }

    fn completion_rule(&self) -> CompletionRule {
        CompletionRule::FirstSample
    }

    fn mining_arguments(&self, ctx: &CommandContext<'_>) -> Result<String, DomainError> {
        let algo = algo(self, ctx.session)?;
        let api = ctx
            .api_port
            .map(|port| format!("--api-bind={}", port))
            .unwrap_or_default();
        Ok(join_args(&[
            &format!("--algo={}", algo),
            &format!("--url={}", ctx.session.location_url()),
            &format!("--user={}", ctx.username),
            &api,
            ctx.extra_parameters,
        ]))
    }

    fn benchmark_arguments(
        &self,
        ctx: &CommandContext<'_>,
        duration: Duration,
    ) -> Result<String, DomainError> {
        let algo = algo(self, ctx.session)?;
        Ok(join_args(&[
            &format!("--algo={}", algo),
            "--benchmark",
            &format!("--time-limit {}", duration.as_secs()),
            ctx.extra_parameters,
        ]))
    }

    /// In benchmark mode the miner prints its final speed as a bare number.
    fn extract_sample(
        &self,
        line: &str,
        _session: &MiningSession,
    ) -> Result<Option<f64>, DomainError> {
        Ok(line
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|speed| speed.is_finite() && *speed > 0.0))
    }

    fn stats_query(&self, api_port: u16) -> StatsQuery {
        StatsQuery::Tcp {
            port: api_port,
            request: "summary".to_string(),
        }
    }

    fn parse_stats(
        &self,
        reply: &str,
        session: &MiningSession,
    ) -> Result<ApiStatsRecord, DomainError> {
        let mut khs = None;
        for pair in reply.split(';').filter(|p| !p.is_empty()) {
            let parts: Vec<&str> = pair.split('=').filter(|p| !p.is_empty()).collect();
            if let [key, value] = parts.as_slice() {
                if *key == "KHS" {
                    let parsed: f64 = value.trim().parse().map_err(|_| {
                        DomainError::Telemetry(format!("invalid KHS value: {}", value))
                    })?;
                    khs = Some(parsed);
                }
            }
        }

        let speed = khs.map_or(0.0, |khs| khs * 1000.0);
        Ok(ApiStatsRecord::single(session.algorithm(), speed, 0))
    }
}

fn algo(family: &CpuMinerFamily, session: &MiningSession) -> Result<&'static str, DomainError> {
    family.algorithm_name(session.algorithm()).ok_or_else(|| {
        DomainError::Initialization(format!("cpuminer does not support {}", session.algorithm()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miners::testing::{device, session};

    fn ctx<'a>(session: &'a MiningSession, extra: &'a str, port: Option<u16>) -> CommandContext<'a> {
        CommandContext {
            session,
            extra_parameters: extra,
            username: "worker",
            api_port: port,
        }
    }

    #[test]
    fn test_mining_arguments() {
        let session = session(DeviceKind::Cpu, &[0], AlgorithmType::Lyra2Z);
        let line = CpuMinerFamily
            .mining_arguments(&ctx(&session, "-t 4", Some(4001)))
            .unwrap();
        assert_eq!(
            line,
            "--algo=lyra2z --url=stratum+tcp://pool.example.com:3333 --user=worker --api-bind=4001 -t 4"
        );
    }

    #[test]
    fn test_benchmark_arguments() {
        let session = session(DeviceKind::Cpu, &[0], AlgorithmType::Lyra2Z);
        let line = CpuMinerFamily
            .benchmark_arguments(&ctx(&session, "", None), Duration::from_secs(60))
            .unwrap();
        assert_eq!(line, "--algo=lyra2z --benchmark --time-limit 60");
    }

    #[test]
    fn test_unsupported_algorithm_rejected() {
        let session = session(DeviceKind::Cpu, &[0], AlgorithmType::ZHash);
        let err = CpuMinerFamily
            .mining_arguments(&ctx(&session, "", None))
            .unwrap_err();
        assert!(matches!(err, DomainError::Initialization(_)));
    }

    #[test]
    fn test_extract_sample() {
        let session = session(DeviceKind::Cpu, &[0], AlgorithmType::Lyra2Z);
        let family = CpuMinerFamily;
        assert_eq!(family.extract_sample(" 1234.5 ", &session).unwrap(), Some(1234.5));
        assert_eq!(family.extract_sample("[2019] accepted 1/1", &session).unwrap(), None);
        assert_eq!(family.extract_sample("0", &session).unwrap(), None);
    }

    #[test]
    fn test_parse_stats_scales_khs() {
        let session = session(DeviceKind::Cpu, &[0], AlgorithmType::Lyra2Z);
        let reply = "NAME=cpuminer-opt;VER=3.8.8;ALGO=lyra2z;CPUS=8;KHS=1.25;ACC=3;REJ=0;";
        let record = CpuMinerFamily.parse_stats(reply, &session).unwrap();
        assert_eq!(record.per_algorithm_speed, vec![(AlgorithmType::Lyra2Z, 1250.0)]);
        assert_eq!(record.total_power_usage, 0);
    }

    #[test]
    fn test_parse_stats_key_is_case_sensitive() {
        let session = session(DeviceKind::Cpu, &[0], AlgorithmType::Lyra2Z);
        let record = CpuMinerFamily.parse_stats("khs=9;", &session).unwrap();
        assert_eq!(record.total_speed(), 0.0);
    }

    #[test]
    fn test_parse_stats_bad_value_is_error() {
        let session = session(DeviceKind::Cpu, &[0], AlgorithmType::Lyra2Z);
        assert!(CpuMinerFamily.parse_stats("KHS=abc;", &session).is_err());
    }

    #[test]
    fn test_supported_algorithms_cpu_only() {
        let devices = vec![
            device(0, DeviceKind::Cpu, 16),
            device(0, DeviceKind::Nvidia, 8),
        ];
        let supported = CpuMinerFamily.supported_algorithms(&devices);
        assert_eq!(supported.len(), 1);
        assert_eq!(supported["CPU-0"], vec![AlgorithmType::Lyra2Z]);
    }
}
