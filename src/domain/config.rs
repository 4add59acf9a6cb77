use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AlgorithmType;

/// Outbound network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// When true, every outbound request is blocked (default: false).
    pub offline: bool,
    /// Hosts allowed for catalog and package downloads. Subdomains match.
    pub allowed_domains: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            offline: false,
            allowed_domains: Self::default_allowed_domains(),
        }
    }
}

impl NetworkConfig {
    /// Default hosts for the plugin catalog and package mirrors.
    pub fn default_allowed_domains() -> Vec<String> {
        vec![
            "miner-plugins.nicehash.com".to_string(),
            "github.com".to_string(),
            "objects.githubusercontent.com".to_string(),
        ]
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Enable file logging with rotation.
    pub file_logging: bool,
    /// Maximum number of log files to keep.
    pub max_files: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: true,
            max_files: 7,
        }
    }
}

/// Plugin package configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Remote catalog listing installable plugins.
    pub catalog_url: String,
    /// Install root. Defaults to `<data_dir>/miner_plugins`.
    pub plugins_dir: Option<PathBuf>,
    /// Verify archive checksums when the catalog provides them.
    pub verify_checksums: bool,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            catalog_url: "https://miner-plugins.nicehash.com/api/plugins".to_string(),
            plugins_dir: None,
            verify_checksums: true,
        }
    }
}

/// Local API port range handed out to running miners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiPortsConfig {
    pub start: u16,
    pub end: u16,
}

impl Default for ApiPortsConfig {
    fn default() -> Self {
        Self {
            start: 4000,
            end: 5000,
        }
    }
}

/// Benchmark engine timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Delay between output checks.
    pub poll_interval_ms: u64,
    /// Extra time past the benchmark duration before timing out.
    pub grace_secs: u64,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            grace_secs: 5,
        }
    }
}

impl BenchmarkConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

/// Stats polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Upper bound for one poll, connect + request + reply.
    pub timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { timeout_ms: 2000 }
    }
}

impl TelemetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Developer fee overrides in percent, keyed by family then algorithm name.
///
/// ```toml
/// [dev_fees.nbminer]
/// GrinCuckaroo29 = 2.0
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevFeeConfig(pub BTreeMap<String, BTreeMap<String, f64>>);

impl DevFeeConfig {
    /// Configured fee for `family` on `algorithm`, if any.
    pub fn fee(&self, family: &str, algorithm: AlgorithmType) -> Option<f64> {
        self.0
            .get(family)?
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(algorithm.name()))
            .map(|(_, fee)| *fee)
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
    pub plugins: PluginsConfig,
    pub api_ports: ApiPortsConfig,
    pub benchmark: BenchmarkConfig,
    pub telemetry: TelemetryConfig,
    pub dev_fees: DevFeeConfig,
}

impl AppConfig {
    /// Create a new AppConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }
}
