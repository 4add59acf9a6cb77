#![forbid(unsafe_code)]

//! MinerHost: supervises third-party miner processes, benchmarks them,
//! polls their telemetry and manages the plugin packages that ship them.

pub mod adapters;
pub mod app;
pub mod domain;
pub mod infrastructure;
pub mod miners;
pub mod ports;

pub use app::{AppController, BenchmarkEngine, Miner, PackageInstaller, PluginManager, PluginRegistry, StatsPoller};
pub use domain::{
    AlgorithmType, ApiStatsRecord, BenchmarkPerformanceType, BenchmarkResult, Device, DeviceKind,
    DomainError, LaunchOptions, MiningPairing, MiningSession,
};
