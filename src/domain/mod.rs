pub mod benchmark;
pub mod config;
pub mod device;
pub mod error;
pub mod install;
pub mod options;
pub mod plugin;
pub mod stats;

pub use benchmark::{
    BenchmarkDurations, BenchmarkPerformanceType, BenchmarkPlan, BenchmarkResult, BenchmarkState,
    CompletionRule, SampleAverage,
};
pub use config::AppConfig;
pub use device::{
    single_algorithm, AlgorithmType, Device, DeviceKind, MiningPairing, MiningSession, DEMO_USER,
};
pub use error::DomainError;
pub use install::{percent_of, InstallPhase, InstallProgress};
pub use options::{
    render_options, render_package, LaunchOptions, MinerOption, MinerOptionKind,
    MinerOptionsPackage, OptionSelection,
};
pub use plugin::{
    DeviceAlgorithms, PluginManifest, PluginPackageInfo, PluginPackageInfoCR, PluginVersion,
};
pub use stats::ApiStatsRecord;
