pub mod config;
pub mod http;
pub mod miner;
pub mod plugin_loader;
pub mod process;
pub mod telemetry;

pub use config::ConfigStore;
pub use http::{DownloadProgressFn, HttpClient};
pub use miner::{CommandContext, MinerFamily, StatsQuery};
pub use plugin_loader::PluginLoader;
pub use process::{LaunchSpec, LineRead, MinerProcess, ProcessLauncher};
pub use telemetry::StatsTransport;
