pub mod config_store;
pub mod http_client;
pub mod manifest_loader;
pub mod stats_transport;
pub mod tokio_process;

pub use config_store::TomlConfigStore;
pub use http_client::GuardedHttpClient;
pub use manifest_loader::ManifestPluginLoader;
pub use stats_transport::LocalStatsTransport;
pub use tokio_process::TokioProcessLauncher;
