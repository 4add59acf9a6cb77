use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use crate::adapters::{
    GuardedHttpClient, LocalStatsTransport, ManifestPluginLoader, TokioProcessLauncher,
    TomlConfigStore,
};
use crate::app::{
    BenchmarkEngine, InstallProgressFn, Miner, MinerServices, PluginManager, StatsPoller,
};
use crate::domain::{AppConfig, Device, DeviceAlgorithms, DomainError, PluginPackageInfoCR};
use crate::infrastructure::{init_logging, PortPool};
use crate::ports::{ConfigStore, HttpClient};

/// Application controller that wires the services together and owns the
/// global state.
pub struct AppController {
    config: RwLock<AppConfig>,
    config_store: Arc<dyn ConfigStore>,
    http: Arc<GuardedHttpClient>,
    plugins: Arc<PluginManager>,
    services: RwLock<MinerServices>,
    _log_guard: Option<WorkerGuard>,
}

impl AppController {
    /// Initialize with the OS data directory.
    pub fn new() -> Result<Self, DomainError> {
        Self::with_store(Arc::new(TomlConfigStore::new()?))
    }

    /// Initialize on top of an explicit config store.
    pub fn with_store(config_store: Arc<dyn ConfigStore>) -> Result<Self, DomainError> {
        // Step 1: Load configuration
        let config = config_store.load()?;

        // Step 2: Initialize logging
        let log_guard = init_logging(&config_store.logs_dir(), &config.logging)?;
        info!("MinerHost starting up");

        // Step 3: Network client with the offline switch and allowlist
        let http = Arc::new(GuardedHttpClient::new(&config.network)?);

        // Step 4: Shared miner services
        let services = MinerServices {
            launcher: Arc::new(TokioProcessLauncher::new(config.benchmark.grace())),
            poller: StatsPoller::new(Arc::new(LocalStatsTransport::new(
                config.telemetry.timeout(),
            )?)),
            ports: PortPool::from_config(&config.api_ports),
            engine: BenchmarkEngine::from_config(&config.benchmark),
            dev_fees: config.dev_fees.clone(),
        };

        // Step 5: Plugins
        let plugins_root = config_store.plugins_dir(&config);
        let plugins = Arc::new(PluginManager::new(
            plugins_root,
            &config.plugins,
            http.clone(),
            Arc::new(ManifestPluginLoader::new()),
        ));
        plugins.load_all()?;

        info!(
            offline = config.network.offline,
            plugins = plugins.installed().len(),
            "AppController initialized"
        );

        Ok(Self {
            config: RwLock::new(config),
            config_store,
            http,
            plugins,
            services: RwLock::new(services),
            _log_guard: log_guard,
        })
    }

    /// Get the current configuration.
    pub fn config(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// Persist a new configuration and apply the parts that can change at
    /// runtime. Port range and plugin root changes apply on restart.
    pub fn update_config(&self, config: AppConfig) -> Result<(), DomainError> {
        self.config_store.save(&config)?;

        self.http.apply(&config.network);
        {
            let mut services = self.services.write();
            services.engine = BenchmarkEngine::from_config(&config.benchmark);
            services.dev_fees = config.dev_fees.clone();
        }

        *self.config.write() = config;
        info!("Configuration updated");
        Ok(())
    }

    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.plugins
    }

    /// Supply the detected devices.
    pub fn set_devices(&self, devices: Vec<Device>) {
        self.plugins.set_devices(devices);
    }

    pub fn device_algorithms(&self) -> Vec<DeviceAlgorithms> {
        self.plugins.device_algorithms()
    }

    /// Fetch the online catalog; returns the number of catalog entries.
    pub async fn refresh_online(&self) -> usize {
        self.plugins.refresh_online().await
    }

    pub fn ranked_plugins(&self) -> Vec<PluginPackageInfoCR> {
        self.plugins.ranked_plugins()
    }

    /// New miner instance for an installed plugin.
    pub fn create_miner(&self, plugin_uuid: &str) -> Result<Miner, DomainError> {
        let plugin = self
            .plugins
            .plugin(plugin_uuid)
            .ok_or_else(|| DomainError::PluginNotFound(plugin_uuid.to_string()))?;
        Ok(Miner::new(plugin, self.services.read().clone()))
    }

    pub async fn install_plugin(
        &self,
        plugin_uuid: &str,
        progress: Option<InstallProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError> {
        self.plugins.install(plugin_uuid, progress, cancel).await
    }

    pub async fn update_plugin(
        &self,
        plugin_uuid: &str,
        progress: Option<InstallProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError> {
        self.plugins.update(plugin_uuid, progress, cancel).await
    }

    pub async fn remove_plugin(&self, plugin_uuid: &str) -> Result<(), DomainError> {
        self.plugins.remove(plugin_uuid).await
    }

    /// Check if network is currently blocked.
    pub fn is_network_blocked(&self) -> bool {
        self.http.is_network_blocked()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config_store.data_dir()
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.config_store.logs_dir()
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_store.config_path()
    }
}
