use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::installer::{InstallProgressFn, PackageInstaller, STAGING_PREFIX};
use crate::app::registry::PluginRegistry;
use crate::domain::config::PluginsConfig;
use crate::domain::{
    Device, DeviceAlgorithms, DomainError, PluginPackageInfo, PluginPackageInfoCR,
};
use crate::miners::InstalledPlugin;
use crate::ports::{HttpClient, PluginLoader};

/// Owns the set of installed plugins, the online catalog and the registry
/// that cross-references them.
pub struct PluginManager {
    plugins_root: PathBuf,
    catalog_url: String,
    http: Arc<dyn HttpClient>,
    loader: Arc<dyn PluginLoader>,
    installer: PackageInstaller,
    registry: PluginRegistry,
    plugins: RwLock<BTreeMap<String, Arc<InstalledPlugin>>>,
    devices: RwLock<Vec<Device>>,
    device_algorithms: RwLock<Vec<DeviceAlgorithms>>,
    catalog: RwLock<Vec<PluginPackageInfo>>,
}

impl PluginManager {
    pub fn new(
        plugins_root: PathBuf,
        config: &PluginsConfig,
        http: Arc<dyn HttpClient>,
        loader: Arc<dyn PluginLoader>,
    ) -> Self {
        let installer = PackageInstaller::new(
            Arc::clone(&http),
            Arc::clone(&loader),
            plugins_root.clone(),
            config.verify_checksums,
        );
        Self {
            plugins_root,
            catalog_url: config.catalog_url.clone(),
            http,
            loader,
            installer,
            registry: PluginRegistry::new(),
            plugins: RwLock::new(BTreeMap::new()),
            devices: RwLock::new(Vec::new()),
            device_algorithms: RwLock::new(Vec::new()),
            catalog: RwLock::new(Vec::new()),
        }
    }

    pub fn plugins_root(&self) -> &Path {
        &self.plugins_root
    }

    /// Replace the device list supplied by device detection.
    pub fn set_devices(&self, devices: Vec<Device>) {
        *self.devices.write() = devices;
        self.refresh_derived();
        let catalog = self.catalog.read().clone();
        self.registry.merge_online(&catalog, &self.devices.read());
    }

    /// Load every plugin under the plugins root. Leftover staging
    /// directories from interrupted installs are deleted.
    ///
    /// Uses blocking filesystem calls; run it at startup or on the blocking
    /// pool.
    pub fn load_all(&self) -> Result<usize, DomainError> {
        fs::create_dir_all(&self.plugins_root)?;

        let mut loaded = BTreeMap::new();
        for entry in fs::read_dir(&self.plugins_root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            if name.starts_with(STAGING_PREFIX) {
                match fs::remove_dir_all(&path) {
                    Ok(()) => info!(dir = ?path, "Removed interrupted install"),
                    Err(e) => warn!(dir = ?path, error = %e, "Failed to remove interrupted install"),
                }
                continue;
            }

            for plugin in self.loader.load_dir(&path) {
                if let Some(previous) = loaded.insert(plugin.uuid().to_string(), plugin) {
                    warn!(plugin_uuid = %previous.uuid(), dir = ?path, "Duplicate plugin uuid");
                }
            }
        }

        let count = loaded.len();
        *self.plugins.write() = loaded;
        self.refresh_derived();

        info!(root = ?self.plugins_root, plugins = count, "Plugins loaded");
        Ok(count)
    }

    /// Fetch the online catalog and merge it into the registry. Failures
    /// leave the registry with local data only.
    pub async fn refresh_online(&self) -> usize {
        let catalog = match self.fetch_catalog().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(url = %self.catalog_url, error = %e, "Failed to fetch plugin catalog");
                return 0;
            }
        };

        let count = catalog.len();
        self.registry.merge_online(&catalog, &self.devices.read());
        *self.catalog.write() = catalog;
        info!(entries = count, "Plugin catalog refreshed");
        count
    }

    async fn fetch_catalog(&self) -> Result<Vec<PluginPackageInfo>, DomainError> {
        let body = self.http.get(&self.catalog_url).await?;
        let catalog: Vec<PluginPackageInfo> = serde_json::from_str(&body)?;
        Ok(catalog)
    }

    /// Install a catalog plugin.
    pub async fn install(
        &self,
        uuid: &str,
        progress: Option<InstallProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError> {
        let info = self
            .catalog
            .read()
            .iter()
            .find(|info| info.uuid == uuid)
            .cloned()
            .ok_or_else(|| DomainError::PluginNotFound(uuid.to_string()))?;

        let installed = self.installer.install(&info, progress, cancel).await?;
        {
            let mut plugins = self.plugins.write();
            plugins.remove(uuid);
            for plugin in installed {
                plugins.insert(plugin.uuid().to_string(), plugin);
            }
        }
        self.refresh_derived();
        Ok(())
    }

    /// Reinstall an installed plugin from the current catalog entry.
    pub async fn update(
        &self,
        uuid: &str,
        progress: Option<InstallProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError> {
        if !self.plugins.read().contains_key(uuid) {
            return Err(DomainError::PluginNotFound(uuid.to_string()));
        }
        self.install(uuid, progress, cancel).await
    }

    /// Unregister a plugin and delete its install directory.
    pub async fn remove(&self, uuid: &str) -> Result<(), DomainError> {
        let removed = self.plugins.write().remove(uuid);
        let Some(plugin) = removed else {
            return Err(DomainError::PluginNotFound(uuid.to_string()));
        };

        self.refresh_derived();
        self.registry.clear_local(uuid);

        let dir = plugin.dir().to_path_buf();
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(plugin_uuid = uuid, dir = ?dir, "Plugin removed");
        Ok(())
    }

    pub fn plugin(&self, uuid: &str) -> Option<Arc<InstalledPlugin>> {
        self.plugins.read().get(uuid).cloned()
    }

    pub fn installed(&self) -> Vec<Arc<InstalledPlugin>> {
        self.plugins.read().values().cloned().collect()
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn ranked_plugins(&self) -> Vec<PluginPackageInfoCR> {
        self.registry.ranked()
    }

    pub fn device_algorithms(&self) -> Vec<DeviceAlgorithms> {
        self.device_algorithms.read().clone()
    }

    /// Recompute device/algorithm support and the local registry half.
    fn refresh_derived(&self) {
        let installed = self.installed();
        let devices = self.devices.read().clone();

        let mut algorithms = Vec::new();
        for plugin in &installed {
            for (device_uuid, supported) in plugin.supported_algorithms(&devices) {
                algorithms.push(DeviceAlgorithms {
                    device_uuid,
                    plugin_uuid: plugin.uuid().to_string(),
                    algorithms: supported,
                });
            }
        }
        debug!(pairs = algorithms.len(), "Device algorithms recomputed");
        *self.device_algorithms.write() = algorithms;

        self.registry.merge_local(&installed);
    }
}
