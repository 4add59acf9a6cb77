use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::domain::{AppConfig, DomainError};
use crate::ports::ConfigStore;

const APP_DIR: &str = "MinerHost";

/// TOML-based configuration store with OS-specific paths.
pub struct TomlConfigStore {
    data_dir: PathBuf,
    logs_dir: Option<PathBuf>,
}

impl TomlConfigStore {
    /// Create a store in the OS application data directory, with logs in
    /// the OS log location.
    pub fn new() -> Result<Self, DomainError> {
        let mut store = Self::with_data_dir(Self::get_data_dir()?)?;
        store.logs_dir = None;
        Ok(store)
    }

    /// Create a store rooted at `data_dir`; logs go to `data_dir/logs`.
    pub fn with_data_dir(data_dir: PathBuf) -> Result<Self, DomainError> {
        fs::create_dir_all(&data_dir)?;
        info!(data_dir = ?data_dir, "ConfigStore initialized");

        let logs_dir = Some(data_dir.join("logs"));
        Ok(Self { data_dir, logs_dir })
    }

    /// OS-specific application data directory.
    /// - macOS: ~/Library/Application Support/MinerHost/
    /// - Windows: %APPDATA%\MinerHost\
    /// - Linux: ~/.config/MinerHost/
    fn get_data_dir() -> Result<PathBuf, DomainError> {
        #[cfg(target_os = "macos")]
        let base = dirs::data_dir();

        #[cfg(not(target_os = "macos"))]
        let base = dirs::config_dir();

        base.map(|p| p.join(APP_DIR)).ok_or_else(|| {
            DomainError::Config("Could not find application data directory".to_string())
        })
    }

    /// OS-specific log directory.
    /// - macOS: ~/Library/Application Support/MinerHost/logs/
    /// - Windows: %LOCALAPPDATA%\MinerHost\logs\
    /// - Linux: ~/.local/share/MinerHost/logs/
    fn os_logs_dir(&self) -> PathBuf {
        #[cfg(target_os = "windows")]
        let base = dirs::data_local_dir();

        #[cfg(target_os = "linux")]
        let base = dirs::data_dir();

        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        let base: Option<PathBuf> = None;

        base.map(|p| p.join(APP_DIR).join("logs"))
            .unwrap_or_else(|| self.data_dir.join("logs"))
    }
}

impl ConfigStore for TomlConfigStore {
    fn load(&self) -> Result<AppConfig, DomainError> {
        let config_path = self.config_path();

        if config_path.exists() {
            debug!(path = ?config_path, "Loading configuration");
            let content = fs::read_to_string(&config_path)?;
            let config: AppConfig = toml::from_str(&content)?;
            info!(path = ?config_path, "Configuration loaded");
            Ok(config)
        } else {
            info!(path = ?config_path, "Configuration file not found, creating default");
            let config = AppConfig::new();
            self.save(&config)?;
            Ok(config)
        }
    }

    fn save(&self, config: &AppConfig) -> Result<(), DomainError> {
        let config_path = self.config_path();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&config_path, content)?;

        info!(path = ?config_path, "Configuration saved");
        Ok(())
    }

    fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    fn logs_dir(&self) -> PathBuf {
        match &self.logs_dir {
            Some(dir) => dir.clone(),
            None => self.os_logs_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_store_paths() {
        let temp = TempDir::new().unwrap();
        let store = TomlConfigStore::with_data_dir(temp.path().to_path_buf()).unwrap();

        assert!(store.config_path().ends_with("config.toml"));
        assert_eq!(store.logs_dir(), temp.path().join("logs"));

        let config = AppConfig::new();
        assert_eq!(
            store.plugins_dir(&config),
            temp.path().join("miner_plugins")
        );
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let temp = TempDir::new().unwrap();
        let store = TomlConfigStore::with_data_dir(temp.path().to_path_buf()).unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.api_ports.start, 4000);
        assert!(store.config_path().exists());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = TomlConfigStore::with_data_dir(temp.path().to_path_buf()).unwrap();

        let mut config = AppConfig::new();
        config.network.offline = true;
        config.logging.level = "debug".to_string();
        config.plugins.plugins_dir = Some(temp.path().join("custom"));
        config
            .dev_fees
            .0
            .entry("nbminer".to_string())
            .or_default()
            .insert("GrinCuckaroo29".to_string(), 1.5);

        store.save(&config).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.network.offline);
        assert_eq!(loaded.logging.level, "debug");
        assert_eq!(store.plugins_dir(&loaded), temp.path().join("custom"));
        assert_eq!(
            loaded
                .dev_fees
                .fee("nbminer", crate::domain::AlgorithmType::GrinCuckaroo29),
            Some(1.5)
        );
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let store = TomlConfigStore::with_data_dir(temp.path().to_path_buf()).unwrap();
        fs::write(store.config_path(), "[benchmark]\ngrace_secs = 9\n").unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.benchmark.grace_secs, 9);
        assert_eq!(loaded.benchmark.poll_interval_ms, 500);
        assert_eq!(loaded.telemetry.timeout_ms, 2000);
    }
}
