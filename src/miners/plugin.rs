use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{
    AlgorithmType, Device, MinerOptionsPackage, PluginManifest, PluginPackageInfo, PluginVersion,
};
use crate::ports::MinerFamily;

/// Override file for the options package, relative to the plugin directory.
pub const OPTIONS_PACKAGE_FILE: &str = "internals/MinerOptionsPackage.json";
pub const BINS_DIR: &str = "bins";

/// A plugin directory bound to the miner family that drives it.
pub struct InstalledPlugin {
    manifest: PluginManifest,
    dir: PathBuf,
    family: Arc<dyn MinerFamily>,
    options: MinerOptionsPackage,
}

impl InstalledPlugin {
    pub fn new(manifest: PluginManifest, dir: PathBuf, family: Arc<dyn MinerFamily>) -> Self {
        let options = load_options_package(&dir).unwrap_or_else(|| family.default_options());
        Self {
            manifest,
            dir,
            family,
            options,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.manifest.uuid
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn version(&self) -> PluginVersion {
        self.manifest.version
    }

    pub fn author(&self) -> &str {
        &self.manifest.author
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn family(&self) -> &Arc<dyn MinerFamily> {
        &self.family
    }

    pub fn options_package(&self) -> &MinerOptionsPackage {
        &self.options
    }

    pub fn bins_dir(&self) -> PathBuf {
        self.dir.join(BINS_DIR)
    }

    pub fn executable_path(&self) -> PathBuf {
        self.bins_dir().join(format!(
            "{}{}",
            self.family.executable_name(),
            std::env::consts::EXE_SUFFIX
        ))
    }

    pub fn supported_algorithms(&self, devices: &[Device]) -> BTreeMap<String, Vec<AlgorithmType>> {
        self.family.supported_algorithms(devices)
    }

    /// Local half of the registry entry for this plugin.
    pub fn local_info(&self) -> PluginPackageInfo {
        PluginPackageInfo::local(self.uuid(), self.name(), self.version(), self.author())
    }
}

impl std::fmt::Debug for InstalledPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstalledPlugin")
            .field("uuid", &self.manifest.uuid)
            .field("family", &self.family.name())
            .field("dir", &self.dir)
            .finish()
    }
}

fn load_options_package(dir: &Path) -> Option<MinerOptionsPackage> {
    let path = dir.join(OPTIONS_PACKAGE_FILE);
    if !path.exists() {
        return None;
    }

    let parsed = std::fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|content| {
            serde_json::from_str::<MinerOptionsPackage>(&content).map_err(|e| e.to_string())
        });
    match parsed {
        Ok(package) => {
            debug!(path = ?path, "Loaded options package override");
            Some(package)
        }
        Err(e) => {
            warn!(path = ?path, error = %e, "Ignoring invalid options package");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MinerOption;
    use crate::miners::{builtin_family, sgminer};
    use tempfile::TempDir;

    fn manifest() -> PluginManifest {
        PluginManifest {
            uuid: "sg-uuid".to_string(),
            name: "SGminer".to_string(),
            version: PluginVersion::new(1, 3),
            author: "info@example.com".to_string(),
            family: sgminer::FAMILY.to_string(),
        }
    }

    fn plugin(dir: &Path) -> InstalledPlugin {
        let family = builtin_family(sgminer::FAMILY).unwrap();
        InstalledPlugin::new(manifest(), dir.to_path_buf(), family)
    }

    #[test]
    fn test_paths() {
        let temp = TempDir::new().unwrap();
        let plugin = plugin(temp.path());
        assert_eq!(plugin.bins_dir(), temp.path().join("bins"));
        assert!(plugin
            .executable_path()
            .starts_with(temp.path().join("bins")));
        assert!(plugin
            .executable_path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("sgminer"));
    }

    #[test]
    fn test_default_options_without_override() {
        let temp = TempDir::new().unwrap();
        let plugin = plugin(temp.path());
        assert_eq!(
            plugin.options_package(),
            &plugin.family().default_options()
        );
    }

    #[test]
    fn test_options_override_loaded() {
        let temp = TempDir::new().unwrap();
        let package = MinerOptionsPackage {
            general_options: vec![MinerOption::flag("RemoveDisabled", "--remove-disabled")],
            temperature_options: Vec::new(),
        };
        std::fs::create_dir_all(temp.path().join("internals")).unwrap();
        std::fs::write(
            temp.path().join(OPTIONS_PACKAGE_FILE),
            serde_json::to_string(&package).unwrap(),
        )
        .unwrap();

        assert_eq!(plugin(temp.path()).options_package(), &package);
    }

    #[test]
    fn test_invalid_override_falls_back() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("internals")).unwrap();
        std::fs::write(temp.path().join(OPTIONS_PACKAGE_FILE), "{ broken").unwrap();

        let plugin = plugin(temp.path());
        assert_eq!(plugin.options_package().temperature_options.len(), 6);
    }

    #[test]
    fn test_local_info() {
        let temp = TempDir::new().unwrap();
        let info = plugin(temp.path()).local_info();
        assert_eq!(info.uuid, "sg-uuid");
        assert_eq!(info.version, PluginVersion::new(1, 3));
        assert!(info.package_url.is_none());
    }
}
