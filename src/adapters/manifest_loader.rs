use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{DomainError, PluginManifest};
use crate::miners::{builtin_family, InstalledPlugin};
use crate::ports::PluginLoader;

pub const MANIFEST_FILE: &str = "plugin.json";

/// Loads plugins from `plugin.json` manifests, binding each one to a
/// built-in miner family.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestPluginLoader;

impl ManifestPluginLoader {
    pub fn new() -> Self {
        Self
    }

    fn read_manifest(dir: &Path) -> Result<PluginManifest, DomainError> {
        let content = fs::read_to_string(dir.join(MANIFEST_FILE))?;
        let manifest: PluginManifest = serde_json::from_str(&content)?;
        if manifest.uuid.trim().is_empty() {
            return Err(DomainError::Serialization(
                "manifest has an empty pluginUUID".to_string(),
            ));
        }
        Ok(manifest)
    }
}

impl PluginLoader for ManifestPluginLoader {
    fn load_dir(&self, dir: &Path) -> Vec<Arc<InstalledPlugin>> {
        if !dir.join(MANIFEST_FILE).is_file() {
            debug!(dir = ?dir, "No plugin manifest");
            return Vec::new();
        }

        let manifest = match Self::read_manifest(dir) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(dir = ?dir, error = %e, "Failed to read plugin manifest");
                return Vec::new();
            }
        };

        let Some(family) = builtin_family(&manifest.family) else {
            warn!(
                dir = ?dir,
                plugin_uuid = %manifest.uuid,
                family = %manifest.family,
                "Unknown miner family"
            );
            return Vec::new();
        };

        debug!(
            plugin_uuid = %manifest.uuid,
            family = family.name(),
            version = %manifest.version,
            "Plugin loaded"
        );
        vec![Arc::new(InstalledPlugin::new(
            manifest,
            dir.to_path_buf(),
            family,
        ))]
    }
}
