use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::domain::{Device, PluginPackageInfo, PluginPackageInfoCR};
use crate::miners::InstalledPlugin;

/// In-memory index of installed and catalog plugins, keyed by uuid.
///
/// Every operation takes the lock for one short, non-suspending section.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    entries: RwLock<BTreeMap<String, PluginPackageInfoCR>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the local half of every entry with the currently loaded
    /// plugins. Entries left with neither half are pruned.
    pub fn merge_local(&self, installed: &[Arc<InstalledPlugin>]) {
        let loaded: BTreeSet<&str> = installed.iter().map(|p| p.uuid()).collect();
        let mut entries = self.entries.write();

        for entry in entries.values_mut() {
            if !loaded.contains(entry.uuid.as_str()) {
                entry.local_info = None;
            }
        }
        for plugin in installed {
            entries
                .entry(plugin.uuid().to_string())
                .or_insert_with(|| PluginPackageInfoCR::new(plugin.uuid()))
                .local_info = Some(plugin.local_info());
        }

        entries.retain(|_, entry| !entry.is_empty());
        debug!(entries = entries.len(), installed = installed.len(), "Merged local plugins");
    }

    /// Set the online half for each catalog entry and count the present
    /// devices whose kind the entry supports.
    pub fn merge_online(&self, catalog: &[PluginPackageInfo], devices: &[Device]) {
        let mut entries = self.entries.write();
        for info in catalog {
            let supported = devices
                .iter()
                .filter(|d| info.supports_device_kind(d.kind))
                .count();
            let entry = entries
                .entry(info.uuid.clone())
                .or_insert_with(|| PluginPackageInfoCR::new(&info.uuid));
            entry.online_info = Some(info.clone());
            entry.online_supported_device_count = supported;
        }
        debug!(entries = entries.len(), catalog = catalog.len(), "Merged online catalog");
    }

    /// Drop the local half of `uuid`, pruning the entry if nothing is left.
    pub fn clear_local(&self, uuid: &str) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(uuid) {
            entry.local_info = None;
            if entry.is_empty() {
                entries.remove(uuid);
            }
        }
    }

    pub fn get(&self, uuid: &str) -> Option<PluginPackageInfoCR> {
        self.entries.read().get(uuid).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Updatable plugins first, then by supported device count, then name.
    pub fn ranked(&self) -> Vec<PluginPackageInfoCR> {
        let mut ranked: Vec<PluginPackageInfoCR> = self.entries.read().values().cloned().collect();
        ranked.sort_by(|a, b| a.rank_cmp(b));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeviceKind, PluginManifest, PluginVersion};
    use crate::miners::testing::device;
    use crate::miners::{builtin_family, nbminer};
    use std::path::PathBuf;

    fn installed(uuid: &str, name: &str, version: PluginVersion) -> Arc<InstalledPlugin> {
        let manifest = PluginManifest {
            uuid: uuid.to_string(),
            name: name.to_string(),
            version,
            author: String::new(),
            family: nbminer::FAMILY.to_string(),
        };
        Arc::new(InstalledPlugin::new(
            manifest,
            PathBuf::from("/nonexistent").join(uuid),
            builtin_family(nbminer::FAMILY).unwrap(),
        ))
    }

    fn online(uuid: &str, name: &str, version: PluginVersion, kinds: &[&str]) -> PluginPackageInfo {
        let mut info = PluginPackageInfo::local(uuid, name, version, "");
        for kind in kinds {
            info.supported_devices_algorithms
                .insert(kind.to_string(), vec!["DaggerHashimoto".to_string()]);
        }
        info
    }

    #[test]
    fn test_update_available_ranks_first() {
        let registry = PluginRegistry::new();
        registry.merge_local(&[
            installed("a", "A", PluginVersion::new(1, 0)),
            installed("b", "B", PluginVersion::new(1, 1)),
        ]);

        let devices: Vec<Device> = (0..5).map(|id| device(id, DeviceKind::Nvidia, 8)).collect();
        registry.merge_online(&[online("a", "A", PluginVersion::new(1, 1), &["NVIDIA"])], &devices[..2]);
        registry.merge_online(&[online("b", "B", PluginVersion::new(1, 1), &["NVIDIA"])], &devices);

        let ranked = registry.ranked();
        assert_eq!(ranked[0].uuid, "a");
        assert_eq!(ranked[0].online_supported_device_count, 2);
        assert_eq!(ranked[1].uuid, "b");
        assert_eq!(ranked[1].online_supported_device_count, 5);
    }

    #[test]
    fn test_device_count_uses_kinds_with_algorithms() {
        let registry = PluginRegistry::new();
        let mut info = online("x", "X", PluginVersion::new(1, 0), &["AMD"]);
        info.supported_devices_algorithms.insert("NVIDIA".to_string(), Vec::new());

        let devices = vec![
            device(0, DeviceKind::Amd, 8),
            device(1, DeviceKind::Amd, 8),
            device(0, DeviceKind::Nvidia, 8),
            device(0, DeviceKind::Cpu, 16),
        ];
        registry.merge_online(&[info], &devices);
        assert_eq!(registry.get("x").unwrap().online_supported_device_count, 2);
    }

    #[test]
    fn test_local_only_entry_pruned_when_unloaded() {
        let registry = PluginRegistry::new();
        registry.merge_local(&[
            installed("a", "A", PluginVersion::new(1, 0)),
            installed("b", "B", PluginVersion::new(1, 0)),
        ]);
        registry.merge_online(&[online("b", "B", PluginVersion::new(1, 0), &[])], &[]);

        registry.merge_local(&[]);
        assert!(registry.get("a").is_none());
        let b = registry.get("b").unwrap();
        assert!(!b.is_installed());
        assert!(b.online_info.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clear_local() {
        let registry = PluginRegistry::new();
        registry.merge_local(&[installed("a", "A", PluginVersion::new(1, 0))]);
        registry.clear_local("a");
        assert!(registry.is_empty());
        registry.clear_local("missing");
    }

    #[test]
    fn test_ties_break_by_name() {
        let registry = PluginRegistry::new();
        registry.merge_online(
            &[
                online("2", "Zeta", PluginVersion::new(1, 0), &[]),
                online("1", "Alpha", PluginVersion::new(1, 0), &[]),
            ],
            &[],
        );
        let names: Vec<String> = registry.ranked().iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }
}
