use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{AlgorithmType, DeviceKind, DomainError};

/// `major.minor` plugin version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PluginVersion {
    pub major: u32,
    pub minor: u32,
}

impl PluginVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for PluginVersion {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::Serialization(format!("Invalid plugin version: {}", s));
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor = match parts.next() {
            Some(p) => p.parse().map_err(|_| invalid())?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for PluginVersion {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PluginVersion> for String {
    fn from(version: PluginVersion) -> Self {
        version.to_string()
    }
}

/// Description of a plugin package, either derived from an installed
/// adapter (local) or from the remote catalog (online).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginPackageInfo {
    #[serde(rename = "pluginUUID")]
    pub uuid: String,
    #[serde(rename = "pluginName", default)]
    pub name: String,
    #[serde(default)]
    pub version: PluginVersion,
    #[serde(default)]
    pub author: String,
    #[serde(rename = "packageURL", default)]
    pub package_url: Option<String>,
    #[serde(rename = "minerPackageURL", default)]
    pub miner_package_url: Option<String>,
    #[serde(rename = "pluginPackageSha256", default)]
    pub package_sha256: Option<String>,
    #[serde(rename = "minerPackageSha256", default)]
    pub miner_package_sha256: Option<String>,
    /// Device kind (`"CPU"`, `"NVIDIA"`, `"AMD"`) to supported algorithm names.
    #[serde(rename = "supportedDevicesAlgorithms", default)]
    pub supported_devices_algorithms: BTreeMap<String, Vec<String>>,
}

impl PluginPackageInfo {
    pub fn local(uuid: &str, name: &str, version: PluginVersion, author: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            name: name.to_string(),
            version,
            author: author.to_string(),
            package_url: None,
            miner_package_url: None,
            package_sha256: None,
            miner_package_sha256: None,
            supported_devices_algorithms: BTreeMap::new(),
        }
    }

    /// Whether the package declares non-empty algorithm support for `kind`.
    pub fn supports_device_kind(&self, kind: DeviceKind) -> bool {
        self.supported_devices_algorithms
            .get(kind.as_str())
            .map_or(false, |algos| !algos.is_empty())
    }
}

/// Cross-referenced plugin: the local and online halves keyed by uuid.
///
/// An entry with neither half is pruned from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginPackageInfoCR {
    pub uuid: String,
    pub local_info: Option<PluginPackageInfo>,
    pub online_info: Option<PluginPackageInfo>,
    pub online_supported_device_count: usize,
}

impl PluginPackageInfoCR {
    pub fn new(uuid: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            local_info: None,
            online_info: None,
            online_supported_device_count: 0,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.local_info.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.local_info.is_none() && self.online_info.is_none()
    }

    /// Installed and the catalog offers a newer version.
    pub fn has_newer_version(&self) -> bool {
        match (&self.local_info, &self.online_info) {
            (Some(local), Some(online)) => online.version > local.version,
            _ => false,
        }
    }

    pub fn name(&self) -> &str {
        self.local_info
            .as_ref()
            .or(self.online_info.as_ref())
            .map_or("", |info| info.name.as_str())
    }

    pub fn version(&self) -> Option<PluginVersion> {
        self.local_info
            .as_ref()
            .or(self.online_info.as_ref())
            .map(|info| info.version)
    }

    /// Ranking: newer version available first, then more supported devices,
    /// then name.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .has_newer_version()
            .cmp(&self.has_newer_version())
            .then_with(|| {
                other
                    .online_supported_device_count
                    .cmp(&self.online_supported_device_count)
            })
            .then_with(|| self.name().cmp(other.name()))
    }
}

/// Manifest shipped at the root of an installed plugin directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    #[serde(rename = "pluginUUID")]
    pub uuid: String,
    #[serde(rename = "pluginName")]
    pub name: String,
    pub version: PluginVersion,
    #[serde(default)]
    pub author: String,
    /// Built-in miner family that drives this plugin.
    pub family: String,
}

/// Algorithms a plugin can run on one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAlgorithms {
    pub device_uuid: String,
    pub plugin_uuid: String,
    pub algorithms: Vec<AlgorithmType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cr(name: &str, local: Option<(u32, u32)>, online: Option<(u32, u32)>, devices: usize) -> PluginPackageInfoCR {
        let mut entry = PluginPackageInfoCR::new(name);
        entry.local_info =
            local.map(|(ma, mi)| PluginPackageInfo::local(name, name, PluginVersion::new(ma, mi), ""));
        entry.online_info =
            online.map(|(ma, mi)| PluginPackageInfo::local(name, name, PluginVersion::new(ma, mi), ""));
        entry.online_supported_device_count = devices;
        entry
    }

    #[test]
    fn test_version_parse_and_order() {
        let v: PluginVersion = "1.2".parse().unwrap();
        assert_eq!(v, PluginVersion::new(1, 2));
        assert!(PluginVersion::new(1, 10) > PluginVersion::new(1, 2));
        assert_eq!("3".parse::<PluginVersion>().unwrap(), PluginVersion::new(3, 0));
        assert!("x.1".parse::<PluginVersion>().is_err());
    }

    #[test]
    fn test_has_newer_version() {
        assert!(cr("a", Some((1, 0)), Some((1, 1)), 0).has_newer_version());
        assert!(!cr("a", Some((1, 1)), Some((1, 1)), 0).has_newer_version());
        assert!(!cr("a", None, Some((2, 0)), 0).has_newer_version());
    }

    #[test]
    fn test_rank_update_before_device_count() {
        let a = cr("A", Some((1, 0)), Some((1, 1)), 2);
        let b = cr("B", Some((1, 1)), Some((1, 1)), 5);
        assert_eq!(a.rank_cmp(&b), Ordering::Less);
        assert_eq!(b.rank_cmp(&a), Ordering::Greater);
    }

    #[test]
    fn test_catalog_entry_tolerant() {
        let json = r#"{
            "pluginUUID": "d9e7ea80-4bfb-11e9-a481-e144ccd86993",
            "pluginName": "NBMiner",
            "version": "1.1",
            "packageURL": "https://example.com/plugin.zip",
            "supportedDevicesAlgorithms": {"NVIDIA": ["GrinCuckaroo29"], "AMD": []},
            "somethingNew": 42
        }"#;
        let info: PluginPackageInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.version, PluginVersion::new(1, 1));
        assert!(info.author.is_empty());
        assert!(info.supports_device_kind(DeviceKind::Nvidia));
        assert!(!info.supports_device_kind(DeviceKind::Amd));
        assert!(!info.supports_device_kind(DeviceKind::Cpu));
    }
}
