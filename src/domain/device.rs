use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::DomainError;

/// Payout address used for benchmark runs. Shares mined with it earn nothing.
pub const DEMO_USER: &str = "33hGFJZQAfbdzyHGqhJPvZwncDjUBdZqjW";

/// Device family.
///
/// The display string is the key used by the online catalog in its
/// `supportedDevicesAlgorithms` map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceKind {
    Cpu,
    Nvidia,
    Amd,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Cpu => "CPU",
            DeviceKind::Nvidia => "NVIDIA",
            DeviceKind::Amd => "AMD",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compute device as enumerated by the device-detection collaborator.
///
/// Immutable after enumeration; the core only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Per-kind index used on miner command lines.
    pub id: u32,
    /// Globally unique identity.
    pub uuid: String,
    pub kind: DeviceKind,
    pub name: String,
    /// Device memory in bytes (system RAM for CPUs).
    pub memory_bytes: u64,
    /// OpenCL platform index, for devices that have one.
    pub platform: Option<u32>,
}

impl Device {
    pub fn new(id: u32, uuid: impl Into<String>, kind: DeviceKind, memory_bytes: u64) -> Self {
        Self {
            id,
            uuid: uuid.into(),
            kind,
            name: String::new(),
            memory_bytes,
            platform: None,
        }
    }
}

/// Hashing algorithm tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlgorithmType {
    NeoScrypt,
    Keccak,
    DaggerHashimoto,
    X16R,
    GrinCuckaroo29,
    GrinCuckatoo31,
    Lyra2Z,
    ZHash,
    CryptoNightHeavy,
    CryptoNightV8,
    Lyra2REv3,
    #[serde(rename = "MTP")]
    Mtp,
}

impl AlgorithmType {
    pub const ALL: [AlgorithmType; 12] = [
        AlgorithmType::NeoScrypt,
        AlgorithmType::Keccak,
        AlgorithmType::DaggerHashimoto,
        AlgorithmType::X16R,
        AlgorithmType::GrinCuckaroo29,
        AlgorithmType::GrinCuckatoo31,
        AlgorithmType::Lyra2Z,
        AlgorithmType::ZHash,
        AlgorithmType::CryptoNightHeavy,
        AlgorithmType::CryptoNightV8,
        AlgorithmType::Lyra2REv3,
        AlgorithmType::Mtp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmType::NeoScrypt => "NeoScrypt",
            AlgorithmType::Keccak => "Keccak",
            AlgorithmType::DaggerHashimoto => "DaggerHashimoto",
            AlgorithmType::X16R => "X16R",
            AlgorithmType::GrinCuckaroo29 => "GrinCuckaroo29",
            AlgorithmType::GrinCuckatoo31 => "GrinCuckatoo31",
            AlgorithmType::Lyra2Z => "Lyra2Z",
            AlgorithmType::ZHash => "ZHash",
            AlgorithmType::CryptoNightHeavy => "CryptoNightHeavy",
            AlgorithmType::CryptoNightV8 => "CryptoNightV8",
            AlgorithmType::Lyra2REv3 => "Lyra2REv3",
            AlgorithmType::Mtp => "MTP",
        }
    }
}

impl fmt::Display for AlgorithmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlgorithmType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlgorithmType::ALL
            .iter()
            .find(|a| a.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| DomainError::Config(format!("Unknown algorithm: {}", s)))
    }
}

/// A (device, algorithm) assignment within one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningPairing {
    pub device: Device,
    pub algorithm: AlgorithmType,
}

impl MiningPairing {
    pub fn new(device: Device, algorithm: AlgorithmType) -> Self {
        Self { device, algorithm }
    }
}

/// Immutable description of one mining or benchmark session.
///
/// Invariants: pairings are non-empty, unique per device, sorted by device
/// id, and all share the same algorithm.
#[derive(Debug, Clone)]
pub struct MiningSession {
    pairings: Vec<MiningPairing>,
    algorithm: AlgorithmType,
    location_url: String,
    username: String,
}

impl MiningSession {
    pub fn new(
        pairings: Vec<MiningPairing>,
        location_url: impl Into<String>,
        username: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let mut seen = BTreeSet::new();
        let mut pairings: Vec<MiningPairing> = pairings
            .into_iter()
            .filter(|p| seen.insert(p.device.uuid.clone()))
            .collect();

        let algorithm = single_algorithm(&pairings)?;
        pairings.sort_by_key(|p| p.device.id);

        Ok(Self {
            pairings,
            algorithm,
            location_url: location_url.into(),
            username: username.into(),
        })
    }

    /// Pairings ordered by device id.
    pub fn pairings(&self) -> &[MiningPairing] {
        &self.pairings
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.pairings.iter().map(|p| &p.device)
    }

    pub fn algorithm(&self) -> AlgorithmType {
        self.algorithm
    }

    pub fn location_url(&self) -> &str {
        &self.location_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Comma-joined device ids, in id order.
    pub fn device_ids(&self, separator: &str) -> String {
        self.pairings
            .iter()
            .map(|p| p.device.id.to_string())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

/// Resolve the one algorithm shared by every pairing.
pub fn single_algorithm(pairings: &[MiningPairing]) -> Result<AlgorithmType, DomainError> {
    let first = pairings
        .first()
        .ok_or_else(|| DomainError::Initialization("no mining pairings".to_string()))?
        .algorithm;

    if let Some(other) = pairings.iter().find(|p| p.algorithm != first) {
        return Err(DomainError::Initialization(format!(
            "session mixes algorithms {} and {}",
            first, other.algorithm
        )));
    }

    Ok(first)
}
