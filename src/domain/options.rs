use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::MiningPairing;

/// How a command-line option takes its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MinerOptionKind {
    /// The option is a bare token, e.g. `--remove-disabled`.
    FlagOnly,
    /// One value for the whole process, e.g. `--cpu-priority 3`.
    SingleValue,
    /// One value per device joined by `delimiter`, e.g. `-I 20,d`.
    MultiValue { delimiter: String },
}

/// Declarative description of one command-line flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerOption {
    pub id: String,
    pub kind: MinerOptionKind,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub long_name: String,
    #[serde(default)]
    pub default_value: Option<String>,
}

impl MinerOption {
    pub fn flag(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: MinerOptionKind::FlagOnly,
            short_name: name.to_string(),
            long_name: name.to_string(),
            default_value: None,
        }
    }

    pub fn single(id: &str, short_name: &str, long_name: &str, default: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            kind: MinerOptionKind::SingleValue,
            short_name: short_name.to_string(),
            long_name: long_name.to_string(),
            default_value: default.map(str::to_string),
        }
    }

    pub fn multi(id: &str, short_name: &str, long_name: &str, default: &str, delimiter: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: MinerOptionKind::MultiValue {
                delimiter: delimiter.to_string(),
            },
            short_name: short_name.to_string(),
            long_name: long_name.to_string(),
            default_value: Some(default.to_string()),
        }
    }

    /// Name printed on the command line. Short name wins when both exist.
    pub fn token(&self) -> &str {
        if self.short_name.is_empty() {
            &self.long_name
        } else {
            &self.short_name
        }
    }
}

/// Option tables shipped with a miner family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerOptionsPackage {
    pub general_options: Vec<MinerOption>,
    pub temperature_options: Vec<MinerOption>,
}

/// User configuration for one selected option.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionSelection {
    /// Explicit value for single-value options, and the fallback for
    /// multi-value options when a device has no value of its own.
    pub value: Option<String>,
    /// Per-device values for multi-value options, keyed by device id.
    pub per_device: BTreeMap<u32, String>,
}

/// The options table: which options are selected and with what values.
///
/// Options absent from the table are not rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaunchOptions {
    selected: BTreeMap<String, OptionSelection>,
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select an option with no explicit value.
    pub fn select(mut self, id: &str) -> Self {
        self.selected.entry(id.to_string()).or_default();
        self
    }

    /// Select an option with a process-wide value.
    pub fn set(mut self, id: &str, value: &str) -> Self {
        self.selected.entry(id.to_string()).or_default().value = Some(value.to_string());
        self
    }

    /// Select a multi-value option and set the value for one device.
    pub fn set_for_device(mut self, id: &str, device_id: u32, value: &str) -> Self {
        self.selected
            .entry(id.to_string())
            .or_default()
            .per_device
            .insert(device_id, value.to_string());
        self
    }

    pub fn get(&self, id: &str) -> Option<&OptionSelection> {
        self.selected.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Render the launch arguments for `options` over the given pairings.
///
/// Pairings are sorted by device id first, so the output does not depend on
/// input order. Options render in table order; ids in `launch` that the
/// table does not declare are ignored.
pub fn render_options(
    pairings: &[MiningPairing],
    options: &[MinerOption],
    launch: &LaunchOptions,
) -> String {
    let mut device_ids: Vec<u32> = pairings.iter().map(|p| p.device.id).collect();
    device_ids.sort_unstable();
    device_ids.dedup();

    let mut parts = Vec::new();
    for option in options {
        let Some(selection) = launch.get(&option.id) else {
            continue;
        };

        match &option.kind {
            MinerOptionKind::FlagOnly => {
                if !option.token().is_empty() {
                    parts.push(option.token().to_string());
                }
            }
            MinerOptionKind::SingleValue => {
                let value = selection.value.as_ref().or(option.default_value.as_ref());
                if let Some(value) = value {
                    parts.push(join_name_value(option.token(), value));
                }
            }
            MinerOptionKind::MultiValue { delimiter } => {
                if device_ids.is_empty() {
                    continue;
                }
                let fallback = selection.value.as_ref().or(option.default_value.as_ref());
                let values: Option<Vec<&str>> = device_ids
                    .iter()
                    .map(|id| {
                        selection
                            .per_device
                            .get(id)
                            .or(fallback)
                            .map(String::as_str)
                    })
                    .collect();
                // A device without any value (and no default) makes the
                // option unrenderable.
                if let Some(values) = values {
                    parts.push(join_name_value(option.token(), &values.join(delimiter)));
                }
            }
        }
    }

    parts.join(" ")
}

/// Render a whole options package: general options then temperature options.
pub fn render_package(
    pairings: &[MiningPairing],
    package: &MinerOptionsPackage,
    launch: &LaunchOptions,
) -> String {
    let general = render_options(pairings, &package.general_options, launch);
    let temperature = render_options(pairings, &package.temperature_options, launch);
    format!("{} {}", general, temperature).trim().to_string()
}

fn join_name_value(name: &str, value: &str) -> String {
    if name.ends_with('=') {
        format!("{}{}", name, value)
    } else {
        format!("{} {}", name, value)
    }
}
