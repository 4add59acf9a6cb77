//! Built-in miner families and the installed-plugin wrapper that binds a
//! plugin directory to one of them.

pub mod cpuminer;
pub mod ewbf;
pub mod nbminer;
pub mod plugin;
pub mod sgminer;

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::DomainError;
use crate::ports::MinerFamily;

pub use cpuminer::CpuMinerFamily;
pub use ewbf::EwbfFamily;
pub use nbminer::NbMinerFamily;
pub use plugin::InstalledPlugin;
pub use sgminer::SgminerFamily;

/// Family keys accepted in `plugin.json`.
pub const FAMILY_NAMES: [&str; 4] = [
    cpuminer::FAMILY,
    sgminer::FAMILY,
    ewbf::FAMILY,
    nbminer::FAMILY,
];

/// Fresh instance of the named family. Each plugin gets its own instance
/// since some families keep per-plugin device mappings.
pub fn builtin_family(name: &str) -> Option<Arc<dyn MinerFamily>> {
    let family: Arc<dyn MinerFamily> = match name.to_ascii_lowercase().as_str() {
        cpuminer::FAMILY => Arc::new(CpuMinerFamily),
        sgminer::FAMILY => Arc::new(SgminerFamily),
        ewbf::FAMILY => Arc::new(EwbfFamily),
        nbminer::FAMILY => Arc::new(NbMinerFamily::new()),
        _ => return None,
    };
    Some(family)
}

static HASHRATE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*([A-Za-z]*)").ok());

/// Parse the first number following `marker` and scale it to H/s by its
/// unit (`H`, `kH`, `MH`, `GH`, `TH`; `Sol` and unknown units count as 1).
pub fn hashrate_after(line: &str, marker: &str) -> Option<f64> {
    let start = line.find(marker)? + marker.len();
    let captures = HASHRATE.as_ref()?.captures(&line[start..])?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2).map_or("", |m| m.as_str());
    Some(value * unit_multiplier(unit))
}

fn unit_multiplier(unit: &str) -> f64 {
    match unit.to_ascii_lowercase().as_str() {
        "kh" | "khs" => 1e3,
        "mh" | "mhs" => 1e6,
        "gh" | "ghs" => 1e9,
        "th" | "ths" => 1e12,
        _ => 1.0,
    }
}

/// Split a location URL into host and port, dropping any scheme.
pub(crate) fn host_and_port(location_url: &str) -> Result<(&str, u16), DomainError> {
    let without_scheme = location_url
        .split_once("://")
        .map_or(location_url, |(_, rest)| rest);
    let authority = without_scheme.split('/').next().unwrap_or(without_scheme);
    let (host, port) = authority.rsplit_once(':').ok_or_else(|| {
        DomainError::Initialization(format!("location URL has no port: {}", location_url))
    })?;
    let port = port.parse().map_err(|_| {
        DomainError::Initialization(format!("invalid port in location URL: {}", location_url))
    })?;
    Ok((host, port))
}

/// Join non-empty argument fragments with single spaces.
pub(crate) fn join_args(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
