use serde::{Deserialize, Serialize};

/// Install job state machine.
///
/// `Started -> DownloadingPlugin -> ExtractingPlugin -> DownloadingMiner ->
/// ExtractingMiner -> Installed`, with any step able to end in `Aborted`
/// (cancellation) or `Failed` (error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallPhase {
    Started,
    DownloadingPlugin,
    ExtractingPlugin,
    DownloadingMiner,
    ExtractingMiner,
    Installed,
    Aborted,
    Failed,
}

impl InstallPhase {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstallPhase::Installed | InstallPhase::Aborted | InstallPhase::Failed
        )
    }
}

/// Progress report for an install job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallProgress {
    pub plugin_uuid: String,
    pub phase: InstallPhase,
    /// 0 - 100.
    pub percent: u8,
}

impl InstallProgress {
    pub fn new(plugin_uuid: &str, phase: InstallPhase, percent: u8) -> Self {
        Self {
            plugin_uuid: plugin_uuid.to_string(),
            phase,
            percent: percent.min(100),
        }
    }
}

/// Percentage of `done` over `total`, 0 when the total is unknown.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done.min(total) as f64 / total as f64) * 100.0) as u8
}
