use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::DomainError;

/// What to launch. The argument string is an opaque rendered line; it is
/// split into argv on whitespace and never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub executable: PathBuf,
    pub working_dir: PathBuf,
    pub arguments: String,
}

impl LaunchSpec {
    pub fn new(executable: PathBuf, working_dir: PathBuf, arguments: impl Into<String>) -> Self {
        Self {
            executable,
            working_dir,
            arguments: arguments.into(),
        }
    }

    pub fn argv(&self) -> Vec<&str> {
        self.arguments.split_whitespace().collect()
    }
}

/// Result of a non-blocking read from the process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    Line(String),
    /// No line buffered right now; the process is still producing output.
    Pending,
    /// The output stream ended (the process exited).
    Closed,
}

/// Handle to one running miner process.
///
/// Output is the combined stdout/stderr line stream. It is finite (ends at
/// process exit) and cannot be restarted.
#[async_trait]
pub trait MinerProcess: Send {
    /// OS process id, if still known.
    fn id(&self) -> Option<u32>;

    /// Wait for the next output line. `None` once the stream is exhausted.
    async fn next_line(&mut self) -> Option<String>;

    /// Take an already-buffered line without waiting.
    fn try_next_line(&mut self) -> LineRead;

    /// Stop the process: graceful signal, wait up to the grace period, then
    /// hard kill. Returns only once the process is gone.
    async fn terminate(&mut self);
}

/// Port for starting miner processes.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Launch the executable. Fails with `DomainError::Launch` when the
    /// executable is missing or the OS refuses to start it.
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn MinerProcess>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argv_split() {
        let spec = LaunchSpec::new(
            PathBuf::from("/bin/miner"),
            PathBuf::from("/bin"),
            "  -a ethash  -o stratum+tcp://pool:3333 -d 0,1 ",
        );
        assert_eq!(
            spec.argv(),
            vec!["-a", "ethash", "-o", "stratum+tcp://pool:3333", "-d", "0,1"]
        );
    }
}
