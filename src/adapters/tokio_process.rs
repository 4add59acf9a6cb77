use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, trace, warn};

use crate::domain::DomainError;
use crate::ports::{LaunchSpec, LineRead, MinerProcess, ProcessLauncher};

/// Output lines buffered per process. Once full, further lines are read
/// from the pipe and discarded until the consumer catches up.
pub const OUTPUT_BUFFER_LINES: usize = 1024;

/// Launches miners as tokio child processes with piped output.
pub struct TokioProcessLauncher {
    /// How long `terminate` waits after the graceful signal.
    grace: Duration,
    buffer_lines: usize,
}

impl TokioProcessLauncher {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            buffer_lines: OUTPUT_BUFFER_LINES,
        }
    }

    pub fn with_buffer_lines(mut self, lines: usize) -> Self {
        self.buffer_lines = lines.max(1);
        self
    }
}

impl Default for TokioProcessLauncher {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[async_trait]
impl ProcessLauncher for TokioProcessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn MinerProcess>, DomainError> {
        let path = spec.executable.display().to_string();
        if !spec.executable.is_file() {
            return Err(DomainError::Launch {
                path,
                reason: "executable not found".to_string(),
            });
        }

        info!(executable = %path, args = %spec.arguments, "Launching miner process");

        let mut child = Command::new(&spec.executable)
            .args(spec.argv())
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DomainError::Launch {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let pid = child.id();
        let (tx, rx) = mpsc::channel(self.buffer_lines);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, tx.clone());
        }
        // The channel closes once both readers hit EOF.
        drop(tx);

        debug!(pid = ?pid, executable = %path, "Miner process started");
        Ok(Box::new(TokioMinerProcess {
            child,
            pid,
            lines: rx,
            grace: self.grace,
            terminated: false,
        }))
    }
}

/// Forward output lines to `tx`. Invalid UTF-8 is replaced rather than
/// ending the stream. Lines that arrive while the buffer is full are dropped
/// so the pipe keeps draining.
fn spawn_line_reader<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut dropped: u64 = 0;
        let mut segments = BufReader::new(reader).split(b'\n');
        while let Ok(Some(segment)) = segments.next_segment().await {
            let line = String::from_utf8_lossy(&segment);
            let line = line.trim_end_matches('\r').to_string();
            match tx.try_send(line) {
                Ok(()) => {}
                Err(TrySendError::Full(line)) => {
                    if dropped == 0 {
                        debug!("Miner output buffer full, dropping lines");
                    }
                    dropped += 1;
                    trace!(line = %line, "Dropped miner output");
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
        if dropped > 0 {
            debug!(dropped = dropped, "Miner output reader finished");
        }
    });
}

/// A running miner child process.
pub struct TokioMinerProcess {
    child: Child,
    pid: Option<u32>,
    lines: mpsc::Receiver<String>,
    grace: Duration,
    terminated: bool,
}

#[async_trait]
impl MinerProcess for TokioMinerProcess {
    fn id(&self) -> Option<u32> {
        if self.terminated {
            None
        } else {
            self.pid
        }
    }

    async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    fn try_next_line(&mut self) -> LineRead {
        match self.lines.try_recv() {
            Ok(line) => LineRead::Line(line),
            Err(mpsc::error::TryRecvError::Empty) => LineRead::Pending,
            Err(mpsc::error::TryRecvError::Disconnected) => LineRead::Closed,
        }
    }

    async fn terminate(&mut self) {
        if self.terminated {
            return;
        }

        // Already exited on its own.
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!(pid = ?self.pid, status = %status, "Miner process already exited");
            self.terminated = true;
            return;
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            if let Some(pid) = self.pid {
                debug!(pid = pid, "Sending SIGTERM");
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(pid = ?self.pid, status = %status, "Miner process stopped");
            }
            Ok(Err(e)) => {
                error!(pid = ?self.pid, error = %e, "Error waiting for miner process");
                self.kill().await;
            }
            Err(_) => {
                warn!(
                    pid = ?self.pid,
                    grace_ms = self.grace.as_millis() as u64,
                    "Miner process ignored graceful stop, killing"
                );
                self.kill().await;
            }
        }

        match self.child.try_wait() {
            Ok(Some(_)) => self.terminated = true,
            Ok(None) => error!(pid = ?self.pid, "Miner process still running after kill"),
            Err(e) => error!(pid = ?self.pid, error = %e, "Failed to confirm miner process exit"),
        }
    }
}

impl TokioMinerProcess {
    /// Hard kill and reap.
    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            error!(pid = ?self.pid, error = %e, "Failed to kill miner process");
        }
    }
}

impl Drop for TokioMinerProcess {
    fn drop(&mut self) {
        if !self.terminated {
            warn!(pid = ?self.pid, "Miner process handle dropped while running, killing");
        }
    }
}
