pub mod benchmark;
pub mod controller;
pub mod installer;
pub mod miner;
pub mod plugin_manager;
pub mod registry;
pub mod stats_poller;

pub use benchmark::BenchmarkEngine;
pub use controller::AppController;
pub use installer::{InstallProgressFn, PackageInstaller};
pub use miner::{Miner, MinerServices};
pub use plugin_manager::PluginManager;
pub use registry::PluginRegistry;
pub use stats_poller::StatsPoller;

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{BTreeMap, VecDeque};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::time::{sleep_until, Instant};
    use tokio_util::sync::CancellationToken;

    use crate::domain::DomainError;
    use crate::ports::{
        DownloadProgressFn, HttpClient, LaunchSpec, LineRead, MinerProcess, ProcessLauncher,
    };

    /// Fake miner process that emits scripted lines at fixed offsets from
    /// its creation time.
    pub(crate) struct ScriptedProcess {
        started: Instant,
        lines: VecDeque<(Duration, String)>,
        closes: bool,
        terminated: Arc<AtomicBool>,
    }

    impl ScriptedProcess {
        /// `script` holds `(seconds after start, line)`. When `closes` is
        /// set the output ends after the last line; otherwise it stays open.
        pub(crate) fn new(script: &[(u64, &str)], closes: bool) -> (Self, Arc<AtomicBool>) {
            let terminated = Arc::new(AtomicBool::new(false));
            (
                Self::with_flag(script, closes, Arc::clone(&terminated)),
                terminated,
            )
        }

        fn with_flag(script: &[(u64, &str)], closes: bool, terminated: Arc<AtomicBool>) -> Self {
            Self {
                started: Instant::now(),
                lines: script
                    .iter()
                    .map(|(at, line)| (Duration::from_secs(*at), line.to_string()))
                    .collect(),
                closes,
                terminated,
            }
        }
    }

    #[async_trait]
    impl MinerProcess for ScriptedProcess {
        fn id(&self) -> Option<u32> {
            if self.terminated.load(Ordering::SeqCst) {
                None
            } else {
                Some(4242)
            }
        }

        async fn next_line(&mut self) -> Option<String> {
            match self.lines.front() {
                Some((at, _)) => {
                    sleep_until(self.started + *at).await;
                    self.lines.pop_front().map(|(_, line)| line)
                }
                None if self.closes => None,
                None => std::future::pending().await,
            }
        }

        fn try_next_line(&mut self) -> LineRead {
            match self.lines.front() {
                Some((at, _)) if Instant::now() >= self.started + *at => self
                    .lines
                    .pop_front()
                    .map_or(LineRead::Pending, |(_, line)| LineRead::Line(line)),
                Some(_) => LineRead::Pending,
                None if self.closes => LineRead::Closed,
                None => LineRead::Pending,
            }
        }

        async fn terminate(&mut self) {
            self.terminated.store(true, Ordering::SeqCst);
        }
    }

    /// HTTP client serving registered URLs from local files and strings.
    pub(crate) struct LocalFileHttp {
        files: Mutex<BTreeMap<String, PathBuf>>,
        texts: Mutex<BTreeMap<String, String>>,
    }

    impl LocalFileHttp {
        pub(crate) fn new() -> Self {
            Self {
                files: Mutex::new(BTreeMap::new()),
                texts: Mutex::new(BTreeMap::new()),
            }
        }

        pub(crate) fn serve_file(&self, url: &str, path: PathBuf) {
            self.files.lock().insert(url.to_string(), path);
        }

        pub(crate) fn serve_text(&self, url: &str, body: &str) {
            self.texts.lock().insert(url.to_string(), body.to_string());
        }
    }

    #[async_trait]
    impl HttpClient for LocalFileHttp {
        async fn get(&self, url: &str) -> Result<String, DomainError> {
            self.texts
                .lock()
                .get(url)
                .cloned()
                .ok_or_else(|| DomainError::HttpRequest(format!("HTTP 404 for {}", url)))
        }

        async fn download_file(
            &self,
            url: &str,
            path: &Path,
            progress_callback: Option<DownloadProgressFn>,
            cancel: &CancellationToken,
        ) -> Result<(), DomainError> {
            if cancel.is_cancelled() {
                return Err(DomainError::Cancelled);
            }
            let source = self
                .files
                .lock()
                .get(url)
                .cloned()
                .ok_or_else(|| DomainError::HttpRequest(format!("HTTP 404 for {}", url)))?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let size = std::fs::copy(&source, path)?;
            if let Some(callback) = progress_callback {
                callback(size, size);
            }
            Ok(())
        }

        fn is_network_blocked(&self) -> bool {
            false
        }

        fn allowed_domains(&self) -> Vec<String> {
            vec!["example.com".to_string()]
        }
    }

    /// Launcher handing out [`ScriptedProcess`]es and recording each spec.
    pub(crate) struct ScriptedLauncher {
        script: Vec<(u64, String)>,
        closes: bool,
        pub(crate) launched: Mutex<Vec<LaunchSpec>>,
        pub(crate) terminated: Arc<AtomicBool>,
    }

    impl ScriptedLauncher {
        pub(crate) fn new(script: &[(u64, &str)], closes: bool) -> Arc<Self> {
            Arc::new(Self {
                script: script
                    .iter()
                    .map(|(at, line)| (*at, line.to_string()))
                    .collect(),
                closes,
                launched: Mutex::new(Vec::new()),
                terminated: Arc::new(AtomicBool::new(false)),
            })
        }
    }

    #[async_trait]
    impl ProcessLauncher for ScriptedLauncher {
        async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn MinerProcess>, DomainError> {
            self.launched.lock().push(spec.clone());
            let script: Vec<(u64, &str)> = self
                .script
                .iter()
                .map(|(at, line)| (*at, line.as_str()))
                .collect();
            self.terminated.store(false, Ordering::SeqCst);
            Ok(Box::new(ScriptedProcess::with_flag(
                &script,
                self.closes,
                Arc::clone(&self.terminated),
            )))
        }
    }
}
