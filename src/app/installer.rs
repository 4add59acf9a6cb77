use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{percent_of, DomainError, InstallPhase, InstallProgress, PluginPackageInfo};
use crate::infrastructure::{extract_zip_async, verify_sha256};
use crate::miners::plugin::BINS_DIR;
use crate::miners::InstalledPlugin;
use crate::ports::{HttpClient, PluginLoader};

/// Progress callback for install jobs.
pub type InstallProgressFn = Arc<dyn Fn(InstallProgress) + Send + Sync>;

pub const STAGING_PREFIX: &str = "installing_";
const PLUGIN_ARCHIVE: &str = "plugin.zip";
const MINER_ARCHIVE: &str = "miner_bins.zip";

/// Downloads and extracts plugin packages into a staging directory, then
/// swaps the staged tree into `<plugins_root>/<uuid>`.
///
/// Nothing outside the staging directory is touched until the staged plugin
/// has loaded successfully, so a failed or cancelled install leaves any
/// previous installation as it was.
pub struct PackageInstaller {
    http: Arc<dyn HttpClient>,
    loader: Arc<dyn PluginLoader>,
    plugins_root: PathBuf,
    verify_checksums: bool,
}

struct Job<'a> {
    info: &'a PluginPackageInfo,
    progress: Option<&'a InstallProgressFn>,
    cancel: &'a CancellationToken,
    staging: PathBuf,
}

impl Job<'_> {
    fn report(&self, phase: InstallPhase, percent: u8) {
        if let Some(progress) = self.progress {
            progress(InstallProgress::new(&self.info.uuid, phase, percent));
        }
    }

    fn check_cancelled(&self) -> Result<(), DomainError> {
        if self.cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }
        Ok(())
    }
}

impl PackageInstaller {
    pub fn new(
        http: Arc<dyn HttpClient>,
        loader: Arc<dyn PluginLoader>,
        plugins_root: PathBuf,
        verify_checksums: bool,
    ) -> Self {
        Self {
            http,
            loader,
            plugins_root,
            verify_checksums,
        }
    }

    pub fn plugins_root(&self) -> &Path {
        &self.plugins_root
    }

    pub fn staging_dir(&self, uuid: &str) -> PathBuf {
        self.plugins_root.join(format!("{}{}", STAGING_PREFIX, uuid))
    }

    pub fn install_dir(&self, uuid: &str) -> PathBuf {
        self.plugins_root.join(uuid)
    }

    /// Install the package described by `info` and return the plugins it
    /// registers, loaded from their final location.
    pub async fn install(
        &self,
        info: &PluginPackageInfo,
        progress: Option<InstallProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<InstalledPlugin>>, DomainError> {
        validate_uuid(&info.uuid)?;

        let job = Job {
            info,
            progress: progress.as_ref(),
            cancel,
            staging: self.staging_dir(&info.uuid),
        };

        info!(plugin_uuid = %info.uuid, version = %info.version, "Plugin install started");
        job.report(InstallPhase::Started, 0);

        match self.run(&job).await {
            Ok(plugins) => {
                job.report(InstallPhase::Installed, 100);
                info!(plugin_uuid = %info.uuid, miners = plugins.len(), "Plugin installed");
                Ok(plugins)
            }
            Err(e) => {
                remove_dir_if_exists(&job.staging).await;
                if e.is_cancelled() {
                    info!(plugin_uuid = %info.uuid, "Plugin install aborted");
                    job.report(InstallPhase::Aborted, 0);
                    return Err(DomainError::Cancelled);
                }
                warn!(plugin_uuid = %info.uuid, error = %e, "Plugin install failed");
                job.report(InstallPhase::Failed, 0);
                match e {
                    DomainError::Install { .. } => Err(e),
                    other => Err(DomainError::Install {
                        uuid: info.uuid.clone(),
                        message: other.to_string(),
                    }),
                }
            }
        }
    }

    async fn run(&self, job: &Job<'_>) -> Result<Vec<Arc<InstalledPlugin>>, DomainError> {
        let info = job.info;
        let package_url = info
            .package_url
            .as_deref()
            .ok_or_else(|| DomainError::Install {
                uuid: info.uuid.clone(),
                message: "catalog entry has no package URL".to_string(),
            })?;

        remove_dir_if_exists(&job.staging).await;
        tokio::fs::create_dir_all(&job.staging).await?;

        self.fetch_and_extract(
            job,
            package_url,
            info.package_sha256.as_deref(),
            PLUGIN_ARCHIVE,
            job.staging.clone(),
            (InstallPhase::DownloadingPlugin, InstallPhase::ExtractingPlugin),
        )
        .await?;

        match info.miner_package_url.as_deref() {
            Some(miner_url) => {
                self.fetch_and_extract(
                    job,
                    miner_url,
                    info.miner_package_sha256.as_deref(),
                    MINER_ARCHIVE,
                    job.staging.join(BINS_DIR),
                    (InstallPhase::DownloadingMiner, InstallPhase::ExtractingMiner),
                )
                .await?;
            }
            None => debug!(plugin_uuid = %info.uuid, "No miner package to fetch"),
        }

        job.check_cancelled()?;
        let staged = self.loader.load_dir(&job.staging);
        if staged.is_empty() {
            return Err(DomainError::Install {
                uuid: info.uuid.clone(),
                message: "package registers no miners".to_string(),
            });
        }
        if !staged.iter().any(|p| p.uuid() == info.uuid) {
            return Err(DomainError::Install {
                uuid: info.uuid.clone(),
                message: format!("package manifest does not declare {}", info.uuid),
            });
        }

        job.check_cancelled()?;
        let target = self.install_dir(&info.uuid);
        if tokio::fs::try_exists(&target).await? {
            tokio::fs::remove_dir_all(&target).await?;
        }
        tokio::fs::rename(&job.staging, &target).await?;
        debug!(target = ?target, "Staged plugin moved into place");

        Ok(self.loader.load_dir(&target))
    }

    async fn fetch_and_extract(
        &self,
        job: &Job<'_>,
        url: &str,
        sha256: Option<&str>,
        archive_name: &str,
        target: PathBuf,
        (download_phase, extract_phase): (InstallPhase, InstallPhase),
    ) -> Result<(), DomainError> {
        job.check_cancelled()?;
        job.report(download_phase, 0);

        let archive = job.staging.join(archive_name);
        let download_progress = job.progress.map(|progress| {
            let progress = Arc::clone(progress);
            let uuid = job.info.uuid.clone();
            Box::new(move |done: u64, total: u64| {
                progress(InstallProgress::new(&uuid, download_phase, percent_of(done, total)));
            }) as Box<dyn Fn(u64, u64) + Send + Sync>
        });
        self.http
            .download_file(url, &archive, download_progress, job.cancel)
            .await?;

        if let Some(expected) = sha256.filter(|_| self.verify_checksums) {
            let path = archive.clone();
            let expected = expected.to_string();
            tokio::task::spawn_blocking(move || verify_sha256(&path, &expected))
                .await
                .map_err(|e| DomainError::Io(format!("checksum task failed: {}", e)))??;
            debug!(archive = ?archive, "Checksum verified");
        }

        job.check_cancelled()?;
        job.report(extract_phase, 0);
        let extract_progress = job.progress.map(|progress| {
            let progress = Arc::clone(progress);
            let uuid = job.info.uuid.clone();
            Box::new(move |percent: u8| {
                progress(InstallProgress::new(&uuid, extract_phase, percent));
            }) as Box<dyn Fn(u8) + Send + Sync>
        });
        extract_zip_async(archive.clone(), target, extract_progress, job.cancel.clone()).await?;

        tokio::fs::remove_file(&archive).await?;
        Ok(())
    }
}

/// The uuid becomes a directory name, so it must be one plain component.
fn validate_uuid(uuid: &str) -> Result<(), DomainError> {
    let plain = !uuid.is_empty()
        && uuid != "."
        && uuid != ".."
        && !uuid.starts_with(STAGING_PREFIX)
        && uuid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if !plain {
        return Err(DomainError::Install {
            uuid: uuid.to_string(),
            message: "invalid plugin uuid".to_string(),
        });
    }
    Ok(())
}

async fn remove_dir_if_exists(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!(path = ?path, "Removed directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = ?path, error = %e, "Failed to remove directory"),
    }
}
