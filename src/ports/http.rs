use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::DomainError;

/// Progress callback for downloads: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 when the server does not announce a length.
pub type DownloadProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

/// HTTP client port for all outbound requests (catalog, packages).
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform a GET request and return the body as text.
    async fn get(&self, url: &str) -> Result<String, DomainError>;

    /// Download a file to `path`.
    ///
    /// Returns `DomainError::Cancelled` if `cancel` fires before the
    /// download completes; no partial file is left at `path` in that case.
    async fn download_file(
        &self,
        url: &str,
        path: &Path,
        progress_callback: Option<DownloadProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError>;

    /// Check if network requests are currently blocked.
    fn is_network_blocked(&self) -> bool;

    /// Get the list of allowed domains.
    fn allowed_domains(&self) -> Vec<String>;
}
