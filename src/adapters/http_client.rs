use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::RwLock;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::config::NetworkConfig;
use crate::domain::DomainError;
use crate::ports::{DownloadProgressFn, HttpClient};

/// Outbound HTTP client guarded by an offline switch and a host allowlist.
///
/// Every request is checked before it leaves the process: in offline mode
/// everything is blocked, otherwise only allowlisted hosts (and their
/// subdomains) pass.
pub struct GuardedHttpClient {
    client: Client,
    offline: AtomicBool,
    allowed_domains: RwLock<Vec<String>>,
}

impl GuardedHttpClient {
    pub fn new(config: &NetworkConfig) -> Result<Self, DomainError> {
        let client = Client::builder()
            .use_rustls_tls()
            .user_agent(format!("MinerHost/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| DomainError::HttpRequest(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            offline = config.offline,
            allowed_domains = ?config.allowed_domains,
            "HTTP client initialized"
        );

        Ok(Self {
            client,
            offline: AtomicBool::new(config.offline),
            allowed_domains: RwLock::new(config.allowed_domains.clone()),
        })
    }

    /// Apply a changed network section.
    pub fn apply(&self, config: &NetworkConfig) {
        self.set_offline(config.offline);
        self.set_allowed_domains(config.allowed_domains.clone());
    }

    pub fn set_offline(&self, offline: bool) {
        let previous = self.offline.swap(offline, Ordering::SeqCst);
        if previous != offline {
            info!(offline = offline, "Network mode changed");
        }
    }

    pub fn set_allowed_domains(&self, domains: Vec<String>) {
        let mut guard = self.allowed_domains.write();
        *guard = domains;
        info!(allowed_domains = ?*guard, "Allowed domains updated");
    }

    fn is_url_allowed(&self, url: &str) -> Result<(), DomainError> {
        if self.offline.load(Ordering::SeqCst) {
            warn!(url = url, "Network request blocked: offline mode enabled");
            return Err(DomainError::NetworkBlocked {
                reason: "Offline mode is enabled. All network requests are blocked.".to_string(),
            });
        }

        let parsed = Url::parse(url).map_err(|e| DomainError::HttpRequest(e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| DomainError::HttpRequest("Invalid URL: no host".to_string()))?;

        let allowed = self.allowed_domains.read();
        if !allowed
            .iter()
            .any(|d| host == d || host.ends_with(&format!(".{}", d)))
        {
            warn!(url = url, host = host, "Network request blocked: domain not in allowlist");
            return Err(DomainError::NetworkBlocked {
                reason: format!("Domain '{}' is not in the allowed list", host),
            });
        }

        debug!(url = url, "Network request allowed");
        Ok(())
    }

    async fn send_get(&self, url: &str, timeout: Duration) -> Result<reqwest::Response, DomainError> {
        self.is_url_allowed(url)?;

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| DomainError::HttpRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::HttpRequest(format!("HTTP {} for {}", status, url)));
        }
        Ok(response)
    }
}

#[async_trait]
impl HttpClient for GuardedHttpClient {
    async fn get(&self, url: &str) -> Result<String, DomainError> {
        self.send_get(url, Duration::from_secs(30))
            .await?
            .text()
            .await
            .map_err(|e| DomainError::HttpRequest(e.to_string()))
    }

    async fn download_file(
        &self,
        url: &str,
        path: &Path,
        progress_callback: Option<DownloadProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(DomainError::Cancelled),
            response = self.send_get(url, Duration::from_secs(3600)) => response?,
        };

        let total_size = response.content_length().unwrap_or(0);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a temp file first, then rename into place.
        let temp_path = path.with_extension("download");
        let result = write_stream(
            response,
            &temp_path,
            total_size,
            progress_callback.as_deref(),
            cancel,
        )
        .await;

        let downloaded = match result {
            Ok(downloaded) => downloaded,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                if e.is_cancelled() {
                    info!(url = url, "Download cancelled");
                }
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&temp_path, path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(DomainError::Io(e.to_string()));
        }

        info!(path = ?path, size = downloaded, "File downloaded successfully");
        Ok(())
    }

    fn is_network_blocked(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn allowed_domains(&self) -> Vec<String> {
        self.allowed_domains.read().clone()
    }
}

async fn write_stream(
    response: reqwest::Response,
    temp_path: &Path,
    total_size: u64,
    progress: Option<&(dyn Fn(u64, u64) + Send + Sync)>,
    cancel: &CancellationToken,
) -> Result<u64, DomainError> {
    let mut file = tokio::fs::File::create(temp_path).await?;
    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(DomainError::Cancelled),
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = chunk else {
            break;
        };
        let chunk = chunk.map_err(|e| DomainError::HttpRequest(e.to_string()))?;

        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;

        if let Some(callback) = progress {
            callback(downloaded, total_size);
        }
    }

    file.flush().await?;
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(offline: bool, domains: &[&str]) -> GuardedHttpClient {
        GuardedHttpClient::new(&NetworkConfig {
            offline,
            allowed_domains: domains.iter().map(|d| d.to_string()).collect(),
        })
        .unwrap()
    }

    #[test]
    fn test_offline_blocks_requests() {
        let http = client(true, &["example.com"]);
        assert!(http.is_network_blocked());

        let result = http.is_url_allowed("https://example.com/api");
        assert!(matches!(result, Err(DomainError::NetworkBlocked { .. })));
    }

    #[test]
    fn test_allowed_domain_passes() {
        let http = client(false, &["miner-plugins.nicehash.com"]);
        assert!(!http.is_network_blocked());
        assert!(http
            .is_url_allowed("https://miner-plugins.nicehash.com/api/plugins")
            .is_ok());
    }

    #[test]
    fn test_disallowed_domain_blocked() {
        let http = client(false, &["github.com"]);
        assert!(http.is_url_allowed("https://evil.example/miner.zip").is_err());
        // Suffix match must be on a label boundary.
        assert!(http.is_url_allowed("https://notgithub.com/x").is_err());
    }

    #[test]
    fn test_subdomain_allowed() {
        let http = client(false, &["githubusercontent.com"]);
        assert!(http
            .is_url_allowed("https://objects.githubusercontent.com/file.zip")
            .is_ok());
    }

    #[test]
    fn test_apply_updates_guard() {
        let http = client(true, &[]);
        http.apply(&NetworkConfig {
            offline: false,
            allowed_domains: vec!["github.com".to_string()],
        });
        assert!(!http.is_network_blocked());
        assert_eq!(http.allowed_domains(), vec!["github.com".to_string()]);
    }

    #[tokio::test]
    async fn test_blocked_download_leaves_no_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join("plugin.zip");
        let http = client(true, &[]);

        let err = http
            .download_file("https://github.com/x.zip", &target, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NetworkBlocked { .. }));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_cancel_mid_download_removes_partial_file() {
        use std::sync::atomic::AtomicU64;
        use std::sync::Arc;
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        // Announces 1 MiB, sends 64 KiB, then stalls.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1048576\r\n\r\n")
                .await
                .unwrap();
            socket.write_all(&vec![7u8; 64 * 1024]).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let mut http = client(false, &["127.0.0.1"]);
        http.client = Client::builder().no_proxy().build().unwrap();

        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join("miner.zip");
        let cancel = CancellationToken::new();
        let received = Arc::new(AtomicU64::new(0));
        let progress: DownloadProgressFn = {
            let cancel = cancel.clone();
            let received = Arc::clone(&received);
            Box::new(move |done: u64, _total: u64| {
                received.store(done, Ordering::SeqCst);
                cancel.cancel();
            })
        };

        let url = format!("http://127.0.0.1:{}/miner.zip", port);
        let err = tokio::time::timeout(
            Duration::from_secs(10),
            http.download_file(&url, &target, Some(progress), &cancel),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert!(err.is_cancelled());
        let received = received.load(Ordering::SeqCst);
        assert!(received > 0 && received < 1024 * 1024);
        assert!(!target.exists());
        assert!(!target.with_extension("download").exists());
        server.abort();
    }
}
