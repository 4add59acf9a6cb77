use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::domain::DomainError;
use crate::ports::{StatsQuery, StatsTransport};

/// Stats transport for miner APIs on the loopback interface.
///
/// TCP queries write the request and read until the miner closes the
/// connection or terminates its reply with a newline or NUL byte. HTTP
/// queries use a plain client: miner APIs are local and bypass the outbound
/// allowlist.
pub struct LocalStatsTransport {
    client: Client,
    timeout: Duration,
}

impl LocalStatsTransport {
    pub fn new(timeout: Duration) -> Result<Self, DomainError> {
        let client = Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::HttpRequest(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    async fn query_tcp(&self, port: u16, request: &str) -> Result<String, DomainError> {
        let exchange = async {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;
            stream.write_all(request.as_bytes()).await?;
            stream.flush().await?;

            let mut reply = Vec::new();
            let mut buffer = [0u8; 4096];
            loop {
                let read = stream.read(&mut buffer).await?;
                if read == 0 {
                    break;
                }
                reply.extend_from_slice(&buffer[..read]);
                if matches!(reply.last(), Some(b'\n') | Some(0)) {
                    break;
                }
            }
            Ok::<_, std::io::Error>(reply)
        };

        let reply = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| DomainError::Telemetry(format!("timed out querying port {}", port)))?
            .map_err(|e| DomainError::Telemetry(format!("port {}: {}", port, e)))?;

        let text = String::from_utf8_lossy(&reply);
        Ok(text.trim_end_matches(['\0', '\r', '\n']).to_string())
    }

    async fn query_http(&self, url: &str) -> Result<String, DomainError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DomainError::Telemetry(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::Telemetry(format!("HTTP {} for {}", status, url)));
        }

        response
            .text()
            .await
            .map_err(|e| DomainError::Telemetry(e.to_string()))
    }
}

#[async_trait]
impl StatsTransport for LocalStatsTransport {
    async fn query(&self, query: &StatsQuery) -> Result<String, DomainError> {
        debug!(query = ?query, "Querying miner API");
        match query {
            StatsQuery::Tcp { port, request } => self.query_tcp(*port, request).await,
            StatsQuery::Http { url } => self.query_http(url).await,
        }
    }
}
