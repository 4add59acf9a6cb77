use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{ApiStatsRecord, MiningSession};
use crate::ports::{MinerFamily, StatsTransport};

/// Best-effort telemetry: queries a running miner's local API and
/// normalizes the reply. Any failure yields an empty record.
///
/// The poller does not schedule itself; callers poll on their own cadence.
#[derive(Clone)]
pub struct StatsPoller {
    transport: Arc<dyn StatsTransport>,
}

impl StatsPoller {
    pub fn new(transport: Arc<dyn StatsTransport>) -> Self {
        Self { transport }
    }

    pub async fn poll(
        &self,
        family: &dyn MinerFamily,
        api_port: u16,
        session: &MiningSession,
    ) -> ApiStatsRecord {
        let query = family.stats_query(api_port);
        let reply = match self.transport.query(&query).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(family = family.name(), api_port = api_port, error = %e, "Stats query failed");
                return ApiStatsRecord::empty();
            }
        };

        match family.parse_stats(&reply, session) {
            Ok(record) => {
                debug!(
                    family = family.name(),
                    speed = record.total_speed(),
                    power = record.total_power_usage,
                    "Stats polled"
                );
                record
            }
            Err(e) => {
                warn!(family = family.name(), error = %e, "Unreadable stats reply");
                ApiStatsRecord::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::stats_transport::tests::serve_once;
    use crate::adapters::LocalStatsTransport;
    use crate::domain::{AlgorithmType, DeviceKind, DomainError};
    use crate::miners::testing::session;
    use crate::miners::{CpuMinerFamily, SgminerFamily};
    use crate::ports::StatsQuery;
    use async_trait::async_trait;
    use std::time::Duration;

    struct CannedTransport(Result<&'static str, ()>);

    #[async_trait]
    impl StatsTransport for CannedTransport {
        async fn query(&self, _query: &StatsQuery) -> Result<String, DomainError> {
            self.0
                .map(str::to_string)
                .map_err(|_| DomainError::Telemetry("connection refused".to_string()))
        }
    }

    fn local() -> StatsPoller {
        StatsPoller::new(Arc::new(
            LocalStatsTransport::new(Duration::from_secs(2)).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_transport_failure_is_empty_record() {
        let poller = StatsPoller::new(Arc::new(CannedTransport(Err(()))));
        let session = session(DeviceKind::Cpu, &[0], AlgorithmType::Lyra2Z);
        let record = poller.poll(&CpuMinerFamily, 4000, &session).await;
        assert!(record.is_empty());
        assert_eq!(record.total_speed(), 0.0);
        assert_eq!(record.total_power_usage, 0);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_empty_record() {
        let poller = StatsPoller::new(Arc::new(CannedTransport(Ok("{\"DEVS\": [oops"))));
        let session = session(DeviceKind::Amd, &[0], AlgorithmType::NeoScrypt);
        let record = poller.poll(&SgminerFamily, 4000, &session).await;
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn test_text_reply_over_tcp() {
        let (port, server) = serve_once("NAME=cpuminer-opt;KHS=2.00;ACC=1;").await;
        let session = session(DeviceKind::Cpu, &[0], AlgorithmType::Lyra2Z);

        let record = local().poll(&CpuMinerFamily, port, &session).await;
        assert_eq!(record.per_algorithm_speed, vec![(AlgorithmType::Lyra2Z, 2000.0)]);
        assert_eq!(server.await.unwrap(), "summary");
    }

    #[tokio::test]
    async fn test_foreign_device_ignored_over_tcp() {
        let (port, _server) =
            serve_once(r#"{"DEVS":[{"GPU":0,"KHS 5s":1.0},{"GPU":9,"KHS 5s":50.0}]}"#).await;
        let session = session(DeviceKind::Amd, &[0], AlgorithmType::NeoScrypt);

        let record = local().poll(&SgminerFamily, port, &session).await;
        assert_eq!(record.total_speed(), 1000.0);
    }

    #[tokio::test]
    async fn test_refused_connection_is_empty_record() {
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let session = session(DeviceKind::Cpu, &[0], AlgorithmType::Lyra2Z);

        let record = local().poll(&CpuMinerFamily, port, &session).await;
        assert!(record.is_empty());
    }
}
