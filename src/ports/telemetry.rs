use async_trait::async_trait;

use crate::domain::DomainError;
use crate::ports::StatsQuery;

/// Transport for miner stats queries.
#[async_trait]
pub trait StatsTransport: Send + Sync {
    /// Send the query and return the raw reply text.
    async fn query(&self, query: &StatsQuery) -> Result<String, DomainError>;
}
