use std::collections::BTreeSet;
use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::domain::config::ApiPortsConfig;
use crate::domain::DomainError;

/// Shared pool of local API ports for running miners.
///
/// Allocation is serialized by one short critical section; a port stays
/// reserved until its [`PortLease`] is dropped.
#[derive(Debug)]
pub struct PortPool {
    range: RangeInclusive<u16>,
    in_use: Mutex<BTreeSet<u16>>,
}

impl PortPool {
    pub fn new(start: u16, end: u16) -> Arc<Self> {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        Arc::new(Self {
            range: start..=end,
            in_use: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn from_config(config: &ApiPortsConfig) -> Arc<Self> {
        Self::new(config.start, config.end)
    }

    /// Reserve the lowest port that is neither leased nor bound by another
    /// process on the loopback interface.
    pub fn lease(self: &Arc<Self>) -> Result<PortLease, DomainError> {
        let mut in_use = self.in_use.lock();
        let port = self
            .range
            .clone()
            .find(|port| !in_use.contains(port) && is_port_free(*port))
            .ok_or_else(|| {
                warn!(
                    start = *self.range.start(),
                    end = *self.range.end(),
                    "No free API port left in range"
                );
                DomainError::Process(format!(
                    "no free API port in {}-{}",
                    self.range.start(),
                    self.range.end()
                ))
            })?;
        in_use.insert(port);
        drop(in_use);

        debug!(port = port, "API port leased");
        Ok(PortLease {
            port,
            pool: Arc::clone(self),
        })
    }

    /// Number of ports currently leased.
    pub fn leased_count(&self) -> usize {
        self.in_use.lock().len()
    }

    fn release(&self, port: u16) {
        self.in_use.lock().remove(&port);
        debug!(port = port, "API port released");
    }
}

fn is_port_free(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}

/// A reserved API port, returned to the pool on drop.
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    pool: Arc<PortPool>,
}

impl PortLease {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.pool.release(self.port);
    }
}
