use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::{BenchmarkEngine, StatsPoller};
use crate::domain::config::DevFeeConfig;
use crate::domain::{
    render_package, ApiStatsRecord, BenchmarkPerformanceType, BenchmarkPlan, BenchmarkResult,
    DomainError, LaunchOptions, MiningPairing, MiningSession, DEMO_USER,
};
use crate::infrastructure::{PortLease, PortPool};
use crate::miners::InstalledPlugin;
use crate::ports::{CommandContext, LaunchSpec, MinerProcess, ProcessLauncher};

/// Shared services every miner instance draws on.
#[derive(Clone)]
pub struct MinerServices {
    pub launcher: Arc<dyn ProcessLauncher>,
    pub poller: StatsPoller,
    pub ports: Arc<PortPool>,
    pub engine: BenchmarkEngine,
    pub dev_fees: DevFeeConfig,
}

struct Running {
    process: Box<dyn MinerProcess>,
    lease: PortLease,
}

/// One miner instance bound to an installed plugin.
///
/// A miner runs at most one benchmark or mining process at a time; the
/// `&mut self` receivers make that a property of the handle.
pub struct Miner {
    plugin: Arc<InstalledPlugin>,
    services: MinerServices,
    session: Option<MiningSession>,
    extra_parameters: String,
    running: Option<Running>,
}

impl Miner {
    pub fn new(plugin: Arc<InstalledPlugin>, services: MinerServices) -> Self {
        Self {
            plugin,
            services,
            session: None,
            extra_parameters: String::new(),
            running: None,
        }
    }

    pub fn plugin(&self) -> &Arc<InstalledPlugin> {
        &self.plugin
    }

    pub fn session(&self) -> Option<&MiningSession> {
        self.session.as_ref()
    }

    pub fn extra_parameters(&self) -> &str {
        &self.extra_parameters
    }

    pub fn is_mining(&self) -> bool {
        self.running.is_some()
    }

    pub fn api_port(&self) -> Option<u16> {
        self.running.as_ref().map(|r| r.lease.port())
    }

    /// Resolve the session's single algorithm and render the extra launch
    /// parameters from the plugin's options package.
    pub fn init(
        &mut self,
        pairings: Vec<MiningPairing>,
        location_url: &str,
        username: &str,
        launch_options: &LaunchOptions,
    ) -> Result<(), DomainError> {
        let session = MiningSession::new(pairings, location_url, username)?;
        let family = self.plugin.family();
        if family.algorithm_name(session.algorithm()).is_none() {
            return Err(DomainError::Initialization(format!(
                "{} does not support {}",
                family.name(),
                session.algorithm()
            )));
        }

        self.extra_parameters = render_package(
            session.pairings(),
            self.plugin.options_package(),
            launch_options,
        );
        info!(
            plugin_uuid = %self.plugin.uuid(),
            algorithm = %session.algorithm(),
            devices = %session.device_ids(","),
            extra = %self.extra_parameters,
            "Miner initialized"
        );
        self.session = Some(session);
        Ok(())
    }

    fn require_session(&self) -> Result<&MiningSession, DomainError> {
        self.session
            .as_ref()
            .ok_or_else(|| DomainError::Initialization("miner is not initialized".to_string()))
    }

    fn launch_spec(&self, arguments: String) -> LaunchSpec {
        LaunchSpec::new(
            self.plugin.executable_path(),
            self.plugin.bins_dir(),
            arguments,
        )
    }

    fn dev_fee_percent(&self, session: &MiningSession) -> f64 {
        let family = self.plugin.family();
        let configured = self
            .services
            .dev_fees
            .fee(family.name(), session.algorithm());
        family.dev_fee_percent(session.algorithm(), &self.extra_parameters, configured)
    }

    /// Run a benchmark with the demo user. Launch failures are errors; every
    /// other outcome is a result.
    pub async fn start_benchmark(
        &mut self,
        performance: BenchmarkPerformanceType,
        cancel: &CancellationToken,
    ) -> Result<BenchmarkResult, DomainError> {
        if self.is_mining() {
            return Err(DomainError::Process("miner is already running".to_string()));
        }
        let session = self.require_session()?;
        let family = Arc::clone(self.plugin.family());

        let duration = family.benchmark_durations().duration(performance);
        let ctx = CommandContext {
            session,
            extra_parameters: &self.extra_parameters,
            username: DEMO_USER,
            api_port: None,
        };
        let arguments = family.benchmark_arguments(&ctx, duration)?;
        let plan = BenchmarkPlan {
            duration,
            completion: family.completion_rule(),
            dev_fee_percent: self.dev_fee_percent(session),
        };

        let spec = self.launch_spec(arguments);
        info!(
            plugin_uuid = %self.plugin.uuid(),
            performance = ?performance,
            executable = ?spec.executable,
            "Starting benchmark"
        );
        let mut process = self.services.launcher.launch(&spec).await?;

        let result = self
            .services
            .engine
            .run(
                process.as_mut(),
                &plan,
                |line| family.extract_sample(line, session),
                cancel,
            )
            .await;
        Ok(result)
    }

    /// Lease an API port and launch the miner for real work.
    pub async fn start_mining(&mut self) -> Result<(), DomainError> {
        if self.is_mining() {
            return Err(DomainError::Process("miner is already running".to_string()));
        }
        let session = self.require_session()?;
        let family = self.plugin.family();

        let lease = self.services.ports.lease()?;
        let ctx = CommandContext {
            session,
            extra_parameters: &self.extra_parameters,
            username: session.username(),
            api_port: Some(lease.port()),
        };
        let arguments = family.mining_arguments(&ctx)?;
        let spec = self.launch_spec(arguments);
        let process = self.services.launcher.launch(&spec).await?;

        info!(
            plugin_uuid = %self.plugin.uuid(),
            pid = ?process.id(),
            api_port = lease.port(),
            "Mining started"
        );
        self.running = Some(Running { process, lease });
        Ok(())
    }

    /// Terminate the mining process and release its API port.
    pub async fn stop_mining(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        running.process.terminate().await;
        info!(
            plugin_uuid = %self.plugin.uuid(),
            api_port = running.lease.port(),
            "Mining stopped"
        );
    }

    /// Poll live stats. Empty when not mining.
    pub async fn stats(&self) -> ApiStatsRecord {
        let (Some(running), Some(session)) = (&self.running, &self.session) else {
            return ApiStatsRecord::empty();
        };
        self.services
            .poller
            .poll(self.plugin.family().as_ref(), running.lease.port(), session)
            .await
    }
}

impl Drop for Miner {
    fn drop(&mut self) {
        if self.running.is_some() {
            warn!(plugin_uuid = %self.plugin.uuid(), "Miner dropped while mining");
        }
    }
}
