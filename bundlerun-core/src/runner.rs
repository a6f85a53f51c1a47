//! Quickstart test runner.
//!
//! Drives a fixed four-step sequence against one `DeployClient`:
//! quickstart-deploy a bundle, resolve the bootstrap host, wait for the
//! deploy to start, wait for all agents to start. Whatever happens, the run
//! ends with cleanup: status + log dump when a bootstrap host was
//! discovered, then exactly one destroy of the environment.

use crate::bootstrap::TempBootstrapEnv;
use crate::client::{DeployClient, ToolClient};
use crate::environment::{EnvOverrides, Environment};
use crate::error::Result;
use crate::logs::{self, LogDumper, SshLogDumper};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// Upper bound for all agents to reach `started`.
pub const AGENTS_STARTED_TIMEOUT: Duration = Duration::from_secs(3600);

/// Everything one run needs, built once from CLI input.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Environment name in `environments.yaml`.
    pub env: String,
    /// Disposable name the environment runs under for this test.
    pub temp_env_name: String,
    /// Path to the deployment tool binary.
    pub tool_path: PathBuf,
    /// Directory collected logs land in.
    pub log_dir: PathBuf,
    /// Bundle path or URL to quickstart-deploy.
    pub bundle: String,
    /// Minimum number of services expected before the deploy counts as
    /// started.
    pub service_count: usize,
    /// Environment config overrides for this run.
    pub overrides: EnvOverrides,
    /// Pass `--debug` to the tool.
    pub debug: bool,
    /// Tool config home. Resolved by the caller; core never consults
    /// ambient environment variables for it.
    pub config_home: PathBuf,
}

/// One completed step, surfaced to the observer as it happens.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// Fixed step name.
    pub step: &'static str,
    /// Human-readable completion status.
    pub status: String,
    /// Bootstrap host, carried on the host-resolution step.
    pub bootstrap_host: Option<String>,
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Bootstrapping,
    HostResolved,
    DeployStarted,
    AgentsStarted,
    Succeeded,
    Failed,
}

/// Callback invoked once per completed step, in step order.
pub type StepObserver = Box<dyn Fn(&StepRecord) + Send + Sync>;

/// Executes the step sequence and guarantees environment teardown.
pub struct Runner {
    client: Box<dyn DeployClient>,
    environment: Environment,
    bundle: String,
    log_dir: PathBuf,
    service_count: usize,
    config_home: PathBuf,
    dumper: Box<dyn LogDumper>,
    observer: Option<StepObserver>,
    steps: Vec<StepRecord>,
    bootstrap_host: Option<String>,
    state: RunState,
}

impl Runner {
    /// Build a runner from CLI-derived config: load the environment, apply
    /// overrides, construct the versioned tool client.
    pub async fn from_args(config: &RunConfig) -> Result<Self> {
        let mut environment = Environment::from_config(&config.config_home, &config.env)?;
        environment.update(&config.temp_env_name, &config.overrides);
        let client = ToolClient::by_version(
            environment.clone(),
            &config.tool_path,
            &config.config_home,
            config.debug,
        )
        .await?;
        Ok(Self::new(
            Box::new(client),
            environment,
            &config.bundle,
            &config.log_dir,
            config.service_count,
            &config.config_home,
            Box::new(SshLogDumper),
        ))
    }

    /// Build a runner from its parts. Test code injects mock clients and
    /// dumpers here.
    pub fn new(
        client: Box<dyn DeployClient>,
        environment: Environment,
        bundle: &str,
        log_dir: &Path,
        service_count: usize,
        config_home: &Path,
        dumper: Box<dyn LogDumper>,
    ) -> Self {
        Self {
            client,
            environment,
            bundle: bundle.to_string(),
            log_dir: log_dir.to_path_buf(),
            service_count,
            config_home: config_home.to_path_buf(),
            dumper,
            observer: None,
            steps: Vec::new(),
            bootstrap_host: None,
            state: RunState::NotStarted,
        }
    }

    /// Install a step observer. Each completed step is surfaced through it
    /// immediately, before the next step begins.
    pub fn with_observer(mut self, observer: StepObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Step records accumulated so far, in completion order.
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Bootstrap host discovered by the host-resolution step, if any.
    pub fn bootstrap_host(&self) -> Option<&str> {
        self.bootstrap_host.as_deref()
    }

    /// Execute the run: the four steps in strict order, then cleanup on
    /// every path.
    ///
    /// A step error is logged, cleanup still runs, and the step error is
    /// re-raised. A destroy failure during an already-failing run is logged
    /// and suppressed so the root cause is what surfaces; on an otherwise
    /// clean run it is the run's error.
    pub async fn run(&mut self) -> Result<()> {
        let outcome = self.run_steps().await;
        if let Err(e) = &outcome {
            error!(error = %e, "run failed");
        }

        if let Some(host) = self.bootstrap_host.clone() {
            logs::safe_print_status(self.client.as_ref()).await;
            if let Err(e) = self.dumper.dump_logs(&host, &self.log_dir).await {
                warn!(host = %host, error = %e, "failed to dump environment logs");
            }
        }

        let destroyed = self.client.destroy_environment(true).await;
        let result = match (outcome, destroyed) {
            (Err(step_err), Err(destroy_err)) => {
                error!(error = %destroy_err, "destroy failed during cleanup");
                Err(step_err)
            }
            (Err(step_err), Ok(())) => Err(step_err),
            (Ok(()), Err(destroy_err)) => Err(destroy_err),
            (Ok(()), Ok(())) => Ok(()),
        };

        self.state = if result.is_ok() { RunState::Succeeded } else { RunState::Failed };
        result
    }

    async fn run_steps(&mut self) -> Result<()> {
        self.state = RunState::Bootstrapping;
        // The temp bootstrap home must be released whether or not the
        // quickstart call succeeds, before any later step runs.
        let scope = TempBootstrapEnv::new(&self.config_home, &self.environment)?;
        let quickstarted = self.client.quickstart(&self.bundle, scope.home()).await;
        drop(scope);
        quickstarted?;
        self.record("quickstart", "returned from quickstart", None);

        let host = self.client.machine_dns_name("0").await?;
        self.state = RunState::HostResolved;
        self.bootstrap_host = Some(host.clone());
        let status = host.clone();
        self.record("bootstrap-host", &status, Some(host));

        self.client.wait_for_deploy_started(self.service_count).await?;
        self.state = RunState::DeployStarted;
        self.record("deploy-started", "deploy started", None);

        self.client.wait_for_started(AGENTS_STARTED_TIMEOUT).await?;
        self.state = RunState::AgentsStarted;
        self.record("agents-started", "all agents started", None);
        Ok(())
    }

    fn record(&mut self, step: &'static str, status: &str, bootstrap_host: Option<String>) {
        let record = StepRecord { step, status: status.to_string(), bootstrap_host };
        info!(step = record.step, status = %record.status, "step complete");
        if let Some(observer) = &self.observer {
            observer(&record);
        }
        self.steps.push(record);
    }
}
