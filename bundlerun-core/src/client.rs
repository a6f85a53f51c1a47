//! Deployment client abstraction.
//!
//! The runner drives deployments through the `DeployClient` trait:
//! - `ToolClient`: shells out to the external deployment tool binary
//! - test code substitutes mock implementations
//!
//! Wait operations poll the tool's status output on an interval and enforce
//! their own upper bounds. The runner never retries; all backoff lives here.

use crate::environment::Environment;
use crate::error::{BundlerunError, Result};
use crate::status::Status;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Environment variable the tool reads its config home from.
pub const CONFIG_HOME_ENV: &str = "BUNDLERUN_HOME";

/// Upper bound for a quickstart deploy to register its services.
const DEPLOY_STARTED_TIMEOUT: Duration = Duration::from_secs(1200);

/// Upper bound for a provisioned machine to publish its DNS name.
const DNS_NAME_TIMEOUT: Duration = Duration::from_secs(600);

/// Default interval between status polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Client capability consumed by the runner.
///
/// One client is constructed per run and owned by that run's `Runner`.
#[async_trait]
pub trait DeployClient: Send + Sync {
    /// Bootstrap the environment and deploy the bundle in one combined
    /// operation, using `bootstrap_home` as the tool's config home for the
    /// duration of the call.
    async fn quickstart(&self, bundle: &str, bootstrap_home: &Path) -> Result<()>;

    /// Resolve the DNS name of a machine, waiting for the provider to
    /// publish one.
    async fn machine_dns_name(&self, machine_id: &str) -> Result<String>;

    /// Block until the deployment reports at least `min_services` services.
    async fn wait_for_deploy_started(&self, min_services: usize) -> Result<()>;

    /// Block until every machine and unit agent reports `started`, failing
    /// once `timeout` elapses.
    async fn wait_for_started(&self, timeout: Duration) -> Result<()>;

    /// Destroy the environment. With `delete_state_file` the persisted
    /// environment state file is removed as well.
    async fn destroy_environment(&self, delete_state_file: bool) -> Result<()>;

    /// Fetch the current deployment status.
    async fn status(&self) -> Result<Status>;
}

/// Client that drives the external deployment tool binary.
#[derive(Debug)]
pub struct ToolClient {
    environment: Environment,
    tool_path: PathBuf,
    config_home: PathBuf,
    version: String,
    debug: bool,
    poll_interval: Duration,
}

impl ToolClient {
    /// Build a versioned client: probes `<tool> --version` once and binds
    /// the reported version for logging.
    pub async fn by_version(
        environment: Environment,
        tool_path: &Path,
        config_home: &Path,
        debug: bool,
    ) -> Result<Self> {
        let output = Command::new(tool_path)
            .arg("--version")
            .output()
            .await
            .map_err(|e| BundlerunError::SpawnFailed {
                command: format!("{} --version", tool_path.display()),
                source: e,
            })?;
        if !output.status.success() {
            return Err(BundlerunError::CommandFailed {
                command: format!("{} --version", tool_path.display()),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(version = %version, env = environment.name(), "deployment tool client ready");

        Ok(Self {
            environment,
            tool_path: tool_path.to_path_buf(),
            config_home: config_home.to_path_buf(),
            version,
            debug,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Tool version reported by `--version`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Environment this client operates on.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    #[cfg(test)]
    fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run the tool with the given arguments and config home, returning
    /// captured stdout.
    async fn run_tool(&self, home: &Path, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.tool_path);
        cmd.args(args).env(CONFIG_HOME_ENV, home).kill_on_drop(true);
        if self.debug {
            cmd.arg("--debug");
        }
        let rendered = format!("{} {}", self.tool_path.display(), args.join(" "));
        debug!(command = %rendered, home = %home.display(), "running tool");

        let output = cmd
            .output()
            .await
            .map_err(|e| BundlerunError::SpawnFailed { command: rendered.clone(), source: e })?;
        if !output.status.success() {
            return Err(BundlerunError::CommandFailed {
                command: rendered,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn status_from(&self, home: &Path) -> Result<Status> {
        let out = self
            .run_tool(home, &["status", "-e", self.environment.name(), "--format", "yaml"])
            .await?;
        Status::from_yaml(&out)
    }

    /// Poll status until `ready` reports true, or fail with a timeout.
    async fn wait_until<F>(&self, what: &str, timeout: Duration, mut ready: F) -> Result<()>
    where
        F: FnMut(&Status) -> Result<bool> + Send,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.status_from(&self.config_home).await?;
            if ready(&status)? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BundlerunError::WaitTimeout {
                    what: what.to_string(),
                    secs: timeout.as_secs(),
                });
            }
            debug!(what, "not ready yet, polling again");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn state_file(&self) -> PathBuf {
        self.config_home
            .join("environments")
            .join(format!("{}.jenv", self.environment.name()))
    }
}

#[async_trait]
impl DeployClient for ToolClient {
    async fn quickstart(&self, bundle: &str, bootstrap_home: &Path) -> Result<()> {
        info!(bundle, env = self.environment.name(), "starting quickstart deploy");
        self.run_tool(bootstrap_home, &["quickstart", "-e", self.environment.name(), bundle])
            .await?;
        Ok(())
    }

    async fn machine_dns_name(&self, machine_id: &str) -> Result<String> {
        let mut found = None;
        self.wait_until(
            &format!("machine {} address", machine_id),
            DNS_NAME_TIMEOUT,
            |status| {
                found = status.machine_dns_name(machine_id).map(str::to_string);
                Ok(found.is_some())
            },
        )
        .await?;
        found.ok_or_else(|| BundlerunError::MachineNotFound { machine_id: machine_id.to_string() })
    }

    async fn wait_for_deploy_started(&self, min_services: usize) -> Result<()> {
        self.wait_until(
            &format!("at least {} services", min_services),
            DEPLOY_STARTED_TIMEOUT,
            |status| Ok(status.service_count() >= min_services),
        )
        .await
    }

    async fn wait_for_started(&self, timeout: Duration) -> Result<()> {
        self.wait_until("all agents started", timeout, |status| status.all_agents_started())
            .await
    }

    async fn destroy_environment(&self, delete_state_file: bool) -> Result<()> {
        info!(env = self.environment.name(), "destroying environment");
        self.run_tool(
            &self.config_home,
            &["destroy-environment", self.environment.name(), "--force", "--yes"],
        )
        .await?;

        if delete_state_file {
            let state_file = self.state_file();
            match std::fs::remove_file(&state_file) {
                Ok(()) => debug!(path = %state_file.display(), "removed environment state file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %state_file.display(), error = %e,
                          "failed to remove environment state file");
                }
            }
        }
        Ok(())
    }

    async fn status(&self) -> Result<Status> {
        self.status_from(&self.config_home).await
    }
}
