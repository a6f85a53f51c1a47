//! Cleanup-time observability: status printing and remote log collection.
//!
//! Both run while the environment is being torn down, usually after
//! something has already gone wrong, so they are deliberately forgiving:
//! status printing swallows its errors, and log collection reports failure
//! to the caller who logs it and moves on.

use crate::client::DeployClient;
use crate::error::{BundlerunError, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{info, warn};

/// Remote directory the deployment agents log into.
const REMOTE_LOG_DIR: &str = "/var/log/deploy";

/// Collects logs from the bootstrap host during cleanup.
#[async_trait]
pub trait LogDumper: Send + Sync {
    /// Copy the remote agent logs from `host` into `log_dir`.
    async fn dump_logs(&self, host: &str, log_dir: &Path) -> Result<()>;
}

/// Print the current environment status, swallowing any error.
///
/// Cleanup must keep going even when the controller is already unreachable.
pub async fn safe_print_status(client: &dyn DeployClient) {
    match client.status().await {
        Ok(status) => match serde_yaml::to_string(&status) {
            Ok(yaml) => println!("{}", yaml),
            Err(e) => warn!(error = %e, "could not render status"),
        },
        Err(e) => warn!(error = %e, "could not fetch status during cleanup"),
    }
}

/// Log dumper that scp's the remote log directory from the host.
pub struct SshLogDumper;

#[async_trait]
impl LogDumper for SshLogDumper {
    async fn dump_logs(&self, host: &str, log_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(log_dir).map_err(|e| BundlerunError::io(log_dir, e))?;
        info!(host, dir = %log_dir.display(), "dumping environment logs");

        let source = format!("ubuntu@{}:{}/*", host, REMOTE_LOG_DIR);
        let mut cmd = Command::new("scp");
        cmd.args([
            "-rC",
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            source.as_str(),
        ]);
        cmd.arg(log_dir);
        cmd.kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| BundlerunError::SpawnFailed {
            command: format!("scp {}", source),
            source: e,
        })?;
        if !output.status.success() {
            return Err(BundlerunError::CommandFailed {
                command: format!("scp {}", source),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
