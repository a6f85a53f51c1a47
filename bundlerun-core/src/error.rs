//! Error types for bundlerun.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bundlerun operations.
pub type Result<T> = std::result::Result<T, BundlerunError>;

/// Main error type for bundlerun.
#[derive(Error, Debug)]
pub enum BundlerunError {
    // Configuration errors
    #[error("Environment not found in environments.yaml: {name}")]
    EnvironmentNotFound { name: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Tool invocation errors
    #[error("Command failed: {command}: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Failed to spawn {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Status errors
    #[error("Failed to parse status output: {reason}")]
    StatusParse { reason: String },

    #[error("Machine not found in status: {machine_id}")]
    MachineNotFound { machine_id: String },

    #[error("Agent {entity} is in error state: {state}")]
    AgentError { entity: String, state: String },

    // Wait errors
    #[error("Timed out after {secs}s waiting for {what}")]
    WaitTimeout { what: String, secs: u64 },

    // File system errors
    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BundlerunError {
    /// Short variant name, used by the CLI to suffix error output
    /// as `"<message> (<kind>)"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EnvironmentNotFound { .. } => "EnvironmentNotFound",
            Self::InvalidConfig { .. } => "InvalidConfig",
            Self::CommandFailed { .. } => "CommandFailed",
            Self::SpawnFailed { .. } => "SpawnFailed",
            Self::StatusParse { .. } => "StatusParse",
            Self::MachineNotFound { .. } => "MachineNotFound",
            Self::AgentError { .. } => "AgentError",
            Self::WaitTimeout { .. } => "WaitTimeout",
            Self::IoError { .. } => "IoError",
            Self::Other(_) => "Error",
        }
    }

    /// Create an IoError with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError { path: path.into(), source }
    }
}
