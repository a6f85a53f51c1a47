//! bundlerun core library.
//!
//! Environment config, deployment client, bootstrap scoping, log collection,
//! and the quickstart test runner.

pub mod bootstrap;
pub mod client;
pub mod environment;
pub mod error;
pub mod logs;
pub mod runner;
pub mod status;

// Re-export commonly used items
pub use client::{DeployClient, ToolClient};
pub use environment::{EnvOverrides, Environment};
pub use error::{BundlerunError, Result};
pub use logs::{LogDumper, SshLogDumper};
pub use runner::{RunConfig, RunState, Runner, StepRecord};
pub use status::Status;
