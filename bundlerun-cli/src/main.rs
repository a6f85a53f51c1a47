//! bundlerun - quickstart-deploy test harness CLI.

use anyhow::Context;
use bundlerun_core::{BundlerunError, EnvOverrides, RunConfig, Runner};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bundlerun")]
#[command(about = "Bootstrap an environment, quickstart-deploy a bundle, and wait for it to come up", long_about = None)]
struct Args {
    /// Environment name from environments.yaml
    env: String,

    /// Path to the deployment tool binary
    tool_bin: PathBuf,

    /// Directory to dump environment logs into
    logs: PathBuf,

    /// Disposable environment name for this run
    temp_env_name: String,

    /// URL or path to a bundle
    bundle: String,

    /// Minimum number of expected services
    #[arg(long, default_value_t = 2)]
    service_count: usize,

    /// OS series to deploy on
    #[arg(long)]
    series: Option<String>,

    /// URL to fetch agent binaries from
    #[arg(long)]
    agent_url: Option<String>,

    /// Cloud region to deploy into
    #[arg(long)]
    region: Option<String>,

    /// Stream to fetch agent binaries from
    #[arg(long)]
    agent_stream: Option<String>,

    /// Address of a pre-existing host to bootstrap onto
    #[arg(long)]
    bootstrap_host: Option<String>,

    /// Pass --debug to the deployment tool
    #[arg(long)]
    debug: bool,

    /// Increase log verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Tool config home: `BUNDLERUN_HOME`, falling back to `~/.bundlerun`.
fn config_home() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("BUNDLERUN_HOME") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|h| h.join(".bundlerun"))
        .context("cannot determine home directory")
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(true)
        .init();
}

async fn run(args: Args) -> bundlerun_core::Result<()> {
    let config = RunConfig {
        env: args.env,
        temp_env_name: args.temp_env_name,
        tool_path: args.tool_bin,
        log_dir: args.logs,
        bundle: args.bundle,
        service_count: args.service_count,
        overrides: EnvOverrides {
            series: args.series,
            agent_url: args.agent_url,
            region: args.region,
            agent_stream: args.agent_stream,
            bootstrap_host: args.bootstrap_host,
        },
        debug: args.debug,
        config_home: config_home().map_err(BundlerunError::from)?,
    };

    info!(env = %config.env, bundle = %config.bundle, "starting quickstart run");
    let mut runner = Runner::from_args(&config).await?.with_observer(Box::new(|record| {
        println!("{} {}: {}", "✓".green().bold(), record.step.bold(), record.status);
    }));
    runner.run().await?;
    info!("quickstart run complete");
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        println!("{} ({})", e, e.kind());
        std::process::exit(1);
    }
}
