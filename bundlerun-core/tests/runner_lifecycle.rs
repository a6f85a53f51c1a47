//! Integration tests for the runner lifecycle.
//!
//! These verify the teardown guarantees:
//! - destroy runs exactly once on every exit path
//! - logs are dumped only when a bootstrap host was discovered
//! - steps are observed in order, immediately
//! - a step error takes precedence over a cleanup error
//!
//! Tests use a mock client and dumper for portability.

use bundlerun_core::environment::Environment;
use bundlerun_core::error::{BundlerunError, Result};
use bundlerun_core::logs::LogDumper;
use bundlerun_core::runner::{RunState, Runner, StepRecord};
use bundlerun_core::status::Status;
use bundlerun_core::DeployClient;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock client that records every call it receives.
#[derive(Clone, Default)]
struct MockClient {
    calls: Arc<Mutex<Vec<String>>>,
    /// Step method name to fail from, if any.
    fail_on: Option<&'static str>,
    /// Make destroy_environment fail.
    destroy_fails: bool,
}

impl MockClient {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn maybe_fail(&self, method: &'static str) -> Result<()> {
        if self.fail_on == Some(method) {
            return Err(BundlerunError::CommandFailed {
                command: method.to_string(),
                stderr: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DeployClient for MockClient {
    async fn quickstart(&self, bundle: &str, _bootstrap_home: &Path) -> Result<()> {
        self.record(format!("quickstart {}", bundle));
        self.maybe_fail("quickstart")
    }

    async fn machine_dns_name(&self, machine_id: &str) -> Result<String> {
        self.record(format!("machine_dns_name {}", machine_id));
        self.maybe_fail("machine_dns_name")?;
        Ok("host.example.com".to_string())
    }

    async fn wait_for_deploy_started(&self, min_services: usize) -> Result<()> {
        self.record(format!("wait_for_deploy_started {}", min_services));
        self.maybe_fail("wait_for_deploy_started")
    }

    async fn wait_for_started(&self, timeout: Duration) -> Result<()> {
        self.record(format!("wait_for_started {}", timeout.as_secs()));
        self.maybe_fail("wait_for_started")
    }

    async fn destroy_environment(&self, delete_state_file: bool) -> Result<()> {
        self.record(format!("destroy_environment {}", delete_state_file));
        if self.destroy_fails {
            return Err(BundlerunError::CommandFailed {
                command: "destroy-environment".to_string(),
                stderr: "provider unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn status(&self) -> Result<Status> {
        self.record("status");
        Ok(Status::default())
    }
}

/// Mock dumper recording the hosts it was asked to dump from.
#[derive(Clone, Default)]
struct MockDumper {
    dumped: Arc<Mutex<Vec<String>>>,
    fails: bool,
}

#[async_trait::async_trait]
impl LogDumper for MockDumper {
    async fn dump_logs(&self, host: &str, _log_dir: &Path) -> Result<()> {
        self.dumped.lock().unwrap().push(host.to_string());
        if self.fails {
            return Err(BundlerunError::CommandFailed {
                command: "scp".to_string(),
                stderr: "no route to host".to_string(),
            });
        }
        Ok(())
    }
}

struct Harness {
    runner: Runner,
    client: MockClient,
    dumper: MockDumper,
    observed: Arc<Mutex<Vec<StepRecord>>>,
    _home: tempfile::TempDir,
}

fn harness(client: MockClient, dumper: MockDumper, service_count: usize) -> Harness {
    let home = tempfile::tempdir().unwrap();
    let log_dir = home.path().join("logs");
    let environment = Environment::new("test-temp", BTreeMap::new());
    let observed: Arc<Mutex<Vec<StepRecord>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();

    let runner = Runner::new(
        Box::new(client.clone()),
        environment,
        "bundle.yaml",
        &log_dir,
        service_count,
        home.path(),
        Box::new(dumper.clone()),
    )
    .with_observer(Box::new(move |record| sink.lock().unwrap().push(record.clone())));

    Harness { runner, client, dumper, observed, _home: home }
}

fn destroy_count(calls: &[String]) -> usize {
    calls.iter().filter(|c| c.starts_with("destroy_environment")).count()
}

#[tokio::test]
async fn success_path_runs_steps_in_order_then_cleans_up() {
    let mut h = harness(MockClient::default(), MockDumper::default(), 2);
    h.runner.run().await.unwrap();

    assert_eq!(h.runner.state(), RunState::Succeeded);
    assert_eq!(h.runner.bootstrap_host(), Some("host.example.com"));

    let calls = h.client.calls();
    assert_eq!(
        calls,
        vec![
            "quickstart bundle.yaml",
            "machine_dns_name 0",
            "wait_for_deploy_started 2",
            "wait_for_started 3600",
            "status",
            "destroy_environment true",
        ]
    );
    assert_eq!(*h.dumper.dumped.lock().unwrap(), vec!["host.example.com"]);

    let steps: Vec<&str> = h.runner.steps().iter().map(|s| s.step).collect();
    assert_eq!(steps, vec!["quickstart", "bootstrap-host", "deploy-started", "agents-started"]);
}

#[tokio::test]
async fn agents_wait_uses_exactly_3600_seconds() {
    let mut h = harness(MockClient::default(), MockDumper::default(), 2);
    h.runner.run().await.unwrap();

    assert!(h.client.calls().contains(&"wait_for_started 3600".to_string()));
}

#[tokio::test]
async fn service_count_is_passed_through() {
    let mut h = harness(MockClient::default(), MockDumper::default(), 5);
    h.runner.run().await.unwrap();

    assert!(h.client.calls().contains(&"wait_for_deploy_started 5".to_string()));
}

#[tokio::test]
async fn quickstart_failure_skips_dump_but_still_destroys() {
    let client = MockClient { fail_on: Some("quickstart"), ..Default::default() };
    let mut h = harness(client, MockDumper::default(), 2);

    let err = h.runner.run().await.unwrap_err();
    assert_eq!(err.kind(), "CommandFailed");
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(h.runner.state(), RunState::Failed);
    assert_eq!(h.runner.bootstrap_host(), None);

    // No status/log dump without a bootstrap host, destroy still happens
    let calls = h.client.calls();
    assert!(!calls.contains(&"status".to_string()));
    assert!(h.dumper.dumped.lock().unwrap().is_empty());
    assert_eq!(destroy_count(&calls), 1);

    assert!(h.observed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn late_failure_still_dumps_from_discovered_host() {
    let client = MockClient { fail_on: Some("wait_for_started"), ..Default::default() };
    let mut h = harness(client, MockDumper::default(), 2);

    h.runner.run().await.unwrap_err();

    assert_eq!(*h.dumper.dumped.lock().unwrap(), vec!["host.example.com"]);
    assert_eq!(destroy_count(&h.client.calls()), 1);

    // Steps completed before the failure were observed, in order
    let observed: Vec<&'static str> = h.observed.lock().unwrap().iter().map(|s| s.step).collect();
    assert_eq!(observed, vec!["quickstart", "bootstrap-host", "deploy-started"]);
}

#[tokio::test]
async fn step_error_wins_over_destroy_error() {
    let client = MockClient {
        fail_on: Some("wait_for_deploy_started"),
        destroy_fails: true,
        ..Default::default()
    };
    let mut h = harness(client, MockDumper::default(), 2);

    let err = h.runner.run().await.unwrap_err();
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(destroy_count(&h.client.calls()), 1);
}

#[tokio::test]
async fn destroy_error_surfaces_on_clean_run() {
    let client = MockClient { destroy_fails: true, ..Default::default() };
    let mut h = harness(client, MockDumper::default(), 2);

    let err = h.runner.run().await.unwrap_err();
    assert!(err.to_string().contains("provider unavailable"));
    assert_eq!(h.runner.state(), RunState::Failed);
}

#[tokio::test]
async fn dump_failure_does_not_prevent_destroy() {
    let dumper = MockDumper { fails: true, ..Default::default() };
    let mut h = harness(MockClient::default(), dumper, 2);

    h.runner.run().await.unwrap();
    assert_eq!(destroy_count(&h.client.calls()), 1);
}

#[tokio::test]
async fn bootstrap_host_rides_on_its_step_record() {
    let mut h = harness(MockClient::default(), MockDumper::default(), 2);
    h.runner.run().await.unwrap();

    let observed = h.observed.lock().unwrap();
    let host_step = observed.iter().find(|s| s.step == "bootstrap-host").unwrap();
    assert_eq!(host_step.bootstrap_host.as_deref(), Some("host.example.com"));
    assert!(observed.iter().filter(|s| s.step != "bootstrap-host").all(|s| s.bootstrap_host.is_none()));
}
