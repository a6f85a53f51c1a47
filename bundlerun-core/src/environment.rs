//! Environment configuration.
//!
//! An environment is a named deployment target (cloud, region, credentials)
//! read from `environments.yaml` under the tool's config home. Test runs
//! rename the environment and layer a handful of overrides on top before the
//! client is constructed.

use crate::error::{BundlerunError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// On-disk shape of `environments.yaml`.
#[derive(Debug, Serialize, Deserialize)]
struct EnvironmentsFile {
    environments: BTreeMap<String, BTreeMap<String, serde_yaml::Value>>,
}

/// Overrides applied to an environment for the duration of one test run.
///
/// `None` fields leave the underlying config untouched.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub series: Option<String>,
    pub agent_url: Option<String>,
    pub region: Option<String>,
    pub agent_stream: Option<String>,
    pub bootstrap_host: Option<String>,
}

/// A named, configured deployment target.
#[derive(Debug, Clone)]
pub struct Environment {
    name: String,
    config: BTreeMap<String, serde_yaml::Value>,
}

impl Environment {
    /// Create an environment from a name and raw config attributes.
    pub fn new(name: impl Into<String>, config: BTreeMap<String, serde_yaml::Value>) -> Self {
        Self { name: name.into(), config }
    }

    /// Load the named environment from `environments.yaml` under `home`.
    pub fn from_config(home: &Path, name: &str) -> Result<Self> {
        let path = home.join("environments.yaml");
        let content =
            std::fs::read_to_string(&path).map_err(|e| BundlerunError::io(&path, e))?;
        let file: EnvironmentsFile = serde_yaml::from_str(&content).map_err(|e| {
            BundlerunError::InvalidConfig { reason: format!("{}: {}", path.display(), e) }
        })?;
        let config = file
            .environments
            .get(name)
            .cloned()
            .ok_or_else(|| BundlerunError::EnvironmentNotFound { name: name.to_string() })?;
        Ok(Self { name: name.to_string(), config })
    }

    /// Rename the environment (test runs use a disposable temp name) and
    /// apply config overrides.
    pub fn update(&mut self, temp_env_name: &str, overrides: &EnvOverrides) {
        self.name = temp_env_name.to_string();
        self.set_opt("default-series", overrides.series.as_deref());
        self.set_opt("tools-metadata-url", overrides.agent_url.as_deref());
        self.set_opt("region", overrides.region.as_deref());
        self.set_opt("agent-stream", overrides.agent_stream.as_deref());
        self.set_opt("bootstrap-host", overrides.bootstrap_host.as_deref());
    }

    fn set_opt(&mut self, key: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.config.insert(key.to_string(), serde_yaml::Value::from(value));
        }
    }

    /// Environment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a config attribute as a string.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    /// Serialize this environment alone as an `environments.yaml` document.
    ///
    /// Used to materialize the temp bootstrap home, which must contain only
    /// the environment under test.
    pub fn to_environments_yaml(&self) -> Result<String> {
        let mut environments = BTreeMap::new();
        environments.insert(self.name.clone(), self.config.clone());
        let file = EnvironmentsFile { environments };
        serde_yaml::to_string(&file)
            .map_err(|e| BundlerunError::InvalidConfig { reason: e.to_string() })
    }
}
