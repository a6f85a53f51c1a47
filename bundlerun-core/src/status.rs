//! Deployment status document model.
//!
//! Parses the YAML emitted by the deployment tool's `status` command and
//! answers the questions the wait loops ask of it: which address a machine
//! has, how many services exist, and whether every agent reports `started`.

use crate::error::{BundlerunError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Agent state reported for a ready machine or unit.
pub const AGENT_STARTED: &str = "started";

/// Agent state reported for a failed machine or unit.
pub const AGENT_ERROR: &str = "error";

/// Parsed status document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub machines: BTreeMap<String, MachineStatus>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceStatus>,
}

/// Status of one provisioned machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MachineStatus {
    #[serde(rename = "dns-name", skip_serializing_if = "Option::is_none")]
    pub dns_name: Option<String>,
    #[serde(rename = "agent-state", skip_serializing_if = "Option::is_none")]
    pub agent_state: Option<String>,
}

/// Status of one deployed service and its units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStatus {
    #[serde(default)]
    pub units: BTreeMap<String, UnitStatus>,
}

/// Status of one service unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitStatus {
    #[serde(rename = "agent-state", skip_serializing_if = "Option::is_none")]
    pub agent_state: Option<String>,
}

impl Status {
    /// Parse a status document from the tool's YAML output.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| BundlerunError::StatusParse { reason: e.to_string() })
    }

    /// DNS name of the given machine, if the provider has published one yet.
    pub fn machine_dns_name(&self, machine_id: &str) -> Option<&str> {
        self.machines.get(machine_id).and_then(|m| m.dns_name.as_deref())
    }

    /// Number of services the deployment currently knows about.
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Whether every machine and unit agent reports `started`.
    ///
    /// A status with no machines means the controller has not reported any
    /// yet, not that everything is ready. An agent in `error` state never
    /// recovers, so it fails the run immediately instead of letting the
    /// wait loop run out its timeout.
    pub fn all_agents_started(&self) -> Result<bool> {
        if self.machines.is_empty() {
            return Ok(false);
        }
        for (entity, state) in self.agent_states() {
            match state {
                Some(AGENT_ERROR) => {
                    return Err(BundlerunError::AgentError {
                        entity,
                        state: AGENT_ERROR.to_string(),
                    });
                }
                Some(AGENT_STARTED) => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    fn agent_states(&self) -> impl Iterator<Item = (String, Option<&str>)> {
        let machines = self
            .machines
            .iter()
            .map(|(id, m)| (format!("machine-{}", id), m.agent_state.as_deref()));
        let units = self.services.values().flat_map(|s| {
            s.units.iter().map(|(name, u)| (name.clone(), u.agent_state.as_deref()))
        });
        machines.chain(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STARTED: &str = "\
machines:
  \"0\":
    dns-name: host.example.com
    agent-state: started
services:
  wordpress:
    units:
      wordpress/0:
        agent-state: started
  mysql:
    units:
      mysql/0:
        agent-state: started
";

    #[test]
    fn parses_machine_dns_name() {
        let status = Status::from_yaml(STARTED).unwrap();
        assert_eq!(status.machine_dns_name("0"), Some("host.example.com"));
        assert_eq!(status.machine_dns_name("1"), None);
    }

    #[test]
    fn counts_services() {
        let status = Status::from_yaml(STARTED).unwrap();
        assert_eq!(status.service_count(), 2);
    }

    #[test]
    fn all_started_when_every_agent_reports_started() {
        let status = Status::from_yaml(STARTED).unwrap();
        assert!(status.all_agents_started().unwrap());
    }

    #[test]
    fn pending_agent_is_not_started() {
        let yaml = "\
machines:
  \"0\":
    agent-state: pending
";
        let status = Status::from_yaml(yaml).unwrap();
        assert!(!status.all_agents_started().unwrap());
    }

    #[test]
    fn missing_agent_state_is_not_started() {
        let yaml = "\
services:
  wordpress:
    units:
      wordpress/0: {}
";
        let status = Status::from_yaml(yaml).unwrap();
        assert!(!status.all_agents_started().unwrap());
    }

    #[test]
    fn error_agent_fails_fast() {
        let yaml = "\
machines:
  \"0\":
    agent-state: started
services:
  wordpress:
    units:
      wordpress/0:
        agent-state: error
";
        let status = Status::from_yaml(yaml).unwrap();
        let err = status.all_agents_started().unwrap_err();
        assert_eq!(err.kind(), "AgentError");
        assert!(err.to_string().contains("wordpress/0"));
    }

    #[test]
    fn empty_status_is_not_started() {
        let status = Status::from_yaml("{}").unwrap();
        assert_eq!(status.service_count(), 0);
        assert!(!status.all_agents_started().unwrap());
    }

    #[test]
    fn started_units_without_machines_are_not_started() {
        let yaml = "\
services:
  wordpress:
    units:
      wordpress/0:
        agent-state: started
";
        let status = Status::from_yaml(yaml).unwrap();
        assert!(!status.all_agents_started().unwrap());
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = Status::from_yaml("machines: [not, a, map").unwrap_err();
        assert_eq!(err.kind(), "StatusParse");
    }
}
