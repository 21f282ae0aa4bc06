//! Inbound reports from the deployment fabric and from instances.
//!
//! Each report names exactly one instance. Payloads arrive as JSON through
//! the webhook transport; missing optional fields take their defaults.

use std::collections::HashMap;
use std::fmt;

use fleet_core::{InstanceId, UserId};
use fleet_store::Metadata;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// Fabric status marking a deployment as up.
pub const STATUS_READY: &str = "Status.READY";

/// Fabric status marking a failed deployment.
pub const STATUS_ERROR: &str = "Status.ERROR";

/// Deployment status report sent by the fabric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentStatusReport {
    /// Deployment id, equal to the instance id.
    pub request_id: String,
    /// Raw fabric status string.
    pub current_status: String,
    /// Public IP address of the deployment.
    pub public_ip: String,
    /// Fully-qualified DNS name of the deployment.
    pub fqdn: String,
    /// Exposed ports keyed by port name.
    pub ports: HashMap<String, DeploymentPort>,
    /// Whether the deployment is running.
    pub running: bool,
    /// Whether the deployment failed.
    pub error: bool,
    /// Failure details.
    pub error_detail: String,
}

impl DeploymentStatusReport {
    /// The instance this report refers to.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Protocol` if the id is missing or malformed.
    pub fn instance_id(&self) -> Result<InstanceId> {
        parse_instance_id(&self.request_id)
    }

    /// Interpreted status.
    #[must_use]
    pub fn status(&self) -> DeploymentStatus {
        DeploymentStatus::parse(&self.current_status)
    }
}

/// A port exposed by a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentPort {
    /// Port reachable from the internet.
    pub external: u16,
    /// Port inside the container.
    pub internal: u16,
    /// Transport protocol.
    pub protocol: String,
    /// Port name.
    pub name: String,
    /// Fabric-provided link.
    pub link: String,
}

/// Fabric deployment status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentStatus {
    /// Deployment is up with allocated endpoints.
    Ready,
    /// Deployment failed.
    Error,
    /// Anything else.
    Other(String),
}

impl DeploymentStatus {
    /// Interpret a raw fabric status.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            STATUS_READY => Self::Ready,
            STATUS_ERROR => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str(STATUS_READY),
            Self::Error => f.write_str(STATUS_ERROR),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// Complete set of users connected to an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionReport {
    /// The reporting instance.
    pub instance_id: String,
    /// Every user currently connected.
    pub connections: Vec<String>,
}

impl ConnectionReport {
    /// The instance this report refers to.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Protocol` if the id is missing or malformed.
    pub fn instance_id(&self) -> Result<InstanceId> {
        parse_instance_id(&self.instance_id)
    }

    /// Validated user ids.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Protocol` if any id is malformed.
    pub fn user_ids(&self) -> Result<Vec<UserId>> {
        self.connections
            .iter()
            .map(|raw| {
                UserId::new(raw.as_str())
                    .map_err(|e| ControlError::Protocol(format!("bad user id {raw:?}: {e}")))
            })
            .collect()
    }
}

/// Lifecycle action reported by an instance process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceActionReport {
    /// The reporting instance.
    pub instance_id: String,
    /// Raw action string.
    pub action: String,
    /// Free-form message.
    pub message: String,
    /// Metadata to merge into the record on `READY`.
    pub metadata: Metadata,
}

impl InstanceActionReport {
    /// The instance this report refers to.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Protocol` if the id is missing or malformed.
    pub fn instance_id(&self) -> Result<InstanceId> {
        parse_instance_id(&self.instance_id)
    }

    /// Interpreted action.
    #[must_use]
    pub fn action(&self) -> InstanceAction {
        InstanceAction::parse(&self.action)
    }
}

/// Instance lifecycle action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceAction {
    /// Instance accepts players.
    Ready,
    /// Instance hit an error.
    Error,
    /// Instance wants to terminate.
    Stop,
    /// Anything else.
    Other(String),
}

impl InstanceAction {
    /// Interpret a raw action, ignoring case.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_uppercase().as_str() {
            "READY" => Self::Ready,
            "ERROR" => Self::Error,
            "STOP" => Self::Stop,
            _ => Self::Other(raw.to_string()),
        }
    }
}

fn parse_instance_id(raw: &str) -> Result<InstanceId> {
    InstanceId::new(raw).map_err(|e| ControlError::Protocol(format!("bad instance id {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_report_from_fabric_payload() {
        let report: DeploymentStatusReport = serde_json::from_str(
            r#"{
                "request_id": "a1b2c3",
                "current_status": "Status.READY",
                "public_ip": "203.0.113.9",
                "fqdn": "a1b2c3.fabric.example",
                "running": true,
                "ports": {
                    "gameport": {"external": 31501, "internal": 7777, "protocol": "UDP", "name": "gameport"}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(report.instance_id().unwrap().as_str(), "a1b2c3");
        assert_eq!(report.status(), DeploymentStatus::Ready);
        assert_eq!(report.ports["gameport"].external, 31501);
        assert!(report.error_detail.is_empty());
    }

    #[test]
    fn deployment_status_strings() {
        assert_eq!(DeploymentStatus::parse("Status.ERROR"), DeploymentStatus::Error);
        assert_eq!(
            DeploymentStatus::parse("Status.DEPLOYING"),
            DeploymentStatus::Other("Status.DEPLOYING".into())
        );
        // Fabric statuses are matched exactly.
        assert!(matches!(DeploymentStatus::parse("status.ready"), DeploymentStatus::Other(_)));
    }

    #[test]
    fn instance_actions_ignore_case() {
        assert_eq!(InstanceAction::parse("ready"), InstanceAction::Ready);
        assert_eq!(InstanceAction::parse("Stop"), InstanceAction::Stop);
        assert_eq!(InstanceAction::parse("ERROR"), InstanceAction::Error);
        assert_eq!(
            InstanceAction::parse("reboot"),
            InstanceAction::Other("reboot".into())
        );
    }

    #[test]
    fn missing_instance_id_is_protocol_error() {
        let report = ConnectionReport::default();
        assert!(matches!(report.instance_id(), Err(ControlError::Protocol(_))));

        let report = ConnectionReport {
            instance_id: "i-1".into(),
            connections: vec!["a".into(), String::new()],
        };
        assert!(matches!(report.user_ids(), Err(ControlError::Protocol(_))));
    }

    #[test]
    fn instance_report_metadata_defaults_to_empty() {
        let report: InstanceActionReport =
            serde_json::from_str(r#"{"instance_id": "i-1", "action": "READY"}"#).unwrap();
        assert!(report.metadata.is_empty());
        assert_eq!(report.action(), InstanceAction::Ready);
    }
}
