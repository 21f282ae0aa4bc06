//! Request and response types for lifecycle operations.

use std::time::Duration;

use fleet_core::{CallbackId, InstanceId, UserId};
use fleet_store::{Instance, Metadata};
use serde::{Deserialize, Serialize};

/// Request to provision a new instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    /// Seat capacity; negative for unlimited.
    pub max_players: i32,
    /// Users who get a reservation on the new instance.
    #[serde(default)]
    pub user_ids: Vec<UserId>,
    /// Application data forwarded to the instance.
    #[serde(default)]
    pub metadata: Metadata,
    /// Address of the caller, used when no user has a known address.
    #[serde(default)]
    pub caller_hint: Option<String>,
}

impl CreateInstanceRequest {
    /// Create a request for `max_players` seats reserving `user_ids`.
    #[must_use]
    pub fn new(max_players: i32, user_ids: Vec<UserId>) -> Self {
        Self {
            max_players,
            user_ids,
            metadata: Metadata::new(),
            caller_hint: None,
        }
    }

    /// Set the caller's address.
    #[must_use]
    pub fn with_caller_hint(mut self, hint: impl Into<String>) -> Self {
        self.caller_hint = Some(hint.into());
        self
    }

    /// Set the application metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// What a successful create hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReceipt {
    /// Id of the new instance.
    pub instance_id: InstanceId,
    /// Id under which the create callback will be resolved.
    pub callback_id: CallbackId,
}

/// Result of a successful join.
#[derive(Debug, Clone, Serialize)]
pub struct JoinInfo {
    /// The instance after the join.
    pub instance: Instance,
    /// Per-user session details. Not issued yet, always `None`.
    pub session_info: Option<serde_json::Value>,
}

/// Configuration for the lifecycle engine.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Name of the deployment port whose external port is handed to players.
    pub port_name: String,
    /// Whether the reconciliation sweep runs.
    pub sweep_enabled: bool,
    /// Time between reconciliation sweeps.
    pub sweep_interval: Duration,
    /// Records younger than this are never swept.
    pub sweep_grace: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            port_name: "gameport".to_string(),
            sweep_enabled: true,
            sweep_interval: Duration::from_secs(900), // 15 minutes
            sweep_grace: Duration::from_secs(60),
        }
    }
}

impl ControlConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `FLEET_PORT_NAME`: Deployment port name exposed to players
    /// - `FLEET_SWEEP_ENABLED`: `false` or `0` disables the sweep
    /// - `FLEET_SWEEP_INTERVAL_SECS`: Seconds between sweeps
    /// - `FLEET_SWEEP_GRACE_SECS`: Minimum record age before it can be swept
    ///
    /// Unparseable values keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("FLEET_PORT_NAME").filter(|v| !v.is_empty()) {
            config.port_name = val;
        }
        if let Some(val) = lookup("FLEET_SWEEP_ENABLED") {
            config.sweep_enabled = !matches!(val.to_lowercase().as_str(), "false" | "0" | "no");
        }
        if let Some(val) = lookup("FLEET_SWEEP_INTERVAL_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                if n > 0 {
                    config.sweep_interval = Duration::from_secs(n);
                }
            }
        }
        if let Some(val) = lookup("FLEET_SWEEP_GRACE_SECS") {
            if let Ok(n) = val.parse() {
                config.sweep_grace = Duration::from_secs(n);
            }
        }

        config
    }
}
