//! Types for the provisioning crate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};

/// Path of the deployment-status webhook on the public gateway.
pub const DEPLOYMENT_EVENT_PATH: &str = "/v1/events/deployment";

/// Path of the connection report endpoint on the public gateway.
pub const CONNECTION_EVENT_PATH: &str = "/v1/events/connection";

/// Path of the instance action endpoint on the public gateway.
pub const INSTANCE_EVENT_PATH: &str = "/v1/events/instance";

/// Configuration for the HTTP provisioner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Base URL of the provider API.
    pub base_url: String,
    /// Value sent in the `Authorization` header.
    pub api_token: String,
    /// Application name registered with the provider.
    pub application: String,
    /// Application version to deploy.
    pub version: String,
    /// Externally reachable URL of this service, used to build callback URLs.
    pub public_url: String,
    /// Shared key appended to callback URLs as `?key=`.
    pub event_key: Option<String>,
    /// Timeout applied to every provider request.
    #[serde(with = "secs")]
    pub request_timeout: Duration,
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

impl ProvisionConfig {
    /// Default provider request timeout.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `FLEET_PROVIDER_URL`: Base URL of the provider API
    /// - `FLEET_PROVIDER_TOKEN`: Authorization header value
    /// - `FLEET_APPLICATION`: Application name
    /// - `FLEET_APPLICATION_VERSION`: Application version
    /// - `FLEET_PUBLIC_URL`: Public URL instances use to report back
    ///
    /// Optional:
    /// - `FLEET_EVENT_KEY`: Shared key for callback URLs
    /// - `FLEET_REQUEST_TIMEOUT_SECS`: Provider request timeout (default 10)
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::Config` listing every missing or invalid variable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ProvisionConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut problems = Vec::new();
        let mut required = |name: &str| {
            let value = lookup(name).filter(|v| !v.trim().is_empty());
            if value.is_none() {
                problems.push(format!("{name} must be set"));
            }
            value.unwrap_or_default()
        };

        let base_url = required("FLEET_PROVIDER_URL");
        let api_token = required("FLEET_PROVIDER_TOKEN");
        let application = required("FLEET_APPLICATION");
        let version = required("FLEET_APPLICATION_VERSION");
        let public_url = required("FLEET_PUBLIC_URL");

        let request_timeout = match lookup("FLEET_REQUEST_TIMEOUT_SECS") {
            None => Self::DEFAULT_REQUEST_TIMEOUT,
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    problems.push(format!("invalid FLEET_REQUEST_TIMEOUT_SECS: {raw}"));
                    Self::DEFAULT_REQUEST_TIMEOUT
                }
            },
        };

        if !problems.is_empty() {
            return Err(ProvisionError::Config(problems.join("; ")));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            application,
            version,
            public_url: public_url.trim_end_matches('/').to_string(),
            event_key: lookup("FLEET_EVENT_KEY").filter(|k| !k.is_empty()),
            request_timeout,
        })
    }

    /// Build the public callback URL for one of the event endpoints.
    #[must_use]
    pub fn event_url(&self, path: &str) -> String {
        match &self.event_key {
            Some(key) => format!("{}{path}?key={key}", self.public_url),
            None => format!("{}{path}", self.public_url),
        }
    }
}

/// Successful answer to a create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentAccepted {
    /// Provider-assigned id, later used as the instance id.
    pub request_id: String,
    /// Human-readable provider message.
    #[serde(default)]
    pub message: String,
}

/// Result of a stop request that did not hard-fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The provider accepted the stop.
    Stopped {
        /// Provider message.
        message: String,
    },
    /// The provider no longer knows the deployment.
    AlreadyGone,
}

/// A deployment known to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSummary {
    /// Provider-assigned id.
    pub request_id: String,
    /// Whether the provider considers the deployment ready.
    #[serde(default)]
    pub ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const FULL: &[(&str, &str)] = &[
        ("FLEET_PROVIDER_URL", "https://api.example.com/"),
        ("FLEET_PROVIDER_TOKEN", "token abc"),
        ("FLEET_APPLICATION", "arena"),
        ("FLEET_APPLICATION_VERSION", "1.4.0"),
        ("FLEET_PUBLIC_URL", "https://fleet.example.com"),
    ];

    #[test]
    fn loads_required_values() {
        let config = ProvisionConfig::from_lookup(lookup(FULL)).unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.application, "arena");
        assert_eq!(config.event_key, None);
        assert_eq!(config.request_timeout, ProvisionConfig::DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn reports_all_missing_values() {
        let err = ProvisionConfig::from_lookup(lookup(&[("FLEET_APPLICATION", "arena")]))
            .unwrap_err()
            .to_string();
        assert!(err.contains("FLEET_PROVIDER_URL"));
        assert!(err.contains("FLEET_PROVIDER_TOKEN"));
        assert!(err.contains("FLEET_APPLICATION_VERSION"));
        assert!(err.contains("FLEET_PUBLIC_URL"));
        assert!(!err.contains("FLEET_APPLICATION "));
    }

    #[test]
    fn rejects_bad_timeout() {
        let mut vars = FULL.to_vec();
        vars.push(("FLEET_REQUEST_TIMEOUT_SECS", "soon"));
        let result = ProvisionConfig::from_lookup(lookup(&vars));
        assert!(matches!(result, Err(ProvisionError::Config(_))));
    }

    #[test]
    fn event_url_carries_key() {
        let mut vars = FULL.to_vec();
        vars.push(("FLEET_EVENT_KEY", "s3cret"));
        let config = ProvisionConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(
            config.event_url(CONNECTION_EVENT_PATH),
            "https://fleet.example.com/v1/events/connection?key=s3cret"
        );
    }
}
