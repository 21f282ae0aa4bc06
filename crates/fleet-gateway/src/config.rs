//! Gateway configuration types.
//!
//! This module defines configuration structures for the HTTP gateway.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Upper bound for a create call that waits for its outcome.
    #[serde(default = "GatewayConfig::default_max_create_wait")]
    pub max_create_wait_seconds: u64,

    /// Shared key required on event webhooks, if set.
    #[serde(default)]
    pub event_key: Option<String>,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    const fn default_max_body() -> usize {
        1024 * 1024 // 1 MB
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_max_create_wait() -> u64 {
        20
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `LISTEN_ADDR`: Listen address
    /// - `FLEET_CORS_ORIGINS`: Comma-separated allowed origins
    /// - `FLEET_MAX_BODY_BYTES`: Maximum request body size
    /// - `FLEET_HTTP_TIMEOUT_SECS`: Request timeout
    /// - `FLEET_MAX_CREATE_WAIT_SECS`: Upper bound for waiting creates
    /// - `FLEET_EVENT_KEY`: Shared webhook key
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("LISTEN_ADDR") {
            config.listen_addr = val;
        }
        if let Some(val) = lookup("FLEET_CORS_ORIGINS") {
            config.cors_origins = val
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(n) = lookup("FLEET_MAX_BODY_BYTES").and_then(|v| v.parse().ok()) {
            config.max_body_bytes = n;
        }
        if let Some(n) = lookup("FLEET_HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            config.request_timeout_seconds = n;
        }
        if let Some(n) = lookup("FLEET_MAX_CREATE_WAIT_SECS").and_then(|v| v.parse().ok()) {
            config.max_create_wait_seconds = n;
        }
        config.event_key = lookup("FLEET_EVENT_KEY").filter(|k| !k.is_empty());

        config
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Clamp a requested create wait to the configured maximum.
    #[must_use]
    pub fn create_wait(&self, requested_seconds: u64) -> Duration {
        Duration::from_secs(requested_seconds.min(self.max_create_wait_seconds))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            max_create_wait_seconds: Self::default_max_create_wait(),
            event_key: None,
        }
    }
}
