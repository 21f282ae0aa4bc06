//! Webhook endpoints for inbound reports.
//!
//! The fabric posts deployment status reports; instances post connection
//! and lifecycle reports. When an event key is configured every call must
//! carry it as the `key` query parameter.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use fleet_control::{ConnectionReport, DeploymentStatusReport, FleetManager, InstanceActionReport};

use crate::config::GatewayConfig;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Query parameters accepted by every webhook.
#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    /// Shared event key.
    #[serde(default)]
    pub key: Option<String>,
}

/// Acknowledgement returned to the reporter.
#[derive(Debug, Serialize)]
pub struct EventAck {
    /// Always `"ok"`.
    pub status: &'static str,
}

const ACK: EventAck = EventAck { status: "ok" };

fn check_key(config: &GatewayConfig, query: &EventQuery) -> Result<(), ApiError> {
    match &config.event_key {
        Some(expected) if query.key.as_deref() != Some(expected.as_str()) => {
            tracing::warn!("Rejected event with missing or wrong key");
            Err(ApiError::Unauthorized)
        }
        _ => Ok(()),
    }
}

/// Receive a deployment status report from the fabric.
///
/// # Errors
///
/// Returns `401 Unauthorized` for a bad key and `404 Not Found` if the
/// report names an unknown instance.
pub async fn deployment_event<F>(
    State(state): State<Arc<GatewayState<F>>>,
    Query(query): Query<EventQuery>,
    Json(report): Json<DeploymentStatusReport>,
) -> Result<impl IntoResponse, ApiError>
where
    F: FleetManager + 'static,
{
    check_key(&state.config, &query)?;

    let request_id = report.request_id.clone();
    state
        .fleet
        .handle_deployment_event(report)
        .await
        .inspect_err(|e| tracing::warn!(request_id = %request_id, error = %e, "Deployment event failed"))?;

    Ok(Json(ACK))
}

/// Receive a connection report from an instance.
///
/// # Errors
///
/// Returns `401 Unauthorized` for a bad key and `404 Not Found` if the
/// report names an unknown instance.
pub async fn connection_event<F>(
    State(state): State<Arc<GatewayState<F>>>,
    Query(query): Query<EventQuery>,
    Json(report): Json<ConnectionReport>,
) -> Result<impl IntoResponse, ApiError>
where
    F: FleetManager + 'static,
{
    check_key(&state.config, &query)?;

    let instance_id = report.instance_id.clone();
    state
        .fleet
        .handle_connection_event(report)
        .await
        .inspect_err(|e| tracing::warn!(instance_id = %instance_id, error = %e, "Connection event failed"))?;

    Ok(Json(ACK))
}

/// Receive a lifecycle action from an instance.
///
/// # Errors
///
/// Returns `401 Unauthorized` for a bad key and `404 Not Found` if the
/// report names an unknown instance.
pub async fn instance_event<F>(
    State(state): State<Arc<GatewayState<F>>>,
    Query(query): Query<EventQuery>,
    Json(report): Json<InstanceActionReport>,
) -> Result<impl IntoResponse, ApiError>
where
    F: FleetManager + 'static,
{
    check_key(&state.config, &query)?;

    let instance_id = report.instance_id.clone();
    state
        .fleet
        .handle_instance_event(report)
        .await
        .inspect_err(|e| tracing::warn!(instance_id = %instance_id, error = %e, "Instance event failed"))?;

    Ok(Json(ACK))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_optional_when_unset() {
        let config = GatewayConfig::default();
        assert!(check_key(&config, &EventQuery::default()).is_ok());
    }

    #[test]
    fn key_must_match_when_set() {
        let config = GatewayConfig {
            event_key: Some("s3cret".to_string()),
            ..GatewayConfig::default()
        };
        assert!(matches!(
            check_key(&config, &EventQuery::default()),
            Err(ApiError::Unauthorized)
        ));
        assert!(check_key(
            &config,
            &EventQuery {
                key: Some("wrong".to_string())
            }
        )
        .is_err());
        assert!(check_key(
            &config,
            &EventQuery {
                key: Some("s3cret".to_string())
            }
        )
        .is_ok());
    }
}
