//! Instance management endpoints.
//!
//! This module provides handlers for the client-facing instance operations.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleet_control::{channel_callback, CreateInstanceRequest, CreateOutcome, FleetManager};
use fleet_core::{InstanceId, UserId};
use fleet_store::{ConnectionInfo, Instance, InstanceStatus, Metadata};

use crate::error::ApiError;
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response for a single instance.
#[derive(Debug, Serialize)]
pub struct InstanceResponse {
    /// Instance ID.
    pub instance_id: String,
    /// Current status.
    pub status: InstanceStatus,
    /// Creation timestamp.
    pub create_time: DateTime<Utc>,
    /// Connected players.
    pub player_count: i32,
    /// Network endpoint, once the deployment is up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_info: Option<ConnectionInfo>,
    /// Application metadata.
    pub metadata: Metadata,
    /// Seat capacity, negative for unlimited.
    pub max_players: i32,
    /// Free seats, `-1` for unlimited.
    pub available_seats: i32,
    /// Users holding a reservation.
    pub reservations: Vec<UserId>,
    /// Users currently connected.
    pub connections: Vec<UserId>,
}

impl From<Instance> for InstanceResponse {
    fn from(instance: Instance) -> Self {
        Self {
            instance_id: instance.id.to_string(),
            status: instance.status,
            create_time: instance.create_time,
            player_count: instance.player_count,
            connection_info: instance.connection_info,
            metadata: instance.metadata,
            max_players: instance.reservation.max_players,
            available_seats: instance.reservation.available_seats,
            reservations: instance.reservation.reservations,
            connections: instance.reservation.connections,
        }
    }
}

/// Request to create an instance.
#[derive(Debug, Deserialize)]
pub struct CreateInstanceBody {
    /// Seat capacity, negative for unlimited.
    pub max_players: i32,
    /// Users to reserve seats for.
    #[serde(default)]
    pub user_ids: Vec<UserId>,
    /// Application metadata forwarded to the instance.
    #[serde(default)]
    pub metadata: Metadata,
    /// Seconds to wait for the instance to become ready. Zero returns
    /// as soon as the fabric accepted the request.
    #[serde(default)]
    pub wait_seconds: u64,
}

/// Response for a create call.
#[derive(Debug, Serialize)]
pub struct CreateInstanceResponse {
    /// Instance ID.
    pub instance_id: String,
    /// Correlation id of the create.
    pub callback_id: String,
    /// Outcome, present when the caller waited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeBody>,
}

/// Outcome of a waited create.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeBody {
    /// The instance is ready.
    Success {
        /// The ready instance.
        instance: Box<InstanceResponse>,
    },
    /// The wait expired.
    Timeout {
        /// Timeout description.
        message: String,
    },
}

/// Query parameters for listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Filter expression.
    #[serde(default)]
    pub query: Option<String>,
    /// Page size.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Cursor from a previous page.
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Response for instance list.
#[derive(Debug, Serialize)]
pub struct ListInstancesResponse {
    /// Instances on this page.
    pub instances: Vec<InstanceResponse>,
    /// Cursor for the next page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Request to join an instance.
#[derive(Debug, Deserialize)]
pub struct JoinBody {
    /// Users to reserve seats for.
    pub user_ids: Vec<UserId>,
}

/// Response for a join.
#[derive(Debug, Serialize)]
pub struct JoinResponse {
    /// The instance after the join.
    pub instance: InstanceResponse,
    /// Per-user session details.
    pub session_info: Option<serde_json::Value>,
}

/// Request to overwrite the player count.
#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    /// Reported player count.
    pub player_count: i32,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create a new instance.
///
/// # Errors
///
/// Returns an error if the request is invalid, the fabric refuses the
/// deployment, or a waited create ends in an error.
pub async fn create_instance<F>(
    State(state): State<Arc<GatewayState<F>>>,
    headers: HeaderMap,
    Json(body): Json<CreateInstanceBody>,
) -> Result<impl IntoResponse, ApiError>
where
    F: FleetManager + 'static,
{
    let mut request =
        CreateInstanceRequest::new(body.max_players, body.user_ids).with_metadata(body.metadata);
    request.caller_hint = caller_hint(&headers);

    let (callback, mut outcome_rx) = channel_callback();
    let receipt = state.fleet.create(request, callback).await?;

    let wait = state.config.create_wait(body.wait_seconds);
    let outcome = if wait.is_zero() {
        None
    } else {
        match tokio::time::timeout(wait, &mut outcome_rx).await {
            Ok(received) => received.ok(),
            Err(_) => {
                // Whichever resolution wins lands in the channel.
                state.fleet.deliver_timeout(
                    &receipt.callback_id,
                    format!("instance not ready after {}s", wait.as_secs()),
                );
                outcome_rx.await.ok()
            }
        }
    };

    let (status, outcome) = match outcome {
        None => (StatusCode::ACCEPTED, None),
        Some(CreateOutcome::Success(instance)) => (
            StatusCode::CREATED,
            Some(OutcomeBody::Success {
                instance: Box::new(InstanceResponse::from(*instance)),
            }),
        ),
        Some(CreateOutcome::Timeout(message)) => {
            (StatusCode::ACCEPTED, Some(OutcomeBody::Timeout { message }))
        }
        Some(CreateOutcome::Error(message)) => {
            return Err(ApiError::BadGateway(format!(
                "instance {}: {message}",
                receipt.instance_id
            )));
        }
    };

    tracing::info!(
        instance_id = %receipt.instance_id,
        callback_id = %receipt.callback_id,
        status = status.as_u16(),
        "Create handled"
    );

    let response = CreateInstanceResponse {
        instance_id: receipt.instance_id.to_string(),
        callback_id: receipt.callback_id.to_string(),
        outcome,
    };

    Ok((status, Json(response)))
}

/// List instances.
///
/// # Errors
///
/// Returns `400 Bad Request` for a malformed query or cursor.
pub async fn list_instances<F>(
    State(state): State<Arc<GatewayState<F>>>,
    Query(params): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    F: FleetManager + 'static,
{
    let page = state
        .fleet
        .list(
            params.query.as_deref().unwrap_or_default(),
            params.limit,
            params.cursor,
        )
        .await?;

    let response = ListInstancesResponse {
        instances: page.items.into_iter().map(InstanceResponse::from).collect(),
        next_cursor: page.next_cursor,
    };

    Ok(Json(response))
}

/// Get an instance by ID.
///
/// # Errors
///
/// Returns `404 Not Found` if the instance doesn't exist.
pub async fn get_instance<F>(
    State(state): State<Arc<GatewayState<F>>>,
    Path(instance_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: FleetManager + 'static,
{
    let instance_id = parse_instance_id(&instance_id)?;
    let instance = state.fleet.get(&instance_id).await?;
    Ok(Json(InstanceResponse::from(instance)))
}

/// Reserve seats on an instance.
///
/// # Errors
///
/// Returns `404 Not Found` for an unknown instance and `409 Conflict` if
/// the instance has no room.
pub async fn join_instance<F>(
    State(state): State<Arc<GatewayState<F>>>,
    Path(instance_id): Path<String>,
    Json(body): Json<JoinBody>,
) -> Result<impl IntoResponse, ApiError>
where
    F: FleetManager + 'static,
{
    let instance_id = parse_instance_id(&instance_id)?;
    let info = state.fleet.join(&instance_id, &body.user_ids).await?;

    Ok(Json(JoinResponse {
        instance: InstanceResponse::from(info.instance),
        session_info: info.session_info,
    }))
}

/// Overwrite the player count of an instance.
///
/// Connection reports remain authoritative.
///
/// # Errors
///
/// Returns `404 Not Found` if the instance doesn't exist.
pub async fn update_instance<F>(
    State(state): State<Arc<GatewayState<F>>>,
    Path(instance_id): Path<String>,
    Json(body): Json<UpdateBody>,
) -> Result<impl IntoResponse, ApiError>
where
    F: FleetManager + 'static,
{
    let instance_id = parse_instance_id(&instance_id)?;
    state.fleet.update(&instance_id, body.player_count).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Terminate an instance.
///
/// # Errors
///
/// Returns `502 Bad Gateway` if the fabric fails the stop request.
pub async fn delete_instance<F>(
    State(state): State<Arc<GatewayState<F>>>,
    Path(instance_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: FleetManager + 'static,
{
    let instance_id = parse_instance_id(&instance_id)?;
    state.fleet.delete(&instance_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_instance_id(raw: &str) -> Result<InstanceId, ApiError> {
    InstanceId::new(raw).map_err(|e| ApiError::BadRequest(format!("invalid instance id: {e}")))
}

/// Address of the calling client, taken from proxy headers.
pub(crate) fn caller_hint(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .map(String::from)
}
