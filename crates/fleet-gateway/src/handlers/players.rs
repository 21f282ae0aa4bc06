//! Player location endpoint.
//!
//! Records the address a player was last seen at. Creates use these
//! addresses to ask the fabric for nearby placement.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use fleet_control::FleetManager;
use fleet_core::UserId;

use crate::error::ApiError;
use crate::handlers::instances::caller_hint;
use crate::state::GatewayState;

/// Request to record a player address.
#[derive(Debug, Default, Deserialize)]
pub struct LocationBody {
    /// Address to record. Defaults to the caller's forwarded address.
    #[serde(default)]
    pub address: Option<String>,
}

/// Record the address of a player.
///
/// # Errors
///
/// Returns `400 Bad Request` if the user id is invalid or no address is
/// available.
pub async fn record_location<F>(
    State(state): State<Arc<GatewayState<F>>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<LocationBody>,
) -> Result<impl IntoResponse, ApiError>
where
    F: FleetManager + 'static,
{
    let user_id =
        UserId::new(user_id).map_err(|e| ApiError::BadRequest(format!("invalid user id: {e}")))?;

    let address = body
        .address
        .filter(|a| !a.trim().is_empty())
        .or_else(|| caller_hint(&headers))
        .ok_or_else(|| ApiError::BadRequest("no address given".to_string()))?;

    tracing::debug!(user_id = %user_id, address = %address, "Recorded player location");
    state.directory.record(user_id, address);

    Ok(StatusCode::NO_CONTENT)
}
