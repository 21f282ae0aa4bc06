//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use fleet_control::FleetManager;
use fleet_provision::{CONNECTION_EVENT_PATH, DEPLOYMENT_EVENT_PATH, INSTANCE_EVENT_PATH};

use crate::handlers::{events, health, instances, players};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Health
/// - `GET /health` - Liveness
/// - `GET /ready` - Readiness
///
/// ## Instances
/// - `GET /v1/instances` - List instances
/// - `POST /v1/instances` - Create instance
/// - `GET /v1/instances/:instance_id` - Get instance
/// - `PUT /v1/instances/:instance_id` - Overwrite player count
/// - `DELETE /v1/instances/:instance_id` - Delete instance
/// - `POST /v1/instances/:instance_id/join` - Reserve seats
///
/// ## Players
/// - `PUT /v1/players/:user_id/location` - Record a player address
///
/// ## Webhooks
/// - `POST /v1/events/deployment` - Fabric deployment status
/// - `POST /v1/events/connection` - Instance connection report
/// - `POST /v1/events/instance` - Instance lifecycle action
pub fn create_router<F>(state: GatewayState<F>) -> Router
where
    F: FleetManager + 'static,
{
    // Extract config values before moving state
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        // Health
        .route("/health", get(health::health))
        .route("/ready", get(health::ready::<F>))
        // Instances
        .route(
            "/v1/instances",
            get(instances::list_instances::<F>).post(instances::create_instance::<F>),
        )
        .route(
            "/v1/instances/:instance_id",
            get(instances::get_instance::<F>)
                .put(instances::update_instance::<F>)
                .delete(instances::delete_instance::<F>),
        )
        .route(
            "/v1/instances/:instance_id/join",
            post(instances::join_instance::<F>),
        )
        // Players
        .route(
            "/v1/players/:user_id/location",
            put(players::record_location::<F>),
        )
        // Webhooks
        .route(DEPLOYMENT_EVENT_PATH, post(events::deployment_event::<F>))
        .route(CONNECTION_EVENT_PATH, post(events::connection_event::<F>))
        .route(INSTANCE_EVENT_PATH, post(events::instance_event::<F>))
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(RequestBodyLimitLayer::new(max_body_bytes))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
