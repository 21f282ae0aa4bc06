//! HTTP gateway for the fleet manager.
//!
//! This crate provides the network surface of the fleet manager.
//! It handles:
//!
//! - REST endpoints for creating, listing, joining and deleting instances
//! - Webhooks for fabric deployment reports and instance reports
//! - Player location records used for placement
//! - Health and readiness probes
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────┐        ┌───────────────────────────┐
//! │   Clients (HTTP)      │        │  Fabric / instances       │
//! └───────────────────────┘        │  (webhooks)               │
//!             │                    └───────────────────────────┘
//!             ▼                                 │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       fleet-gateway                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  Instance   │  │   Event     │  │   Player            │  │
//! │  │  Handlers   │  │   Webhooks  │  │   Locations         │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                  ┌──────────────────────┐
//!                  │  FleetService        │
//!                  │  (fleet-control)     │
//!                  └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleet_control::{FleetService, PlayerDirectory};
//! use fleet_gateway::{create_router, GatewayConfig, GatewayState};
//! use fleet_provision::{HttpProvisioner, ProvisionConfig};
//! use fleet_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/fleet")?);
//! let provisioner = Arc::new(HttpProvisioner::new(ProvisionConfig::from_env()?)?);
//! let directory = Arc::new(PlayerDirectory::new());
//! let fleet = Arc::new(FleetService::with_defaults(store, provisioner, directory.clone()));
//!
//! let state = GatewayState::new(fleet, directory, GatewayConfig::default());
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;
