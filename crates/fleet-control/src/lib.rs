//! Instance lifecycle and seat reservation engine.
//!
//! This crate owns the business rules of the fleet manager: how an instance
//! moves from request to teardown, how seats are reserved and released, and
//! how an asynchronous create call is eventually resolved.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │               Gateway (client calls + webhooks)              │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        FleetService                          │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌────────┐  │
//! │  │   Seat     │  │ Lifecycle  │  │  Callback  │  │ Sweep  │  │
//! │  │   Ledger   │  │  States    │  │  Registry  │  │        │  │
//! │  └────────────┘  └────────────┘  └────────────┘  └────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!               ┌───────────────┼───────────────┐
//!               ▼               ▼               ▼
//!        ┌────────────┐  ┌────────────┐  ┌────────────┐
//!        │   Store    │  │ Provisioner│  │  Location  │
//!        │ (RocksDB)  │  │  (fabric)  │  │  Resolver  │
//!        └────────────┘  └────────────┘  └────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleet_control::{channel_callback, CreateInstanceRequest, FleetManager, FleetService, PlayerDirectory};
//! use fleet_core::UserId;
//! use fleet_provision::{HttpProvisioner, ProvisionConfig};
//! use fleet_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/fleet")?);
//! let provisioner = Arc::new(HttpProvisioner::new(ProvisionConfig::from_env()?)?);
//! let fleet = FleetService::with_defaults(store, provisioner, Arc::new(PlayerDirectory::new()));
//!
//! let (callback, ready) = channel_callback();
//! let request = CreateInstanceRequest::new(8, vec![UserId::new("alice")?])
//!     .with_caller_hint("203.0.113.7");
//! let receipt = fleet.create(request, callback).await?;
//! println!("requested {}", receipt.instance_id);
//!
//! let outcome = ready.await?;
//! println!("create finished: {}", outcome.kind());
//! # Ok(())
//! # }
//! ```
//!
//! # Seat Accounting
//!
//! For an instance with `max_players >= 0`:
//!
//! ```text
//! available_seats = max_players - |reservations| - |connections|
//! ```
//!
//! A negative `max_players` disables seat checks and reports
//! `available_seats = -1`. Derived fields are recomputed before every write.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod callbacks;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod location;
pub mod seats;
pub mod service;
pub mod sweep;
pub mod types;

pub use callbacks::{channel_callback, CallbackRegistry, CreateCallback, CreateOutcome};
pub use error::{ControlError, Result};
pub use events::{
    ConnectionReport, DeploymentPort, DeploymentStatus, DeploymentStatusReport, InstanceAction,
    InstanceActionReport,
};
pub use location::{LocationResolver, PlayerDirectory};
pub use service::{FleetManager, FleetService};
pub use sweep::{run_sweeper, SweepReport};
pub use types::{ControlConfig, CreateInstanceRequest, CreateReceipt, JoinInfo};
