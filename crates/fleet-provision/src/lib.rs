//! Client for the remote deployment fabric.
//!
//! This crate provides the [`Provisioner`] trait and the [`HttpProvisioner`]
//! implementation that talks to the provider's REST API. It handles:
//!
//! - Create requests carrying callback URLs and caller metadata
//! - Stop requests, with "already gone" treated as a soft result
//! - Paginated listing of every known deployment
//!
//! # Example
//!
//! ```no_run
//! use fleet_provision::{HttpProvisioner, Metadata, ProvisionConfig, Provisioner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provisioner = HttpProvisioner::new(ProvisionConfig::from_env()?)?;
//!
//! let accepted = provisioner
//!     .create_deployment(&["203.0.113.7".to_string()], &Metadata::new())
//!     .await?;
//! println!("deployment {} requested", accepted.request_id);
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! Enable the `test-utils` feature for an in-memory [`MockProvisioner`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod types;

pub use client::{HttpProvisioner, Metadata, Provisioner};
pub use error::{ProvisionError, Result};
pub use types::{
    DeploymentAccepted, DeploymentSummary, ProvisionConfig, StopOutcome, CONNECTION_EVENT_PATH,
    DEPLOYMENT_EVENT_PATH, INSTANCE_EVENT_PATH,
};

#[cfg(any(test, feature = "test-utils"))]
pub use client::mock::MockProvisioner;
