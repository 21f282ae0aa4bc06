//! Core types and utilities for the fleet manager.
//!
//! This crate provides the foundational types used throughout the fleet:
//!
//! - **Identifiers**: Strongly-typed IDs for instances, users, and create callbacks
//! - **Validation**: `IdError` for malformed identifiers
//!
//! # Example
//!
//! ```
//! use fleet_core::{CallbackId, InstanceId, UserId};
//!
//! // Instance IDs are assigned by the provisioning fabric
//! let instance_id = InstanceId::new("9f2c1e7a4b").unwrap();
//!
//! // User IDs come from the caller
//! let user_id = UserId::new("player-1").unwrap();
//!
//! // Callback IDs are generated locally
//! let callback_id = CallbackId::generate();
//! # let _ = (instance_id, user_id, callback_id);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;

pub use ids::{CallbackId, IdError, InstanceId, UserId};
