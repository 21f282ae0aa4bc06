//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers for the gateway API.

pub mod events;
pub mod health;
pub mod instances;
pub mod players;
