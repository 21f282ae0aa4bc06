//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use fleet_control::{FleetManager, PlayerDirectory};

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
pub struct GatewayState<F>
where
    F: FleetManager,
{
    /// The lifecycle engine.
    pub fleet: Arc<F>,
    /// Last known player addresses, used as placement hints.
    pub directory: Arc<PlayerDirectory>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<F> GatewayState<F>
where
    F: FleetManager,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(fleet: Arc<F>, directory: Arc<PlayerDirectory>, config: GatewayConfig) -> Self {
        Self {
            fleet,
            directory,
            config,
        }
    }
}

impl<F> Clone for GatewayState<F>
where
    F: FleetManager,
{
    fn clone(&self) -> Self {
        Self {
            fleet: Arc::clone(&self.fleet),
            directory: Arc::clone(&self.directory),
            config: self.config.clone(),
        }
    }
}
