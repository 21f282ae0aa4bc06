//! Fleet Gateway - HTTP API and webhook receiver
//!
//! This is the main entry point for the fleet manager service. It embeds
//! the lifecycle engine, opens the instance store and starts the
//! reconciliation sweep next to the HTTP server.
//!
//! # Configuration
//!
//! The provisioning fabric is configured through `FLEET_PROVIDER_URL`,
//! `FLEET_PROVIDER_TOKEN`, `FLEET_APPLICATION`, `FLEET_APPLICATION_VERSION`
//! and `FLEET_PUBLIC_URL`; startup fails if any of them is missing.
//! `DATA_DIR` selects the store location.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleet_control::{run_sweeper, ControlConfig, FleetService, PlayerDirectory};
use fleet_gateway::{create_router, GatewayConfig, GatewayState};
use fleet_provision::{HttpProvisioner, ProvisionConfig};
use fleet_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fleet=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Fleet Gateway");

    // Load configuration from environment
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/fleet".into());
    let gateway_config = GatewayConfig::from_env();
    let control_config = ControlConfig::from_env();
    let provision_config = ProvisionConfig::from_env()?;

    tracing::info!(
        listen_addr = %gateway_config.listen_addr,
        data_dir = %data_dir,
        provider_url = %provision_config.base_url,
        application = %provision_config.application,
        version = %provision_config.version,
        port_name = %control_config.port_name,
        "Gateway configuration loaded"
    );

    // Initialize RocksDB store
    tracing::info!(path = %data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&data_dir)?);

    let provisioner = Arc::new(HttpProvisioner::new(provision_config)?);
    let directory = Arc::new(PlayerDirectory::new());
    let fleet = Arc::new(FleetService::new(
        store,
        provisioner,
        directory.clone(),
        control_config.clone(),
    ));

    if control_config.sweep_enabled {
        tracing::info!(
            interval_secs = control_config.sweep_interval.as_secs(),
            "Reconciliation sweep enabled"
        );
        tokio::spawn(run_sweeper(fleet.clone(), control_config.sweep_interval));
    } else {
        tracing::warn!("Reconciliation sweep disabled");
    }

    let listen_addr = gateway_config.listen_addr.clone();
    let state = GatewayState::new(fleet, directory, gateway_config);
    let app = create_router(state);

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
