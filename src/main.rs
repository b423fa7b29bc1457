//! Windlass Operator Entry Point
//!
//! Starts the Application controller against the local cluster.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use windlass::cluster::LocalClusterConnector;
use windlass::manifest::HttpManifestService;
use windlass::{controller, Error};

/// Destination server URL conventionally meaning "the cluster I run in".
const IN_CLUSTER_SERVER: &str = "https://kubernetes.default.svc";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting Windlass Operator v{}", env!("CARGO_PKG_VERSION"));

    let manifest_service_url = std::env::var("WINDLASS_MANIFEST_SERVICE_URL")
        .map_err(|_| Error::ConfigError("WINDLASS_MANIFEST_SERVICE_URL is not set".to_string()))?;
    let refresh_interval = std::env::var("WINDLASS_REFRESH_INTERVAL_SECONDS")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(180));

    // Initialize Kubernetes client
    let client = kube::Client::try_default().await.map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let state = Arc::new(controller::ControllerState::new(
        client.clone(),
        Arc::new(HttpManifestService::new(manifest_service_url)),
        Arc::new(LocalClusterConnector::new(client, IN_CLUSTER_SERVER)),
        refresh_interval,
    ));

    // Run the main controller loop
    controller::run_controller(state).await?;

    Ok(())
}
