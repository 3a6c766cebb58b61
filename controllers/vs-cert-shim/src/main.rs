//! VirtualServer Certificate Shim
//!
//! Keeps cert-manager `Certificate` resources in sync with the TLS settings
//! of NGINX `VirtualServer` resources.
//!
//! For every VirtualServer with `spec.tls.secret` set, the controller owns
//! one Certificate of the same name, configured from the VirtualServer's
//! `tls.cert-manager` block, and removes Certificates it owns that are no
//! longer referenced.

mod backoff;
mod config;
mod controller;
mod correlator;
mod error;
mod events;
mod key;
mod metrics;
mod queue;
mod reconciler;
mod server;
mod test_utils;
mod watcher;

use crate::config::Config;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's rustls-tls feature needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        info!("rustls crypto provider already installed");
    }

    info!("Starting VirtualServer certificate shim");

    let config = Config::from_env()?;

    info!("Configuration:");
    info!(
        "  Default issuer: {}.{}/{}",
        config.issuer_defaults.kind, config.issuer_defaults.group, config.issuer_defaults.name
    );
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Workers: {}", config.workers);
    info!("  Ownership policy: {:?}", config.ownership_policy);
    info!("  Metrics port: {}", config.metrics_port);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
