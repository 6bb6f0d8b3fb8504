//! DCops Operator
//!
//! Deploys the DCops controllers and keeps them configured:
//! - renders the controllers Deployment from the `DCopsConfig` singleton
//! - publishes per-controller tuning as a ConfigMap and rolls the pods when it changes
//! - aggregates additional trusted CAs into one mounted secret
//! - applies the RBAC the controllers need, plus OpenShift roles when available
//! - removes the deprecated `NetBoxSyncInstance` kind left behind by older releases

mod assembler;
mod assets;
mod backoff;
mod controller;
mod controllers_config;
mod error;
mod probes;
mod reconciler;
mod settings;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::controller::Controller;
use crate::error::ControllerError;
use crate::settings::OperatorSettings;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube uses rustls; pick the ring provider explicitly.
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider()) {
        debug!(?e, "CryptoProvider already installed; proceeding");
    }

    info!("Starting DCops operator");

    let settings = OperatorSettings::from_env()?;
    info!("Configuration:");
    info!("  Image override: {}", settings.image.as_deref().unwrap_or("none"));
    info!("  Pull policy override: {}", settings.image_pull_policy.as_deref().unwrap_or("none"));
    info!("  Managed domains ConfigMap: {}", settings.managed_domains_configmap);
    info!("  Decommission page size: {}", settings.decommission_page_size);
    info!("  Probe address: {}", settings.probe_addr);

    let controller = Controller::new(settings).await?;
    controller.run().await?;

    Ok(())
}
