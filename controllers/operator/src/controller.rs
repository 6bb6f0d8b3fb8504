//! Main controller implementation.
//!
//! Wires the cluster client, the reconciler and the probe server together and
//! starts the long-running tasks:
//! - the `DCopsConfig` watcher
//! - the probe server
//! - a one-off background decommissioning of the legacy `NetBoxSyncInstance` kind

use crate::error::ControllerError;
use crate::probes::{self, Readiness};
use crate::reconciler::Reconciler;
use crate::settings::OperatorSettings;
use crate::watcher::Watcher;
use cluster_client::KubeClusterClient;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for the DCops operator.
pub struct Controller {
    config_watcher: JoinHandle<Result<(), ControllerError>>,
    probe_server: JoinHandle<Result<(), ControllerError>>,
    decommissioner: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(settings: OperatorSettings) -> Result<Self, ControllerError> {
        info!("Initializing DCops operator");

        let kube_client = Client::try_default().await?;
        let cluster_client = KubeClusterClient::new(kube_client.clone());
        let probe_addr = settings.probe_addr;
        let reconciler = Arc::new(Reconciler::new(Box::new(cluster_client), settings));
        let readiness = Readiness::default();

        let probe_server = tokio::spawn(probes::serve(probe_addr, readiness.clone()));

        let decommissioner = {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move {
                reconciler.decommission_until_done().await;
            })
        };

        let watcher = Watcher::new(kube_client, reconciler, readiness);
        let config_watcher = tokio::spawn(async move { watcher.watch_dcops_configs().await });

        Ok(Self {
            config_watcher,
            probe_server,
            decommissioner,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("DCops operator running");

        // Wait for either long-running task to exit (they should run forever)
        let result = tokio::select! {
            result = &mut self.config_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("DCopsConfig watcher panicked: {}", e)))
                    .and_then(|inner| inner.map_err(|e| ControllerError::Watch(format!("DCopsConfig watcher error: {}", e))))
            }
            result = &mut self.probe_server => {
                result.map_err(|e| ControllerError::Watch(format!("Probe server panicked: {}", e)))
                    .and_then(|inner| inner)
            }
        };

        self.decommissioner.abort();
        result
    }
}
