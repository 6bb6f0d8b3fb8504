//! Reconciliation logic for the operator.
//!
//! - `deployment`: the self-deployment pipeline run for every `DCopsConfig` change
//! - `additional_ca`: aggregation of extra trusted CAs into one secret
//! - `capability`: detection of the OpenShift API groups
//! - `decommission`: removal of the legacy `NetBoxSyncInstance` kind

pub mod additional_ca;
pub mod capability;
pub mod decommission;
pub mod deployment;

#[cfg(test)]
mod deployment_test;

use crate::settings::OperatorSettings;
use cluster_client::ClusterClientTrait;

/// Reconciles the operator's own workload and cleans up after older releases.
pub struct Reconciler {
    pub(crate) client: Box<dyn ClusterClientTrait + Send + Sync>,
    pub(crate) settings: OperatorSettings,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler
    pub fn new(client: Box<dyn ClusterClientTrait + Send + Sync>, settings: OperatorSettings) -> Self {
        Self { client, settings }
    }

    /// The cluster client as a plain trait object
    pub(crate) fn cluster(&self) -> &dyn ClusterClientTrait {
        self.client.as_ref()
    }
}
