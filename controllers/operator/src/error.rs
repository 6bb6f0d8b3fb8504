//! Controller-specific error types.
//!
//! Errors from the cluster client are wrapped as they are; everything the
//! operator itself can get wrong (bad embedded assets, bad settings, a
//! decommissioning pass that could not finish) has its own variant.

use cluster_client::ClusterError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the DCops operator.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Cluster API error
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Kubernetes client error (watchers, status patches)
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// An embedded asset could not be parsed or is missing required fields
    #[error("Invalid asset {asset}: {reason}")]
    InvalidAsset {
        /// Asset path
        asset: String,
        /// What is wrong with it
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// One or more legacy instances could not be removed during a page
    #[error("{} legacy instance(s) could not be removed: {}", .0.len(), join_errors(.0))]
    Decommission(Vec<InstanceError>),

    /// Deletions kept finding instances after the maximum number of passes
    #[error("legacy instances still present after {passes} passes")]
    DecommissionNotConverged {
        /// Passes that were made
        passes: usize,
    },

    /// Reconciliation failed
    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Probe server failed
    #[error("Probe server error: {0}")]
    Probe(#[from] std::io::Error),
}

/// Failure to remove a single legacy instance
#[derive(Debug, Error)]
#[error("failed to {action} {key}: {source}")]
pub struct InstanceError {
    /// `namespace/name` of the instance
    pub key: String,
    /// What was being attempted ("remove finalizers from", "delete")
    pub action: &'static str,
    /// Underlying API error
    #[source]
    pub source: ClusterError,
}

fn join_errors(errors: &[InstanceError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ControllerError {
    /// Build an `InvalidAsset` error
    pub fn invalid_asset(asset: &str, reason: impl Into<String>) -> Self {
        ControllerError::InvalidAsset {
            asset: asset.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decommission_error_lists_every_instance() {
        let error = ControllerError::Decommission(vec![
            InstanceError {
                key: "a/one".to_string(),
                action: "delete",
                source: ClusterError::Conflict("stale".to_string()),
            },
            InstanceError {
                key: "b/two".to_string(),
                action: "remove finalizers from",
                source: ClusterError::Api("boom".to_string()),
            },
        ]);
        let message = error.to_string();
        assert!(message.starts_with("2 legacy instance(s)"));
        assert!(message.contains("failed to delete a/one: Conflict: stale"));
        assert!(message.contains("failed to remove finalizers from b/two"));
    }
}
