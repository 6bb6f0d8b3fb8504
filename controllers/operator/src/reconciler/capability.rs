//! Platform capability detection.

use super::Reconciler;
use crate::error::ControllerError;
use cluster_client::{ClusterClientTrait, ClusterError};
use tracing::debug;

/// Group/version whose presence marks an OpenShift cluster
pub const OPENSHIFT_MARKER_GROUP_VERSION: &str = "apps.openshift.io/v1";

/// Whether the API server serves any resource under `group_version`.
///
/// A group/version that is not served at all is a plain `false`. Any other
/// discovery failure is returned as is.
pub async fn serves_group_version(
    client: &dyn ClusterClientTrait,
    group_version: &str,
) -> Result<bool, ClusterError> {
    match client.server_resources_for_group_version(group_version).await {
        Ok(resources) => Ok(!resources.is_empty()),
        Err(e) if e.is_not_found() => {
            debug!("{} is not served", group_version);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

impl Reconciler {
    /// Whether the operator runs on OpenShift
    pub async fn running_on_openshift(&self) -> Result<bool, ControllerError> {
        Ok(serves_group_version(self.cluster(), OPENSHIFT_MARKER_GROUP_VERSION).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::MockClusterClient;

    #[tokio::test]
    async fn test_served_group_version() {
        let client = MockClusterClient::new();
        client.add_group_version(OPENSHIFT_MARKER_GROUP_VERSION, &["deploymentconfigs"]);
        assert!(serves_group_version(&client, OPENSHIFT_MARKER_GROUP_VERSION).await.unwrap());
    }

    #[tokio::test]
    async fn test_group_version_without_resources_is_absent() {
        let client = MockClusterClient::new();
        client.add_group_version(OPENSHIFT_MARKER_GROUP_VERSION, &[]);
        assert!(!serves_group_version(&client, OPENSHIFT_MARKER_GROUP_VERSION).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_group_version_is_absent() {
        let client = MockClusterClient::new();
        assert!(!serves_group_version(&client, OPENSHIFT_MARKER_GROUP_VERSION).await.unwrap());
    }

    #[tokio::test]
    async fn test_discovery_failure_is_an_error() {
        let client = MockClusterClient::new();
        client.fail_discovery("connection reset");
        let result = serves_group_version(&client, OPENSHIFT_MARKER_GROUP_VERSION).await;
        assert!(matches!(result, Err(ClusterError::Api(_))));
    }
}
