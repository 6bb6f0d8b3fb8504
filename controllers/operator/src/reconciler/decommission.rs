//! Removal of the deprecated `NetBoxSyncInstance` kind.
//!
//! Instances are listed a page at a time. Each one has its finalizers cleared
//! and is then deleted with a UID/resourceVersion precondition, so an instance
//! that a still-running legacy controller touched in the meantime fails with a
//! conflict instead of being removed from under it. Full passes repeat until
//! one deletes nothing; only then is the CRD itself deleted.

use super::Reconciler;
use crate::backoff::FibonacciBackoff;
use crate::error::{ControllerError, InstanceError};
use cluster_client::{ClusterError, DeletePreconditions, display_key};
use crds::{NETBOX_SYNC_INSTANCE_CRD_NAME, NetBoxSyncInstance};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{ApiResource, DynamicObject};
use tracing::{debug, info, warn};

/// Shortest delay between decommissioning attempts, in seconds
const RETRY_MIN_SECONDS: u64 = 1;

/// Longest delay between decommissioning attempts, in seconds
const RETRY_MAX_SECONDS: u64 = 300;

/// Result of a successful decommissioning run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecommissionOutcome {
    /// The CRD was already gone; nothing was touched
    AlreadyDone,
    /// All instances and the CRD were removed
    Completed {
        /// Instances deleted across all passes
        instances_deleted: usize,
        /// Full enumeration passes, including the final empty one
        passes: usize,
    },
}

impl Reconciler {
    /// Run [`Self::decommission_legacy_kind`] until it succeeds, backing off
    /// between attempts.
    pub async fn decommission_until_done(&self) -> DecommissionOutcome {
        let mut backoff = FibonacciBackoff::new(RETRY_MIN_SECONDS, RETRY_MAX_SECONDS);
        loop {
            match self.decommission_legacy_kind().await {
                Ok(outcome) => {
                    info!(?outcome, "Legacy NetBoxSyncInstance kind decommissioned");
                    return outcome;
                }
                Err(e) => {
                    let delay = backoff.next_backoff();
                    warn!(error = %e, "Decommissioning NetBoxSyncInstances failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Delete every `NetBoxSyncInstance` and then its CRD.
    ///
    /// Safe to call repeatedly. Per-instance failures on a page abort the run
    /// with [`ControllerError::Decommission`]; deletions made before that stay
    /// done.
    pub async fn decommission_legacy_kind(&self) -> Result<DecommissionOutcome, ControllerError> {
        let crds = ApiResource::erase::<CustomResourceDefinition>(&());
        match self.client.get(&crds, None, NETBOX_SYNC_INSTANCE_CRD_NAME).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                debug!("{} not found, nothing to decommission", NETBOX_SYNC_INSTANCE_CRD_NAME);
                return Ok(DecommissionOutcome::AlreadyDone);
            }
            Err(e) => return Err(e.into()),
        }

        let instances = ApiResource::erase::<NetBoxSyncInstance>(&());
        let max_passes = self.settings.decommission_max_passes;
        let mut instances_deleted = 0;
        let mut passes = 0;
        loop {
            if passes >= max_passes {
                warn!(passes, "NetBoxSyncInstances keep appearing, giving up for now");
                return Err(ControllerError::DecommissionNotConverged { passes });
            }
            passes += 1;
            let deleted = self.delete_legacy_instances(&instances).await?;
            instances_deleted += deleted;
            if deleted == 0 {
                break;
            }
            debug!(pass = passes, number_deleted = deleted, "Pass deleted instances, scanning again");
        }

        match self.client.delete(&crds, None, NETBOX_SYNC_INSTANCE_CRD_NAME, None).await {
            Ok(()) => info!("Deleted CRD {}", NETBOX_SYNC_INSTANCE_CRD_NAME),
            Err(e) if e.is_not_found() => debug!("CRD {} already deleted", NETBOX_SYNC_INSTANCE_CRD_NAME),
            Err(e) => return Err(e.into()),
        }
        Ok(DecommissionOutcome::Completed { instances_deleted, passes })
    }

    /// One full enumeration. Returns how many instances were deleted.
    async fn delete_legacy_instances(&self, instances: &ApiResource) -> Result<usize, ControllerError> {
        let page_size = self.settings.decommission_page_size;
        let mut deleted = 0;
        let mut continue_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list(instances, None, continue_token.as_deref(), page_size)
                .await?;
            info!(batch_size = page.items.len(), "Deleting batch of NetBoxSyncInstances");

            let mut errors = Vec::new();
            for instance in page.items {
                match self.delete_legacy_instance(instances, instance).await {
                    Ok(true) => deleted += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(error = %e, "Could not remove NetBoxSyncInstance");
                        errors.push(e);
                    }
                }
            }
            if !errors.is_empty() {
                return Err(ControllerError::Decommission(errors));
            }
            info!(number_deleted = deleted, "Deleted NetBoxSyncInstances");

            match page.continue_token {
                Some(token) => continue_token = Some(token),
                None => return Ok(deleted),
            }
        }
    }

    /// Clear finalizers, then delete guarded by UID and resource version.
    /// `Ok(false)` means the instance was already gone.
    async fn delete_legacy_instance(
        &self,
        instances: &ApiResource,
        mut instance: DynamicObject,
    ) -> Result<bool, InstanceError> {
        let namespace = instance.metadata.namespace.clone();
        let name = instance.metadata.name.clone().unwrap_or_default();
        let key = display_key(namespace.as_deref(), &name);

        if instance.metadata.finalizers.as_ref().is_some_and(|f| !f.is_empty()) {
            debug!(instance = %key, "Removing finalizers");
            instance.metadata.finalizers = None;
            instance = self
                .client
                .update(instances, &instance)
                .await
                .map_err(|source| InstanceError {
                    key: key.clone(),
                    action: "remove finalizers from",
                    source,
                })?;
        }

        let (Some(uid), Some(resource_version)) = (instance.metadata.uid, instance.metadata.resource_version) else {
            return Err(InstanceError {
                key,
                action: "delete",
                source: ClusterError::InvalidRequest("instance has no uid or resourceVersion".to_string()),
            });
        };
        let preconditions = DeletePreconditions { uid, resource_version };
        match self
            .client
            .delete(instances, namespace.as_deref(), &name, Some(&preconditions))
            .await
        {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => {
                debug!(instance = %key, "Already deleted");
                Ok(false)
            }
            Err(source) => Err(InstanceError {
                key,
                action: "delete",
                source,
            }),
        }
    }
}
