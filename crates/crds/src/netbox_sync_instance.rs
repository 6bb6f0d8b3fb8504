//! NetBoxSyncInstance CRD (deprecated)
//!
//! Per-target sync bookkeeping written by the pre-0.1 sync controller. The
//! kind is no longer served by any controller; the operator deletes the
//! remaining instances and then the CRD itself.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the CRD that registers [`NetBoxSyncInstance`].
pub const NETBOX_SYNC_INSTANCE_CRD_NAME: &str = "netboxsyncinstances.dcops.microscaler.io";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "NetBoxSyncInstance",
    namespaced,
    status = "NetBoxSyncInstanceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct NetBoxSyncInstanceSpec {
    /// Name of the sync set this instance was created for
    #[serde(default)]
    pub sync_set_name: String,

    /// Kind of the object being synced (e.g., "NetBoxPrefix")
    #[serde(default)]
    pub target_kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetBoxSyncInstanceStatus {
    /// Whether the last sync succeeded
    #[serde(default)]
    pub applied: bool,
}
