//! DCopsConfig CRD
//!
//! Cluster-scoped singleton that describes how the operator deploys the
//! DCops controllers. Only the instance named [`DCOPS_CONFIG_NAME`] is
//! reconciled.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use crate::references::SecretReference;

/// Name of the only `DCopsConfig` the operator acts on.
pub const DCOPS_CONFIG_NAME: &str = "dcops";

/// Namespace the controllers are deployed into when `targetNamespace` is unset.
pub const DEFAULT_TARGET_NAMESPACE: &str = "dcops";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "DCopsConfig",
    shortname = "dcc",
    status = "DCopsConfigStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct DCopsConfigSpec {
    /// Namespace the controllers workload and its supporting resources live in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,

    /// Log level passed to the controllers (e.g., "debug", "info")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Controllers that should not be started
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_controllers: Vec<String>,

    /// How often controllers re-apply their resources (Go-style duration, e.g. "2h")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resync_interval: Option<String>,

    /// Scale the controllers to zero without removing anything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_mode: Option<bool>,

    /// Require an explicit annotation before managed resources may be deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_protection: Option<DeleteProtection>,

    /// Stop the controllers from deprovisioning anything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprovisions_disabled: Option<bool>,

    /// Secrets (in the target namespace) whose `ca.crt` is trusted in addition to the system roots
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_certificate_authorities_secret_ref: Vec<SecretReference>,

    /// Pull secret merged into every workload the controllers create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_pull_secret_ref: Option<SecretReference>,

    /// Backup configuration
    #[serde(default)]
    pub backup: BackupConfig,

    /// Behaviour for failed provisions
    #[serde(default)]
    pub failed_provision_config: FailedProvisionConfig,

    /// Per-controller tuning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controllers_config: Option<ControllersConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeleteProtection {
    /// Deletes must be confirmed by annotation
    Enabled,

    /// Deletes proceed normally
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    /// Velero integration
    #[serde(default)]
    pub velero: VeleroBackupConfig,

    /// Minimum number of seconds between two backups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_backup_period_seconds: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VeleroBackupConfig {
    /// Whether Velero backups are taken
    #[serde(default)]
    pub enabled: bool,

    /// Namespace Velero runs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailedProvisionConfig {
    /// Skip gathering logs from machines that failed to provision
    #[serde(default)]
    pub skip_gather_logs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControllersConfig {
    /// Applied to every controller that has no record of its own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ControllerConfig>,

    /// Records for individual controllers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controllers: Vec<SpecificControllerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SpecificControllerConfig {
    /// Controller name (e.g., "ip-claim")
    pub name: String,

    /// Tuning for this controller
    pub config: ControllerConfig,
}

/// Tuning knobs for a single controller. Unset fields are not emitted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Reconciles that may run in parallel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent_reconciles: Option<i32>,

    /// Queries per second against the API server
    #[serde(rename = "clientQPS", default, skip_serializing_if = "Option::is_none")]
    pub client_qps: Option<i32>,

    /// Burst allowance against the API server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_burst: Option<i32>,

    /// Work queue rate limit
    #[serde(rename = "queueQPS", default, skip_serializing_if = "Option::is_none")]
    pub queue_qps: Option<i32>,

    /// Work queue burst
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_burst: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DCopsConfigStatus {
    /// Generation of the spec that was last reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Whether the last pass applied every resource
    #[serde(default)]
    pub config_applied: bool,

    /// Error from the last failed pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DCopsConfig {
    /// Namespace the controllers are deployed into.
    pub fn target_namespace(&self) -> &str {
        self.spec
            .target_namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(DEFAULT_TARGET_NAMESPACE)
    }
}
