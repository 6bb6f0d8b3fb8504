//! Embedded resource templates and helpers to apply them.
//!
//! Templates are compiled into the binary. A template that fails to parse or
//! lacks `apiVersion`/`kind`/`metadata.name` is an `InvalidAsset` error; it
//! can only be fixed by shipping a new build.

use crate::error::ControllerError;
use cluster_client::{ApplyResult, ClusterClientTrait, Owner, api_resource_for, to_dynamic};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::api::DynamicObject;
use serde::de::DeserializeOwned;
use tracing::{error, info};

/// Template of the controllers workload
pub const DEPLOYMENT_ASSET: &str = "controllers/deployment.yaml";

/// Applied into the target namespace
pub const NAMESPACED_ASSETS: &[&str] = &[
    "controllers/service.yaml",
    "controllers/service_account.yaml",
    "frontend/service_account.yaml",
    "controllers/install_log_regexes_configmap.yaml",
];

/// Cluster-scoped roles, applied as they are
pub const CLUSTER_ROLE_ASSETS: &[&str] = &[
    "controllers/cluster_role.yaml",
    "frontend/cluster_role.yaml",
];

/// Bindings whose service account subjects are moved into the target namespace
pub const CLUSTER_ROLE_BINDING_ASSETS: &[&str] = &[
    "controllers/cluster_role_binding.yaml",
    "frontend/cluster_role_binding.yaml",
];

/// Only applied when the cluster serves the OpenShift API groups
pub const OPENSHIFT_ASSETS: &[&str] = &[
    "openshift/admin_cluster_role.yaml",
    "openshift/reader_cluster_role.yaml",
    "openshift/admin_cluster_role_binding.yaml",
    "openshift/reader_cluster_role_binding.yaml",
];

macro_rules! embedded {
    ($($path:literal),* $(,)?) => {
        &[$(($path, include_str!(concat!("../assets/", $path)))),*]
    };
}

static EMBEDDED: &[(&str, &str)] = embedded![
    "controllers/deployment.yaml",
    "controllers/service.yaml",
    "controllers/service_account.yaml",
    "controllers/install_log_regexes_configmap.yaml",
    "controllers/cluster_role.yaml",
    "controllers/cluster_role_binding.yaml",
    "frontend/service_account.yaml",
    "frontend/cluster_role.yaml",
    "frontend/cluster_role_binding.yaml",
    "openshift/admin_cluster_role.yaml",
    "openshift/reader_cluster_role.yaml",
    "openshift/admin_cluster_role_binding.yaml",
    "openshift/reader_cluster_role_binding.yaml",
];

/// Raw contents of an embedded template
pub fn read_asset(path: &str) -> Result<&'static str, ControllerError> {
    EMBEDDED
        .iter()
        .find(|(name, _)| *name == path)
        .map(|(_, contents)| *contents)
        .ok_or_else(|| ControllerError::invalid_asset(path, "no such embedded asset"))
}

/// Parse a template into a typed resource.
pub fn parse_typed<K: DeserializeOwned>(path: &str) -> Result<K, ControllerError> {
    parse_typed_from(path, read_asset(path)?)
}

fn parse_typed_from<K: DeserializeOwned>(path: &str, contents: &str) -> Result<K, ControllerError> {
    serde_yaml::from_str(contents).map_err(|e| ControllerError::invalid_asset(path, e.to_string()))
}

/// Parse a template into a dynamic object with kind and name checked.
pub fn parse_object(path: &str) -> Result<DynamicObject, ControllerError> {
    parse_object_from(path, read_asset(path)?)
}

fn parse_object_from(path: &str, contents: &str) -> Result<DynamicObject, ControllerError> {
    let object: DynamicObject = parse_typed_from(path, contents)?;
    match &object.types {
        Some(types) if !types.kind.is_empty() && !types.api_version.is_empty() => {}
        _ => return Err(ControllerError::invalid_asset(path, "missing apiVersion or kind")),
    }
    if object.metadata.name.as_deref().is_none_or(str::is_empty) {
        return Err(ControllerError::invalid_asset(path, "missing metadata.name"));
    }
    Ok(object)
}

/// Parse the controllers Deployment template. It must carry a pod spec with
/// at least one container.
pub fn read_deployment() -> Result<Deployment, ControllerError> {
    deployment_from(DEPLOYMENT_ASSET, read_asset(DEPLOYMENT_ASSET)?)
}

fn deployment_from(path: &str, contents: &str) -> Result<Deployment, ControllerError> {
    let deployment: Deployment = parse_typed_from(path, contents)?;
    let has_container = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .is_some_and(|pod| !pod.containers.is_empty());
    if !has_container {
        return Err(ControllerError::invalid_asset(path, "deployment has no containers"));
    }
    if deployment.metadata.name.as_deref().is_none_or(str::is_empty) {
        return Err(ControllerError::invalid_asset(path, "missing metadata.name"));
    }
    Ok(deployment)
}

async fn apply_object(
    client: &dyn ClusterClientTrait,
    path: &str,
    object: DynamicObject,
    owner: &Owner,
) -> Result<ApplyResult, ControllerError> {
    let resource = api_resource_for(&object)?;
    match client.apply(&resource, object, owner).await {
        Ok(result) => {
            info!(asset = path, %result, "Applied asset");
            Ok(result)
        }
        Err(e) => {
            error!(asset = path, error = %e, "Failed to apply asset");
            Err(e.into())
        }
    }
}

/// Apply a cluster-scoped template as it is.
pub async fn apply_asset(
    client: &dyn ClusterClientTrait,
    path: &str,
    owner: &Owner,
) -> Result<ApplyResult, ControllerError> {
    let object = parse_object(path)?;
    apply_object(client, path, object, owner).await
}

/// Apply a namespaced template into `namespace`.
pub async fn apply_asset_with_namespace(
    client: &dyn ClusterClientTrait,
    path: &str,
    namespace: &str,
    owner: &Owner,
) -> Result<ApplyResult, ControllerError> {
    let mut object = parse_object(path)?;
    object.metadata.namespace = Some(namespace.to_string());
    apply_object(client, path, object, owner).await
}

/// Point every service account subject of a binding at `namespace`.
pub fn with_subject_namespace(mut binding: ClusterRoleBinding, namespace: &str) -> ClusterRoleBinding {
    for subject in binding.subjects.iter_mut().flatten() {
        if subject.kind == "ServiceAccount" {
            subject.namespace = Some(namespace.to_string());
        }
    }
    binding
}

/// Apply a ClusterRoleBinding template with its subjects moved into `namespace`.
pub async fn apply_cluster_role_binding_with_subject_namespace(
    client: &dyn ClusterClientTrait,
    path: &str,
    namespace: &str,
    owner: &Owner,
) -> Result<ApplyResult, ControllerError> {
    let binding = with_subject_namespace(parse_typed::<ClusterRoleBinding>(path)?, namespace);
    let (_, object) = to_dynamic(&binding)?;
    apply_object(client, path, object, owner).await
}
