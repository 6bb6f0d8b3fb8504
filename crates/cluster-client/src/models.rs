//! Types shared by the client trait, the kube-backed client and the mock

use crate::error::ClusterError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, TypeMeta};
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// Outcome of an apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    /// The object did not exist and was created
    Created,
    /// The object existed and at least one field changed
    Updated,
    /// The object already matched the desired state
    Unchanged,
}

impl fmt::Display for ApplyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplyResult::Created => "created",
            ApplyResult::Updated => "updated",
            ApplyResult::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}

/// Garbage-collection owner attached to every applied object.
///
/// Wraps a controller `OwnerReference`; deleting the owner lets the
/// Kubernetes garbage collector remove everything applied with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Owner(OwnerReference);

impl Owner {
    /// Build an owner from a persisted resource. Returns `None` if the
    /// resource has no name or UID yet.
    pub fn from_resource<K>(resource: &K) -> Option<Self>
    where
        K: Resource<DynamicType = ()>,
    {
        resource.controller_owner_ref(&()).map(Owner)
    }

    /// The owner reference to stamp on dependents
    pub fn reference(&self) -> &OwnerReference {
        &self.0
    }

    /// Set this owner on `object`, replacing any earlier reference with the same UID.
    pub fn attach(&self, object: &mut DynamicObject) {
        let refs = object.metadata.owner_references.get_or_insert_with(Vec::new);
        refs.retain(|r| r.uid != self.0.uid);
        refs.push(self.0.clone());
    }
}

/// Optimistic-concurrency guard for deletes. Both values must match the
/// stored object for the delete to go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePreconditions {
    /// Expected `metadata.uid`
    pub uid: String,
    /// Expected `metadata.resourceVersion`
    pub resource_version: String,
}

/// One page of a paginated list
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Objects on this page
    pub items: Vec<DynamicObject>,
    /// Cursor for the next page; `None` when this was the last page
    pub continue_token: Option<String>,
}

/// Build the `ApiResource` for a parsed object from its `apiVersion`/`kind`.
pub fn api_resource_for(object: &DynamicObject) -> Result<ApiResource, ClusterError> {
    let types = object.types.as_ref().ok_or_else(|| {
        ClusterError::InvalidRequest(format!(
            "object {} has no apiVersion/kind",
            object.metadata.name.as_deref().unwrap_or("<unnamed>")
        ))
    })?;
    let (group, version) = match types.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", types.api_version.as_str()),
    };
    Ok(ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, &types.kind)))
}

/// Convert a typed object into the dynamic form the client works with.
pub fn to_dynamic<K>(object: &K) -> Result<(ApiResource, DynamicObject), ClusterError>
where
    K: Resource<DynamicType = ()> + Serialize,
{
    let resource = ApiResource::erase::<K>(&());
    let mut dynamic: DynamicObject = serde_json::from_value(serde_json::to_value(object)?)?;
    if dynamic.types.is_none() {
        dynamic.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
    }
    Ok((resource, dynamic))
}

/// Convert a dynamic object back into a typed one.
pub fn from_dynamic<K>(object: DynamicObject) -> Result<K, ClusterError>
where
    K: DeserializeOwned,
{
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// `namespace/name` (or just `name` for cluster-scoped objects) for log lines
pub fn display_key(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{}/{}", ns, name),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_api_resource_for_core_and_grouped_kinds() {
        let mut object = DynamicObject {
            types: Some(TypeMeta {
                api_version: "v1".to_string(),
                kind: "ServiceAccount".to_string(),
            }),
            metadata: ObjectMeta::default(),
            data: serde_json::Value::Null,
        };
        let resource = api_resource_for(&object).unwrap();
        assert_eq!(resource.group, "");
        assert_eq!(resource.plural, "serviceaccounts");

        object.types = Some(TypeMeta {
            api_version: "rbac.authorization.k8s.io/v1".to_string(),
            kind: "ClusterRoleBinding".to_string(),
        });
        let resource = api_resource_for(&object).unwrap();
        assert_eq!(resource.group, "rbac.authorization.k8s.io");
        assert_eq!(resource.version, "v1");
        assert_eq!(resource.plural, "clusterrolebindings");
    }

    #[test]
    fn test_api_resource_for_requires_types() {
        let object = DynamicObject {
            types: None,
            metadata: ObjectMeta::default(),
            data: serde_json::Value::Null,
        };
        assert!(matches!(api_resource_for(&object), Err(ClusterError::InvalidRequest(_))));
    }

    #[test]
    fn test_typed_conversion_keeps_data() {
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some("settings".to_string()),
                namespace: Some("dcops".to_string()),
                ..Default::default()
            },
            data: Some([("A".to_string(), "1".to_string())].into_iter().collect()),
            ..Default::default()
        };
        let (resource, dynamic) = to_dynamic(&config_map).unwrap();
        assert_eq!(resource.kind, "ConfigMap");
        assert_eq!(dynamic.types.as_ref().map(|t| t.kind.as_str()), Some("ConfigMap"));

        let back: ConfigMap = from_dynamic(dynamic).unwrap();
        assert_eq!(back, config_map);
    }

    #[test]
    fn test_owner_attach_replaces_same_uid() {
        let owner = Owner(OwnerReference {
            api_version: "dcops.microscaler.io/v1alpha1".to_string(),
            kind: "DCopsConfig".to_string(),
            name: "dcops".to_string(),
            uid: "uid-1".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        });
        let mut object = DynamicObject {
            types: None,
            metadata: ObjectMeta::default(),
            data: serde_json::Value::Null,
        };
        owner.attach(&mut object);
        owner.attach(&mut object);
        assert_eq!(object.metadata.owner_references.as_ref().map(Vec::len), Some(1));
    }
}
