//! Kubernetes-backed implementation of [`ClusterClientTrait`]

use crate::error::ClusterError;
use crate::models::{display_key, ApplyResult, DeletePreconditions, ListPage, Owner};
use crate::cluster_trait::ClusterClientTrait;
use crate::FIELD_MANAGER;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
    Preconditions, TypeMeta,
};
use kube::Client;
use tracing::debug;

/// Cluster client talking to a real API server.
///
/// Applies use server-side apply with a fixed field manager; whether an apply
/// created, changed or left the object alone is derived from the resource
/// version before and after.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    field_manager: String,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// Wrap an existing client using the default field manager
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: FIELD_MANAGER.to_string(),
        }
    }

    /// Build a client from the in-cluster or kubeconfig environment
    pub async fn try_default() -> Result<Self, ClusterError> {
        Ok(Self::new(Client::try_default().await?))
    }

    /// The underlying kube client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }
}

fn object_name(object: &DynamicObject) -> Result<String, ClusterError> {
    object
        .metadata
        .name
        .clone()
        .ok_or_else(|| ClusterError::InvalidRequest("object has no metadata.name".to_string()))
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn apply(
        &self,
        resource: &ApiResource,
        mut object: DynamicObject,
        owner: &Owner,
    ) -> Result<ApplyResult, ClusterError> {
        let name = object_name(&object)?;
        let namespace = object.metadata.namespace.clone();
        if object.types.is_none() {
            object.types = Some(TypeMeta {
                api_version: resource.api_version.clone(),
                kind: resource.kind.clone(),
            });
        }
        owner.attach(&mut object);
        // Server-side apply rejects these on input.
        object.metadata.resource_version = None;
        object.metadata.managed_fields = None;

        let api = self.api(resource, namespace.as_deref());
        let before = api
            .get_opt(&name)
            .await?
            .and_then(|existing| existing.metadata.resource_version);

        let params = PatchParams::apply(&self.field_manager).force();
        let applied = api.patch(&name, &params, &Patch::Apply(&object)).await?;

        let result = match before {
            None => ApplyResult::Created,
            Some(rv) if applied.metadata.resource_version.as_deref() == Some(rv.as_str()) => {
                ApplyResult::Unchanged
            }
            Some(_) => ApplyResult::Updated,
        };
        debug!(
            "Applied {} {}: {}",
            resource.kind,
            display_key(namespace.as_deref(), &name),
            result
        );
        Ok(result)
    }

    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, ClusterError> {
        Ok(self.api(resource, namespace).get(name).await?)
    }

    async fn update(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let name = object_name(object)?;
        let api = self.api(resource, object.metadata.namespace.as_deref());
        Ok(api.replace(&name, &PostParams::default(), object).await?)
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        preconditions: Option<&DeletePreconditions>,
    ) -> Result<(), ClusterError> {
        let params = DeleteParams {
            preconditions: preconditions.map(|p| Preconditions {
                uid: Some(p.uid.clone()),
                resource_version: Some(p.resource_version.clone()),
            }),
            ..DeleteParams::default()
        };
        self.api(resource, namespace).delete(name, &params).await?;
        Ok(())
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        continue_token: Option<&str>,
        limit: u32,
    ) -> Result<ListPage, ClusterError> {
        let mut params = ListParams::default().limit(limit);
        if let Some(token) = continue_token {
            params = params.continue_token(token);
        }
        let list = self.api(resource, namespace).list(&params).await?;
        Ok(ListPage {
            items: list.items,
            continue_token: list.metadata.continue_.filter(|token| !token.is_empty()),
        })
    }

    async fn server_resources_for_group_version(
        &self,
        group_version: &str,
    ) -> Result<Vec<String>, ClusterError> {
        let list = if group_version.contains('/') {
            self.client.list_api_group_resources(group_version).await?
        } else {
            self.client.list_core_api_resources(group_version).await?
        };
        Ok(list.resources.into_iter().map(|r| r.name).collect())
    }
}
