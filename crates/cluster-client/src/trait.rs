//! ClusterClient trait for mocking
//!
//! This trait abstracts the Kubernetes API surface the operator needs so that
//! reconcilers can be unit tested against an in-memory implementation.

use crate::error::ClusterError;
use crate::models::{ApplyResult, DeletePreconditions, ListPage, Owner};
use kube::api::{ApiResource, DynamicObject};

/// Trait for cluster operations
///
/// Every call is a single round trip. Callers cancel by dropping the future.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    /// Create or update `object` and attach `owner` as its garbage-collection owner.
    /// The namespace is taken from the object itself. Idempotent.
    async fn apply(
        &self,
        resource: &ApiResource,
        object: DynamicObject,
        owner: &Owner,
    ) -> Result<ApplyResult, ClusterError>;

    /// Read one object
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, ClusterError>;

    /// Replace an object. Fails with `Conflict` if `metadata.resourceVersion`
    /// no longer matches the stored object.
    async fn update(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError>;

    /// Delete one object, optionally guarded by UID and resource version
    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        preconditions: Option<&DeletePreconditions>,
    ) -> Result<(), ClusterError>;

    /// List at most `limit` objects, starting after `continue_token`.
    /// `namespace = None` lists across all namespaces.
    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        continue_token: Option<&str>,
        limit: u32,
    ) -> Result<ListPage, ClusterError>;

    /// Names of the resources served under `group_version` (e.g. "apps.openshift.io/v1").
    /// Fails with `NotFound` if the group/version is not served at all.
    async fn server_resources_for_group_version(
        &self,
        group_version: &str,
    ) -> Result<Vec<String>, ClusterError>;
}
