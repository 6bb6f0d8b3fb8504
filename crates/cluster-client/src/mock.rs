//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of [`ClusterClientTrait`]
//! that behaves like the API server for the calls the operator makes:
//!
//! - objects get a UID and a monotonically increasing resource version
//! - `update` and guarded `delete` fail with `Conflict` on stale versions
//! - deleting an object that still has finalizers only marks it terminating;
//!   clearing the finalizers afterwards removes it
//! - `list` pages in (namespace, name) order with key-based continue tokens,
//!   so deleting already-listed objects never skips unlisted ones
//!
//! Faults can be injected to exercise error paths: failing applies and
//! updates, an object being "resurrected" right before it is deleted, objects
//! appearing after a given list call, and discovery failures.

use crate::error::ClusterError;
use crate::models::{ApplyResult, DeletePreconditions, ListPage, Owner, display_key};
use crate::cluster_trait::ClusterClientTrait;
use kube::api::{ApiResource, DynamicObject, TypeMeta};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// (group/plural, namespace or "", name)
type ObjectKey = (String, String, String);

fn resource_key(resource: &ApiResource) -> String {
    format!("{}/{}", resource.group, resource.plural)
}

fn object_key(resource: &ApiResource, namespace: Option<&str>, name: &str) -> ObjectKey {
    (
        resource_key(resource),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

/// Strip server-populated metadata so two objects can be compared by content
fn comparable(object: &DynamicObject) -> Result<serde_json::Value, ClusterError> {
    let mut copy = object.clone();
    copy.metadata.uid = None;
    copy.metadata.resource_version = None;
    copy.metadata.managed_fields = None;
    copy.metadata.generation = None;
    copy.metadata.creation_timestamp = None;
    Ok(serde_json::to_value(copy)?)
}

#[derive(Default)]
struct MockState {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    terminating: HashSet<ObjectKey>,
    next_resource_version: u64,
    group_versions: HashMap<String, Vec<String>>,
    discovery_error: Option<String>,
    failing_applies: HashSet<(String, String)>,
    failing_updates: HashSet<(Option<String>, String)>,
    failing_deletes: HashSet<(Option<String>, String)>,
    resurrections: HashSet<(Option<String>, String)>,
    injections: Vec<(usize, ApiResource, DynamicObject)>,
    list_calls: usize,
    apply_log: Vec<(String, String, ApplyResult)>,
    delete_log: Vec<(String, String)>,
}

impl MockState {
    fn bump_resource_version(&mut self) -> String {
        self.next_resource_version += 1;
        self.next_resource_version.to_string()
    }

    fn store(&mut self, key: ObjectKey, mut object: DynamicObject) -> DynamicObject {
        if object.metadata.uid.is_none() {
            object.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        object.metadata.resource_version = Some(self.bump_resource_version());
        self.objects.insert(key, object.clone());
        object
    }
}

/// Mock ClusterClient for testing
///
/// Clones share the same in-memory store, so a test can keep one handle for
/// assertions and hand another to the code under test.
#[derive(Clone, Default)]
pub struct MockClusterClient {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterClient").finish_non_exhaustive()
    }
}

impl MockClusterClient {
    /// Create an empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an object as-is (for test setup). Returns the stored copy with UID
    /// and resource version filled in.
    pub fn insert(&self, resource: &ApiResource, mut object: DynamicObject) -> DynamicObject {
        if object.types.is_none() {
            object.types = Some(TypeMeta {
                api_version: resource.api_version.clone(),
                kind: resource.kind.clone(),
            });
        }
        let name = object.metadata.name.clone().unwrap_or_default();
        let key = object_key(resource, object.metadata.namespace.as_deref(), &name);
        self.state().store(key, object)
    }

    /// Look up a stored object
    pub fn object(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<DynamicObject> {
        self.state()
            .objects
            .get(&object_key(resource, namespace, name))
            .cloned()
    }

    /// Number of stored objects of one resource type (terminating ones included)
    pub fn count(&self, resource: &ApiResource) -> usize {
        let key = resource_key(resource);
        self.state()
            .objects
            .keys()
            .filter(|(r, _, _)| *r == key)
            .count()
    }

    /// Serve `group_version` from discovery with the given resource names
    pub fn add_group_version(&self, group_version: &str, resources: &[&str]) {
        self.state().group_versions.insert(
            group_version.to_string(),
            resources.iter().map(|r| (*r).to_string()).collect(),
        );
    }

    /// Make every discovery call fail with a non-NotFound error
    pub fn fail_discovery(&self, message: &str) {
        self.state().discovery_error = Some(message.to_string());
    }

    /// Make applies of `kind`/`name` fail
    pub fn fail_apply(&self, kind: &str, name: &str) {
        self.state()
            .failing_applies
            .insert((kind.to_string(), name.to_string()));
    }

    /// Make updates of the named object fail
    pub fn fail_update(&self, namespace: Option<&str>, name: &str) {
        self.state()
            .failing_updates
            .insert((namespace.map(str::to_string), name.to_string()));
    }

    /// Make deletes of the named object fail with a server error
    pub fn fail_delete(&self, namespace: Option<&str>, name: &str) {
        self.state()
            .failing_deletes
            .insert((namespace.map(str::to_string), name.to_string()));
    }

    /// Simulate another writer touching the named object immediately before
    /// the next delete of it: a finalizer is re-added and the resource version
    /// moves on, so a guarded delete fails with `Conflict`.
    pub fn resurrect_before_delete(&self, namespace: Option<&str>, name: &str) {
        self.state()
            .resurrections
            .insert((namespace.map(str::to_string), name.to_string()));
    }

    /// Insert `object` right after the `after_call`-th list call (1-based) returns
    pub fn inject_after_list(&self, after_call: usize, resource: &ApiResource, object: DynamicObject) {
        self.state()
            .injections
            .push((after_call, resource.clone(), object));
    }

    /// Number of list calls served so far
    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    /// Applies in call order as `(kind, name, result)`
    pub fn applied(&self) -> Vec<(String, String, ApplyResult)> {
        self.state().apply_log.clone()
    }

    /// Forget recorded applies and deletes, keeping the stored objects
    pub fn clear_logs(&self) {
        let mut state = self.state();
        state.apply_log.clear();
        state.delete_log.clear();
    }

    /// Successful deletes in call order as `(kind, namespace/name)`
    pub fn deleted(&self) -> Vec<(String, String)> {
        self.state().delete_log.clone()
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn apply(
        &self,
        resource: &ApiResource,
        mut object: DynamicObject,
        owner: &Owner,
    ) -> Result<ApplyResult, ClusterError> {
        let name = object
            .metadata
            .name
            .clone()
            .ok_or_else(|| ClusterError::InvalidRequest("object has no metadata.name".to_string()))?;
        let mut state = self.state();
        if state
            .failing_applies
            .contains(&(resource.kind.clone(), name.clone()))
        {
            return Err(ClusterError::Api(format!(
                "injected apply failure for {} {}",
                resource.kind, name
            )));
        }
        if object.types.is_none() {
            object.types = Some(TypeMeta {
                api_version: resource.api_version.clone(),
                kind: resource.kind.clone(),
            });
        }
        owner.attach(&mut object);

        let key = object_key(resource, object.metadata.namespace.as_deref(), &name);
        let result = match state.objects.get(&key) {
            None => ApplyResult::Created,
            Some(existing) if comparable(existing)? == comparable(&object)? => ApplyResult::Unchanged,
            Some(existing) => {
                object.metadata.uid = existing.metadata.uid.clone();
                ApplyResult::Updated
            }
        };
        if result != ApplyResult::Unchanged {
            state.store(key, object);
        }
        state.apply_log.push((resource.kind.clone(), name, result));
        Ok(result)
    }

    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, ClusterError> {
        self.object(resource, namespace, name).ok_or_else(|| {
            ClusterError::NotFound(format!("{} {}", resource.kind, display_key(namespace, name)))
        })
    }

    async fn update(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let namespace = object.metadata.namespace.clone();
        let name = object.metadata.name.clone().unwrap_or_default();
        let mut state = self.state();
        if state.failing_updates.contains(&(namespace.clone(), name.clone())) {
            return Err(ClusterError::Api(format!(
                "injected update failure for {}",
                display_key(namespace.as_deref(), &name)
            )));
        }
        let key = object_key(resource, namespace.as_deref(), &name);
        let stored = state.objects.get(&key).ok_or_else(|| {
            ClusterError::NotFound(format!("{} {}", resource.kind, display_key(namespace.as_deref(), &name)))
        })?;
        if stored.metadata.resource_version != object.metadata.resource_version {
            return Err(ClusterError::Conflict(format!(
                "the object {} has been modified; please apply your changes to the latest version",
                display_key(namespace.as_deref(), &name)
            )));
        }
        let mut updated = object.clone();
        updated.metadata.uid = stored.metadata.uid.clone();

        let finalizers_cleared = updated
            .metadata
            .finalizers
            .as_ref()
            .is_none_or(Vec::is_empty);
        if finalizers_cleared && state.terminating.remove(&key) {
            state.objects.remove(&key);
            updated.metadata.resource_version = Some(state.bump_resource_version());
            return Ok(updated);
        }
        Ok(state.store(key, updated))
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        preconditions: Option<&DeletePreconditions>,
    ) -> Result<(), ClusterError> {
        let mut state = self.state();
        let ident = (namespace.map(str::to_string), name.to_string());
        if state.failing_deletes.contains(&ident) {
            return Err(ClusterError::Api(format!(
                "injected delete failure for {}",
                display_key(namespace, name)
            )));
        }
        let key = object_key(resource, namespace, name);
        if state.resurrections.remove(&ident) {
            if let Some(mut object) = state.objects.get(&key).cloned() {
                object
                    .metadata
                    .finalizers
                    .get_or_insert_with(Vec::new)
                    .push("dcops.microscaler.io/legacy".to_string());
                state.store(key.clone(), object);
            }
        }

        let stored = state.objects.get(&key).ok_or_else(|| {
            ClusterError::NotFound(format!("{} {}", resource.kind, display_key(namespace, name)))
        })?;
        if let Some(expected) = preconditions {
            if stored.metadata.uid.as_deref() != Some(expected.uid.as_str()) {
                return Err(ClusterError::Conflict(format!(
                    "Precondition failed: UID in precondition: {}, UID in object meta: {}",
                    expected.uid,
                    stored.metadata.uid.as_deref().unwrap_or_default()
                )));
            }
            if stored.metadata.resource_version.as_deref() != Some(expected.resource_version.as_str()) {
                return Err(ClusterError::Conflict(format!(
                    "Precondition failed: ResourceVersion in precondition: {}, ResourceVersion in object meta: {}",
                    expected.resource_version,
                    stored.metadata.resource_version.as_deref().unwrap_or_default()
                )));
            }
        }

        let has_finalizers = stored
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| !f.is_empty());
        if has_finalizers {
            state.terminating.insert(key);
        } else {
            state.objects.remove(&key);
            state.terminating.remove(&key);
        }
        state
            .delete_log
            .push((resource.kind.clone(), display_key(namespace, name)));
        Ok(())
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        continue_token: Option<&str>,
        limit: u32,
    ) -> Result<ListPage, ClusterError> {
        let mut state = self.state();
        let rkey = resource_key(resource);
        let after = continue_token.map(|token| match token.split_once('/') {
            Some((ns, name)) => (ns.to_string(), name.to_string()),
            None => (String::new(), token.to_string()),
        });

        let (items, has_more) = {
            let mut matching = state
                .objects
                .iter()
                .filter(|((r, ns, _), _)| *r == rkey && namespace.is_none_or(|want| want == ns.as_str()))
                .filter(|((_, ns, name), _)| {
                    after
                        .as_ref()
                        .is_none_or(|(a_ns, a_name)| (ns, name) > (a_ns, a_name))
                })
                .map(|(_, object)| object.clone());
            let limit = usize::try_from(limit).unwrap_or(usize::MAX).max(1);
            let items: Vec<DynamicObject> = matching.by_ref().take(limit).collect();
            let has_more = matching.next().is_some();
            (items, has_more)
        };

        let continue_token = if has_more {
            items.last().map(|last| {
                format!(
                    "{}/{}",
                    last.metadata.namespace.as_deref().unwrap_or_default(),
                    last.metadata.name.as_deref().unwrap_or_default()
                )
            })
        } else {
            None
        };

        state.list_calls += 1;
        let call = state.list_calls;
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut state.injections)
            .into_iter()
            .partition(|(after_call, _, _)| *after_call == call);
        state.injections = pending;
        for (_, injected_resource, mut object) in due {
            if object.types.is_none() {
                object.types = Some(TypeMeta {
                    api_version: injected_resource.api_version.clone(),
                    kind: injected_resource.kind.clone(),
                });
            }
            let name = object.metadata.name.clone().unwrap_or_default();
            let key = object_key(&injected_resource, object.metadata.namespace.as_deref(), &name);
            state.store(key, object);
        }

        Ok(ListPage {
            items,
            continue_token,
        })
    }

    async fn server_resources_for_group_version(
        &self,
        group_version: &str,
    ) -> Result<Vec<String>, ClusterError> {
        let state = self.state();
        if let Some(message) = &state.discovery_error {
            return Err(ClusterError::Api(message.clone()));
        }
        state
            .group_versions
            .get(group_version)
            .cloned()
            .ok_or_else(|| {
                ClusterError::NotFound(format!(
                    "the server could not find the requested resource: {}",
                    group_version
                ))
            })
    }
}
