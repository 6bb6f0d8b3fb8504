//! Test utilities for unit testing reconcilers
//!
//! Builders for configs, legacy instances and secrets, and a reconciler wired
//! to a [`MockClusterClient`].

use crate::reconciler::Reconciler;
use crate::settings::OperatorSettings;
use cluster_client::{MockClusterClient, to_dynamic};
use crds::{DCOPS_CONFIG_NAME, DCopsConfig, DCopsConfigSpec, NETBOX_SYNC_INSTANCE_CRD_NAME, NetBoxSyncInstance};
use k8s_openapi::ByteString;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{ApiResource, DynamicObject};
use std::collections::BTreeMap;

/// Helper to create a persisted-looking DCopsConfig
pub fn create_test_config(spec: DCopsConfigSpec) -> DCopsConfig {
    let mut config = DCopsConfig::new(DCOPS_CONFIG_NAME, spec);
    config.metadata.uid = Some("5b0d3b6e-2f0a-4c57-9f43-3f1b6cf4a001".to_string());
    config.metadata.generation = Some(1);
    config
}

/// Reconciler sharing state with `client`
pub fn create_test_reconciler(client: &MockClusterClient, settings: OperatorSettings) -> Reconciler {
    Reconciler::new(Box::new(client.clone()), settings)
}

/// ApiResource of the legacy kind
pub fn legacy_resource() -> ApiResource {
    ApiResource::erase::<NetBoxSyncInstance>(&())
}

/// ApiResource of CRDs
pub fn crd_resource() -> ApiResource {
    ApiResource::erase::<CustomResourceDefinition>(&())
}

/// Store the legacy CRD in the mock
pub fn install_legacy_crd(client: &MockClusterClient) {
    let resource = crd_resource();
    client.insert(&resource, DynamicObject::new(NETBOX_SYNC_INSTANCE_CRD_NAME, &resource));
}

/// Build a legacy instance, optionally carrying a finalizer
pub fn create_legacy_instance(namespace: &str, name: &str, with_finalizer: bool) -> DynamicObject {
    let mut object = DynamicObject::new(name, &legacy_resource()).within(namespace);
    if with_finalizer {
        object.metadata.finalizers = Some(vec!["dcops.microscaler.io/netbox-sync".to_string()]);
    }
    object
}

/// Store a secret with an optional `ca.crt`
pub fn insert_ca_secret(client: &MockClusterClient, namespace: &str, name: &str, ca: Option<&str>) {
    let secret = Secret {
        metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: ca.map(|ca| BTreeMap::from([("ca.crt".to_string(), ByteString(ca.as_bytes().to_vec()))])),
        ..Default::default()
    };
    let (resource, object) = to_dynamic(&secret).unwrap();
    client.insert(&resource, object);
}

/// Read back a typed object from the mock
pub fn stored<K>(client: &MockClusterClient, namespace: Option<&str>, name: &str) -> Option<K>
where
    K: kube::Resource<DynamicType = ()> + serde::de::DeserializeOwned,
{
    let resource = ApiResource::erase::<K>(&());
    client
        .object(&resource, namespace, name)
        .map(|object| cluster_client::from_dynamic(object).unwrap())
}

/// The applied controllers Deployment
pub fn stored_deployment(client: &MockClusterClient, namespace: &str) -> Deployment {
    stored(client, Some(namespace), "dcops-controllers").unwrap()
}

/// The applied controllers ConfigMap
pub fn stored_controllers_config(client: &MockClusterClient, namespace: &str) -> ConfigMap {
    stored(client, Some(namespace), crate::controllers_config::CONTROLLERS_CONFIG_MAP_NAME).unwrap()
}
