//! Per-controller tuning rendered into a ConfigMap.
//!
//! The controllers read this ConfigMap once at start-up, so any change has to
//! roll the pods. The operator stamps a fingerprint of the data onto the pod
//! template; a different fingerprint is a different template, which is what
//! makes the Deployment roll.

use crate::error::ControllerError;
use crds::{ControllerConfig, DCopsConfigSpec};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Name of the generated ConfigMap
pub const CONTROLLERS_CONFIG_MAP_NAME: &str = "dcops-controllers-config";

/// Pod-template annotation carrying the fingerprint
pub const CONTROLLERS_CONFIG_HASH_ANNOTATION: &str = "dcops.microscaler.io/controllers-config-hash";

/// Controller segment used for the default record
pub const DEFAULT_CONTROLLER_KEY: &str = "DEFAULT";

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// `CONCURRENT_RECONCILES_IP_CLAIM` for setting `CONCURRENT_RECONCILES`, controller `ip-claim`
pub fn settings_key(setting: &str, controller: &str) -> String {
    let controller: String = controller
        .chars()
        .map(|c| match c {
            '-' | '.' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect();
    format!("{}_{}", setting, controller)
}

fn emit(data: &mut BTreeMap<String, String>, controller: &str, config: &ControllerConfig) {
    let settings = [
        ("CONCURRENT_RECONCILES", config.concurrent_reconciles),
        ("CLIENT_QPS", config.client_qps),
        ("CLIENT_BURST", config.client_burst),
        ("QUEUE_QPS", config.queue_qps),
        ("QUEUE_BURST", config.queue_burst),
    ];
    for (setting, value) in settings {
        if let Some(value) = value {
            data.insert(settings_key(setting, controller), value.to_string());
        }
    }
}

/// Flatten the tuning records into ConfigMap data. The default record goes
/// first; per-controller records follow in list order, later ones winning.
pub fn build_settings(spec: &DCopsConfigSpec) -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();
    let Some(controllers_config) = &spec.controllers_config else {
        return data;
    };
    if let Some(default) = &controllers_config.default {
        emit(&mut data, DEFAULT_CONTROLLER_KEY, default);
    }
    for record in &controllers_config.controllers {
        emit(&mut data, &record.name, &record.config);
    }
    data
}

/// Build the ConfigMap for `namespace`
pub fn build_config_map(spec: &DCopsConfigSpec, namespace: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(CONTROLLERS_CONFIG_MAP_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(build_settings(spec)),
        ..Default::default()
    }
}

/// Fingerprint of ConfigMap data. Depends only on content, never on order of
/// construction.
pub fn fingerprint(data: &BTreeMap<String, String>) -> Result<String, ControllerError> {
    let encoded = serde_json::to_vec(data)?;
    Ok(sha256_hex(&encoded))
}

/// Record `hash` on the pod template
pub fn stamp_fingerprint(deployment: &mut Deployment, hash: &str) {
    let Some(spec) = deployment.spec.as_mut() else {
        return;
    };
    spec.template
        .metadata
        .get_or_insert_with(Default::default)
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(CONTROLLERS_CONFIG_HASH_ANNOTATION.to_string(), hash.to_string());
}
