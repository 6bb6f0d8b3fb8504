//! Builds the desired controllers Deployment from the embedded template.
//!
//! Which env vars and args the controllers get is driven by the tables below.
//! Every row reads the config and the operator settings and either emits
//! exactly one entry or nothing. Rows are evaluated in table order.

use crate::assets;
use crate::error::ControllerError;
use crate::settings::OperatorSettings;
use crds::{DCopsConfigSpec, DeleteProtection};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, PodSpec, Volume, VolumeMount,
};
use tracing::debug;

/// Name of the managed-domains volume
pub const MANAGED_DOMAINS_VOLUME: &str = "managed-domains";

/// Where the managed-domains ConfigMap is mounted
pub const MANAGED_DOMAINS_MOUNT_PATH: &str = "/data/config/managed-domains";

/// Env var telling the controllers where the managed-domains file is
pub const MANAGED_DOMAINS_FILE_ENV: &str = "MANAGED_DOMAINS_FILE";

type ValueFn = fn(&DCopsConfigSpec, &OperatorSettings) -> Option<String>;

/// One row of the env table
struct EnvToggle {
    name: &'static str,
    value: ValueFn,
}

/// One row of the args table; emits `flag value`
struct ArgToggle {
    flag: &'static str,
    value: ValueFn,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn image(_: &DCopsConfigSpec, settings: &OperatorSettings) -> Option<String> {
    non_empty(settings.image.as_deref())
}

fn image_pull_policy(_: &DCopsConfigSpec, settings: &OperatorSettings) -> Option<String> {
    non_empty(settings.image_pull_policy.as_deref())
}

fn disabled_controllers(spec: &DCopsConfigSpec, _: &OperatorSettings) -> Option<String> {
    (!spec.disabled_controllers.is_empty()).then(|| spec.disabled_controllers.join(","))
}

fn log_level(spec: &DCopsConfigSpec, _: &OperatorSettings) -> Option<String> {
    non_empty(spec.log_level.as_deref())
}

fn resync_interval(spec: &DCopsConfigSpec, _: &OperatorSettings) -> Option<String> {
    non_empty(spec.resync_interval.as_deref())
}

fn skip_gather_logs(spec: &DCopsConfigSpec, _: &OperatorSettings) -> Option<String> {
    Some(spec.failed_provision_config.skip_gather_logs.to_string())
}

fn dns_servers(_: &DCopsConfigSpec, settings: &OperatorSettings) -> Option<String> {
    non_empty(settings.dns_servers.as_deref())
}

fn velero_backup(spec: &DCopsConfigSpec, _: &OperatorSettings) -> Option<String> {
    spec.backup.velero.enabled.then(|| "true".to_string())
}

fn velero_namespace(spec: &DCopsConfigSpec, _: &OperatorSettings) -> Option<String> {
    if !spec.backup.velero.enabled {
        return None;
    }
    non_empty(spec.backup.velero.namespace.as_deref())
}

fn deprovisions_disabled(spec: &DCopsConfigSpec, _: &OperatorSettings) -> Option<String> {
    (spec.deprovisions_disabled == Some(true)).then(|| "true".to_string())
}

fn min_backup_period(spec: &DCopsConfigSpec, _: &OperatorSettings) -> Option<String> {
    spec.backup.min_backup_period_seconds.map(|seconds| seconds.to_string())
}

fn protected_delete(spec: &DCopsConfigSpec, _: &OperatorSettings) -> Option<String> {
    (spec.delete_protection == Some(DeleteProtection::Enabled)).then(|| "true".to_string())
}

const OVERRIDE_ENV: &[EnvToggle] = &[
    EnvToggle { name: "DCOPS_IMAGE", value: image },
    EnvToggle { name: "DCOPS_IMAGE_PULL_POLICY", value: image_pull_policy },
];

const ARGS: &[ArgToggle] = &[
    ArgToggle { flag: "--disabled-controllers", value: disabled_controllers },
    ArgToggle { flag: "--log-level", value: log_level },
];

/// Rows emitted before the managed-domains volume
const ENV_BEFORE_MANAGED_DOMAINS: &[EnvToggle] = &[
    EnvToggle { name: "RESYNC_INTERVAL", value: resync_interval },
];

/// Rows emitted after the managed-domains volume
const ENV: &[EnvToggle] = &[
    EnvToggle { name: "SKIP_GATHER_LOGS", value: skip_gather_logs },
    EnvToggle { name: "ZONE_CHECK_DNS_SERVERS", value: dns_servers },
    EnvToggle { name: "VELERO_BACKUP", value: velero_backup },
    EnvToggle { name: "VELERO_NAMESPACE", value: velero_namespace },
    EnvToggle { name: "DEPROVISIONS_DISABLED", value: deprovisions_disabled },
    EnvToggle { name: "MIN_BACKUP_PERIOD_SECONDS", value: min_backup_period },
    EnvToggle { name: "PROTECTED_DELETE", value: protected_delete },
];

/// Mutable access to the pod spec of `deployment`
pub fn pod_spec_mut(deployment: &mut Deployment) -> Result<&mut PodSpec, ControllerError> {
    deployment
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .ok_or_else(|| ControllerError::invalid_asset(assets::DEPLOYMENT_ASSET, "deployment has no pod spec"))
}

/// Mutable access to the first (controllers) container
pub fn controllers_container(deployment: &mut Deployment) -> Result<&mut Container, ControllerError> {
    pod_spec_mut(deployment)?
        .containers
        .first_mut()
        .ok_or_else(|| ControllerError::invalid_asset(assets::DEPLOYMENT_ASSET, "deployment has no containers"))
}

/// Append an env var to a container
pub fn push_env(container: &mut Container, name: &str, value: String) {
    container.env.get_or_insert_with(Vec::new).push(EnvVar {
        name: name.to_string(),
        value: Some(value),
        value_from: None,
    });
}

fn apply_env_table(container: &mut Container, table: &[EnvToggle], spec: &DCopsConfigSpec, settings: &OperatorSettings) {
    for toggle in table {
        if let Some(value) = (toggle.value)(spec, settings) {
            debug!("Setting {}={}", toggle.name, value);
            push_env(container, toggle.name, value);
        }
    }
}

fn apply_arg_table(container: &mut Container, spec: &DCopsConfigSpec, settings: &OperatorSettings) {
    for toggle in ARGS {
        if let Some(value) = (toggle.value)(spec, settings) {
            debug!("Adding {} {}", toggle.flag, value);
            let args = container.args.get_or_insert_with(Vec::new);
            args.push(toggle.flag.to_string());
            args.push(value);
        }
    }
}

fn add_managed_domains_volume(deployment: &mut Deployment, config_map: &str) -> Result<(), ControllerError> {
    let pod = pod_spec_mut(deployment)?;
    pod.volumes.get_or_insert_with(Vec::new).push(Volume {
        name: MANAGED_DOMAINS_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    });
    let container = controllers_container(deployment)?;
    container.volume_mounts.get_or_insert_with(Vec::new).push(VolumeMount {
        name: MANAGED_DOMAINS_VOLUME.to_string(),
        mount_path: MANAGED_DOMAINS_MOUNT_PATH.to_string(),
        read_only: Some(true),
        ..Default::default()
    });
    push_env(container, MANAGED_DOMAINS_FILE_ENV, format!("{}/domains.yaml", MANAGED_DOMAINS_MOUNT_PATH));
    Ok(())
}

/// Build the desired Deployment for `spec` in `namespace`.
///
/// Covers the image overrides, the arg and env tables and the managed-domains
/// volume. Additional CAs, the global pull secret and maintenance mode are
/// layered on afterwards.
pub fn assemble(
    spec: &DCopsConfigSpec,
    settings: &OperatorSettings,
    namespace: &str,
) -> Result<Deployment, ControllerError> {
    let mut deployment = assets::read_deployment()?;
    deployment.metadata.namespace = Some(namespace.to_string());

    let container = controllers_container(&mut deployment)?;
    if let Some(image) = image(spec, settings) {
        container.image = Some(image);
    }
    if let Some(policy) = image_pull_policy(spec, settings) {
        container.image_pull_policy = Some(policy);
    }
    apply_env_table(container, OVERRIDE_ENV, spec, settings);
    apply_arg_table(container, spec, settings);
    apply_env_table(container, ENV_BEFORE_MANAGED_DOMAINS, spec, settings);

    add_managed_domains_volume(&mut deployment, &settings.managed_domains_configmap)?;

    let container = controllers_container(&mut deployment)?;
    apply_env_table(container, ENV, spec, settings);
    Ok(deployment)
}

/// Export the global pull secret name when one is configured.
pub fn include_global_pull_secret(spec: &DCopsConfigSpec, deployment: &mut Deployment) -> Result<(), ControllerError> {
    let Some(name) = spec
        .global_pull_secret_ref
        .as_ref()
        .map(|reference| reference.name.as_str())
        .filter(|name| !name.is_empty())
    else {
        debug!("Global pull secret not specified");
        return Ok(());
    };
    push_env(controllers_container(deployment)?, "GLOBAL_PULL_SECRET", name.to_string());
    Ok(())
}

/// Scale to zero when maintenance mode is on. Must run after every other
/// mutation.
pub fn apply_maintenance_mode(spec: &DCopsConfigSpec, deployment: &mut Deployment) {
    if spec.maintenance_mode != Some(true) {
        return;
    }
    if let Some(deployment_spec) = deployment.spec.as_mut() {
        debug!("Maintenance mode enabled, scaling controllers to zero");
        deployment_spec.replicas = Some(0);
    }
}
