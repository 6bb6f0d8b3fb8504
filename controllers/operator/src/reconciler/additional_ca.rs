//! Additional certificate authorities.
//!
//! The `ca.crt` of every referenced secret is concatenated into a single
//! aggregate secret that is mounted into the controllers. The volume name is
//! derived from the bundle contents, so a changed bundle changes the pod
//! template and rolls the controllers.

use super::Reconciler;
use crate::assembler::{controllers_container, pod_spec_mut, push_env};
use crate::controllers_config::sha256_hex;
use crate::error::ControllerError;
use cluster_client::{Owner, from_dynamic, to_dynamic};
use crds::DCopsConfig;
use k8s_openapi::ByteString;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, SecretVolumeSource, Volume, VolumeMount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::ApiResource;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Name of the aggregate secret
pub const ADDITIONAL_CA_SECRET_NAME: &str = "dcops-additional-ca";

/// Key holding a PEM bundle, in both source and aggregate secrets
pub const CA_KEY: &str = "ca.crt";

/// Where the aggregate secret is mounted
pub const ADDITIONAL_CA_MOUNT_PATH: &str = "/additional/ca";

/// Env var pointing the controllers at the bundle
pub const ADDITIONAL_CA_ENV: &str = "ADDITIONAL_CA";

/// `additionalca-` plus the first 20 hex characters of the bundle's SHA-256
pub fn additional_ca_volume_name(bundle: &[u8]) -> String {
    let digest = sha256_hex(bundle);
    format!("additionalca-{}", &digest[..20])
}

/// Build the aggregate secret holding `bundle`
pub fn build_aggregate_secret(namespace: &str, bundle: Vec<u8>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(ADDITIONAL_CA_SECRET_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(CA_KEY.to_string(), ByteString(bundle))])),
        ..Default::default()
    }
}

/// Mount the aggregate secret into the controllers and point them at it
pub fn mount_additional_ca(deployment: &mut Deployment, volume_name: &str) -> Result<(), ControllerError> {
    pod_spec_mut(deployment)?
        .volumes
        .get_or_insert_with(Vec::new)
        .push(Volume {
            name: volume_name.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(ADDITIONAL_CA_SECRET_NAME.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
    let container = controllers_container(deployment)?;
    container.volume_mounts.get_or_insert_with(Vec::new).push(VolumeMount {
        name: volume_name.to_string(),
        mount_path: ADDITIONAL_CA_MOUNT_PATH.to_string(),
        read_only: Some(true),
        ..Default::default()
    });
    push_env(container, ADDITIONAL_CA_ENV, format!("{}/{}", ADDITIONAL_CA_MOUNT_PATH, CA_KEY));
    Ok(())
}

impl Reconciler {
    /// Concatenate the configured CA secrets, keep the aggregate secret in
    /// sync and mount it. With no usable CA the aggregate secret is removed
    /// and the Deployment is left alone.
    pub async fn include_additional_cas(
        &self,
        config: &DCopsConfig,
        owner: &Owner,
        deployment: &mut Deployment,
    ) -> Result<(), ControllerError> {
        let namespace = config.target_namespace();
        let secrets = ApiResource::erase::<Secret>(&());
        let mut bundle: Vec<u8> = Vec::new();

        for reference in &config.spec.additional_certificate_authorities_secret_ref {
            let object = match self.client.get(&secrets, Some(namespace), &reference.name).await {
                Ok(object) => object,
                Err(e) => {
                    error!(secret = %reference.name, error = %e, "Cannot read additional CA secret");
                    continue;
                }
            };
            let secret: Secret = match from_dynamic(object) {
                Ok(secret) => secret,
                Err(e) => {
                    error!(secret = %reference.name, error = %e, "Cannot decode additional CA secret");
                    continue;
                }
            };
            match secret.data.as_ref().and_then(|data| data.get(CA_KEY)) {
                Some(ca) => {
                    bundle.extend_from_slice(&ca.0);
                    bundle.push(b'\n');
                }
                None => {
                    warn!(secret = %reference.name, "Additional CA secret has no {} key, skipping", CA_KEY);
                }
            }
        }

        if bundle.is_empty() {
            return self.remove_aggregate_secret(&secrets, namespace).await;
        }

        let volume_name = additional_ca_volume_name(&bundle);
        let (resource, object) = to_dynamic(&build_aggregate_secret(namespace, bundle))?;
        let result = self.client.apply(&resource, object, owner).await.map_err(|e| {
            error!(secret = ADDITIONAL_CA_SECRET_NAME, error = %e, "Error applying additional CA secret");
            e
        })?;
        info!(secret = ADDITIONAL_CA_SECRET_NAME, %result, "Additional CA secret applied");

        mount_additional_ca(deployment, &volume_name)
    }

    async fn remove_aggregate_secret(
        &self,
        secrets: &ApiResource,
        namespace: &str,
    ) -> Result<(), ControllerError> {
        match self.client.delete(secrets, Some(namespace), ADDITIONAL_CA_SECRET_NAME, None).await {
            Ok(()) => {
                info!(secret = ADDITIONAL_CA_SECRET_NAME, "Deleted additional CA secret");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("No additional CAs configured, nothing to clean up");
                Ok(())
            }
            Err(e) => {
                error!(secret = ADDITIONAL_CA_SECRET_NAME, error = %e, "Error deleting additional CA secret");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_name_is_stable_and_sized() {
        let bundle = b"-----BEGIN CERTIFICATE-----\nA\n-----END CERTIFICATE-----\n\n";
        let name = additional_ca_volume_name(bundle);
        assert_eq!(name, additional_ca_volume_name(bundle));
        assert_eq!(name.len(), "additionalca-".len() + 20);
        assert_ne!(name, additional_ca_volume_name(b"other\n"));
    }

    #[test]
    fn test_mount_sets_volume_mount_and_env() {
        let mut deployment = crate::assets::read_deployment().unwrap();
        mount_additional_ca(&mut deployment, "additionalca-0123456789abcdef0123").unwrap();
        let pod = pod_spec_mut(&mut deployment).unwrap();
        let volume = pod.volumes.as_ref().unwrap().last().unwrap();
        assert_eq!(volume.name, "additionalca-0123456789abcdef0123");
        assert_eq!(
            volume.secret.as_ref().and_then(|s| s.secret_name.as_deref()),
            Some(ADDITIONAL_CA_SECRET_NAME)
        );
        let container = &pod.containers[0];
        assert!(container
            .volume_mounts
            .as_ref()
            .unwrap()
            .iter()
            .any(|m| m.mount_path == ADDITIONAL_CA_MOUNT_PATH));
        assert!(container
            .env
            .as_ref()
            .unwrap()
            .iter()
            .any(|e| e.name == ADDITIONAL_CA_ENV && e.value.as_deref() == Some("/additional/ca/ca.crt")));
    }
}
