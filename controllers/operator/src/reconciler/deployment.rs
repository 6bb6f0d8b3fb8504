//! Self-deployment pipeline.
//!
//! One pass assembles the controllers Deployment, derives the settings
//! ConfigMap and its fingerprint, applies the supporting RBAC and service
//! resources and finally applies the Deployment itself. Any failure aborts the
//! pass; the watcher requeues it.

use super::Reconciler;
use crate::assembler::{apply_maintenance_mode, assemble, include_global_pull_secret};
use crate::assets::{
    CLUSTER_ROLE_ASSETS, CLUSTER_ROLE_BINDING_ASSETS, NAMESPACED_ASSETS, OPENSHIFT_ASSETS,
    apply_asset, apply_asset_with_namespace, apply_cluster_role_binding_with_subject_namespace,
};
use crate::controllers_config::{CONTROLLERS_CONFIG_MAP_NAME, build_config_map, fingerprint, stamp_fingerprint};
use crate::error::ControllerError;
use cluster_client::{Owner, to_dynamic};
use crds::DCopsConfig;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

impl Reconciler {
    /// Bring the controllers workload and everything it needs in line with `config`.
    pub async fn reconcile_self_deployment(&self, config: &DCopsConfig) -> Result<(), ControllerError> {
        let owner = Owner::from_resource(config).ok_or_else(|| {
            ControllerError::Reconciliation("DCopsConfig has no name or uid yet".to_string())
        })?;
        let namespace = config.target_namespace();
        info!(namespace, "Reconciling controllers deployment");

        let mut deployment = assemble(&config.spec, &self.settings, namespace)?;
        self.include_additional_cas(config, &owner, &mut deployment).await?;
        include_global_pull_secret(&config.spec, &mut deployment)?;
        apply_maintenance_mode(&config.spec, &mut deployment);

        let hash = self.apply_controllers_config(config, &owner).await?;
        stamp_fingerprint(&mut deployment, &hash);

        for path in NAMESPACED_ASSETS {
            apply_asset_with_namespace(self.cluster(), path, namespace, &owner).await?;
        }
        for path in CLUSTER_ROLE_ASSETS {
            apply_asset(self.cluster(), path, &owner).await?;
        }
        for path in CLUSTER_ROLE_BINDING_ASSETS {
            apply_cluster_role_binding_with_subject_namespace(self.cluster(), path, namespace, &owner).await?;
        }

        if self.running_on_openshift().await? {
            info!("Deploying OpenShift specific assets");
            for path in OPENSHIFT_ASSETS {
                apply_asset(self.cluster(), path, &owner).await?;
            }
        } else {
            debug!("Not running on OpenShift, skipping OpenShift specific assets");
        }

        let name = deployment.metadata.name.clone().unwrap_or_default();
        let (resource, object) = to_dynamic(&deployment)?;
        match self.client.apply(&resource, object, &owner).await {
            Ok(result) => {
                info!(deployment = %name, namespace, %result, "Controllers deployment applied");
                Ok(())
            }
            Err(e) => {
                error!(deployment = %name, namespace, error = %e, "Error applying controllers deployment");
                Err(e.into())
            }
        }
    }

    /// Apply the settings ConfigMap and return the fingerprint of its data.
    async fn apply_controllers_config(&self, config: &DCopsConfig, owner: &Owner) -> Result<String, ControllerError> {
        let config_map = build_config_map(&config.spec, config.target_namespace());
        let (resource, object) = to_dynamic(&config_map)?;
        let result = self.client.apply(&resource, object, owner).await.map_err(|e| {
            error!(configmap = CONTROLLERS_CONFIG_MAP_NAME, error = %e, "Error applying controllers config");
            e
        })?;
        debug!(configmap = CONTROLLERS_CONFIG_MAP_NAME, %result, "Controllers config applied");

        let empty = BTreeMap::new();
        let hash = fingerprint(config_map.data.as_ref().unwrap_or(&empty))?;
        debug!(hash = %hash, "Controllers config fingerprint");
        Ok(hash)
    }
}
