//! Kubernetes resource watchers.
//!
//! Watches `DCopsConfig` (and the Deployments it owns) through
//! `kube_runtime::Controller` and runs the self-deployment pipeline for the
//! singleton config. The outcome of every pass is written to the config's
//! status.

use crate::error::ControllerError;
use crate::probes::Readiness;
use crate::reconciler::Reconciler;
use crds::{DCOPS_CONFIG_NAME, DCopsConfig, DCopsConfigStatus};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, watcher, controller::{Action, Config as ControllerConfig}};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Requeue after a successful pass
const RESYNC_INTERVAL: Duration = Duration::from_secs(600);

/// Requeue after a failed pass
const ERROR_REQUEUE: Duration = Duration::from_secs(60);

/// Shared state handed to every reconcile call
struct Context {
    reconciler: Arc<Reconciler>,
    configs: Api<DCopsConfig>,
}

/// Watches `DCopsConfig` resources for changes.
pub struct Watcher {
    client: Client,
    reconciler: Arc<Reconciler>,
    readiness: Readiness,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(client: Client, reconciler: Arc<Reconciler>, readiness: Readiness) -> Self {
        Self {
            client,
            reconciler,
            readiness,
        }
    }

    /// Starts watching `DCopsConfig` resources. Runs until the watch stream ends.
    pub async fn watch_dcops_configs(&self) -> Result<(), ControllerError> {
        info!("Starting DCopsConfig watcher");

        let configs: Api<DCopsConfig> = Api::all(self.client.clone());
        let deployments: Api<Deployment> = Api::all(self.client.clone());
        let context = Arc::new(Context {
            reconciler: Arc::clone(&self.reconciler),
            configs: configs.clone(),
        });

        // One pass at a time: the pipeline has no protection against overlapping passes.
        let controller_config = ControllerConfig::default()
            .debounce(Duration::from_secs(1))
            .concurrency(1);

        self.readiness.set_ready();
        Controller::new(configs, watcher::Config::default())
            .watches(deployments, watcher::Config::default(), owning_config)
            .with_config(controller_config)
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok((object, _)) => debug!("Reconciled {}", object),
                    Err(e) => error!("DCopsConfig controller error: {}", e),
                }
            })
            .await;

        Ok(())
    }
}

/// Map a Deployment to the `DCopsConfig` that owns it.
///
/// `Controller::owns` would look the owner up in the Deployment's namespace,
/// which never matches a cluster-scoped config.
fn owning_config(deployment: Deployment) -> Option<ObjectRef<DCopsConfig>> {
    let kind = DCopsConfig::kind(&());
    let api_version = DCopsConfig::api_version(&());
    deployment
        .metadata
        .owner_references?
        .into_iter()
        .find(|owner| owner.kind == kind && owner.api_version == api_version)
        .map(|owner| ObjectRef::new(&owner.name))
}

async fn reconcile(config: Arc<DCopsConfig>, context: Arc<Context>) -> Result<Action, ControllerError> {
    let name = config.name_any();
    if name != DCOPS_CONFIG_NAME {
        warn!("Ignoring DCopsConfig {}, only {} is reconciled", name, DCOPS_CONFIG_NAME);
        return Ok(Action::await_change());
    }

    let result = context.reconciler.reconcile_self_deployment(&config).await;
    let status = DCopsConfigStatus {
        observed_generation: config.metadata.generation,
        config_applied: result.is_ok(),
        error: result.as_ref().err().map(ToString::to_string),
    };
    if config.status.as_ref() != Some(&status) {
        let patch = Patch::Merge(json!({ "status": status }));
        if let Err(e) = context.configs.patch_status(&name, &PatchParams::default(), &patch).await {
            warn!("Failed to update status of DCopsConfig {}: {}", name, e);
        }
    }

    result.map(|()| Action::requeue(RESYNC_INTERVAL))
}

fn error_policy(config: Arc<DCopsConfig>, error: &ControllerError, _context: Arc<Context>) -> Action {
    error!("Reconciliation error for DCopsConfig {}: {}", config.name_any(), error);
    Action::requeue(ERROR_REQUEUE)
}
