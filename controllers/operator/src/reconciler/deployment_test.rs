//! Unit tests for the self-deployment pipeline

#[cfg(test)]
mod tests {
    use crate::controllers_config::{CONTROLLERS_CONFIG_HASH_ANNOTATION, fingerprint};
    use crate::error::ControllerError;
    use crate::reconciler::additional_ca::{ADDITIONAL_CA_SECRET_NAME, CA_KEY};
    use crate::reconciler::capability::OPENSHIFT_MARKER_GROUP_VERSION;
    use crate::settings::OperatorSettings;
    use crate::test_utils::*;
    use cluster_client::{ApplyResult, ClusterError, MockClusterClient};
    use crds::{ControllerConfig, ControllersConfig, DCopsConfigSpec, SecretReference, SpecificControllerConfig};
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
    use k8s_openapi::api::apps::v1::Deployment;

    fn hash_annotation(deployment: &Deployment) -> Option<String> {
        deployment
            .spec
            .as_ref()?
            .template
            .metadata
            .as_ref()?
            .annotations
            .as_ref()?
            .get(CONTROLLERS_CONFIG_HASH_ANNOTATION)
            .cloned()
    }

    fn volume_names(deployment: &Deployment) -> Vec<String> {
        deployment
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .and_then(|p| p.volumes.as_ref())
            .map(|v| v.iter().map(|v| v.name.clone()).collect())
            .unwrap_or_default()
    }

    fn tuned_spec(concurrent: i32) -> DCopsConfigSpec {
        DCopsConfigSpec {
            controllers_config: Some(ControllersConfig {
                default: Some(ControllerConfig {
                    client_qps: Some(50),
                    ..Default::default()
                }),
                controllers: vec![SpecificControllerConfig {
                    name: "ip-claim".to_string(),
                    config: ControllerConfig {
                        concurrent_reconciles: Some(concurrent),
                        ..Default::default()
                    },
                }],
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_pass_applies_rbac_before_deployment() {
        let client = MockClusterClient::new();
        let reconciler = create_test_reconciler(&client, OperatorSettings::default());
        let config = create_test_config(DCopsConfigSpec::default());

        reconciler.reconcile_self_deployment(&config).await.unwrap();

        let applied = client.applied();
        assert!(applied.iter().all(|(_, _, result)| *result == ApplyResult::Created));
        let kinds: Vec<&str> = applied.iter().map(|(kind, _, _)| kind.as_str()).collect();
        assert_eq!(
            kinds,
            [
                "ConfigMap",
                "Service",
                "ServiceAccount",
                "ServiceAccount",
                "ConfigMap",
                "ClusterRole",
                "ClusterRole",
                "ClusterRoleBinding",
                "ClusterRoleBinding",
                "Deployment",
            ]
        );
        let deployment = stored_deployment(&client, "dcops");
        assert_eq!(deployment.metadata.namespace.as_deref(), Some("dcops"));
    }

    #[tokio::test]
    async fn test_second_pass_is_unchanged() {
        let client = MockClusterClient::new();
        insert_ca_secret(&client, "dcops", "corp-ca", Some("CORP"));
        let reconciler = create_test_reconciler(&client, OperatorSettings::default());
        let mut spec = tuned_spec(3);
        spec.additional_certificate_authorities_secret_ref = vec![SecretReference::new("corp-ca")];
        spec.maintenance_mode = Some(true);
        let config = create_test_config(spec);

        reconciler.reconcile_self_deployment(&config).await.unwrap();
        let first = stored_deployment(&client, "dcops");
        client.clear_logs();

        reconciler.reconcile_self_deployment(&config).await.unwrap();
        let applied = client.applied();
        assert!(!applied.is_empty());
        assert!(
            applied.iter().all(|(_, _, result)| *result == ApplyResult::Unchanged),
            "unexpected changes: {:?}",
            applied
        );
        assert_eq!(stored_deployment(&client, "dcops"), first);
    }

    #[tokio::test]
    async fn test_fingerprint_annotation_tracks_controllers_config() {
        let client = MockClusterClient::new();
        let reconciler = create_test_reconciler(&client, OperatorSettings::default());

        reconciler.reconcile_self_deployment(&create_test_config(tuned_spec(3))).await.unwrap();
        let config_map = stored_controllers_config(&client, "dcops");
        let data = config_map.data.unwrap();
        assert_eq!(data.get("CLIENT_QPS_DEFAULT").map(String::as_str), Some("50"));
        assert_eq!(data.get("CONCURRENT_RECONCILES_IP_CLAIM").map(String::as_str), Some("3"));
        let first = hash_annotation(&stored_deployment(&client, "dcops")).unwrap();
        assert_eq!(first, fingerprint(&data).unwrap());

        client.clear_logs();
        reconciler.reconcile_self_deployment(&create_test_config(tuned_spec(4))).await.unwrap();
        let second = hash_annotation(&stored_deployment(&client, "dcops")).unwrap();
        assert_ne!(first, second);
        assert!(client
            .applied()
            .iter()
            .any(|(kind, _, result)| kind == "Deployment" && *result == ApplyResult::Updated));
    }

    #[tokio::test]
    async fn test_maintenance_mode_wins_over_everything() {
        let client = MockClusterClient::new();
        let reconciler = create_test_reconciler(&client, OperatorSettings::default());
        let mut spec = tuned_spec(8);
        spec.maintenance_mode = Some(true);
        spec.log_level = Some("debug".to_string());
        spec.deprovisions_disabled = Some(true);

        reconciler.reconcile_self_deployment(&create_test_config(spec)).await.unwrap();
        let deployment = stored_deployment(&client, "dcops");
        assert_eq!(deployment.spec.and_then(|s| s.replicas), Some(0));
    }

    #[tokio::test]
    async fn test_target_namespace_is_used_everywhere() {
        let client = MockClusterClient::new();
        let reconciler = create_test_reconciler(&client, OperatorSettings::default());
        let config = create_test_config(DCopsConfigSpec {
            target_namespace: Some("infra".to_string()),
            ..Default::default()
        });

        reconciler.reconcile_self_deployment(&config).await.unwrap();
        stored_deployment(&client, "infra");
        stored_controllers_config(&client, "infra");
        let binding: ClusterRoleBinding = stored(&client, None, "dcops-controllers").unwrap();
        let subjects = binding.subjects.unwrap();
        assert_eq!(subjects[0].namespace.as_deref(), Some("infra"));
    }

    #[tokio::test]
    async fn test_applied_objects_are_owned_by_config() {
        let client = MockClusterClient::new();
        let reconciler = create_test_reconciler(&client, OperatorSettings::default());
        let config = create_test_config(DCopsConfigSpec::default());

        reconciler.reconcile_self_deployment(&config).await.unwrap();
        let deployment = stored_deployment(&client, "dcops");
        let owners = deployment.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(Some(owners[0].uid.clone()), config.metadata.uid);
        assert_eq!(owners[0].kind, "DCopsConfig");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[tokio::test]
    async fn test_config_without_uid_is_rejected() {
        let client = MockClusterClient::new();
        let reconciler = create_test_reconciler(&client, OperatorSettings::default());
        let mut config = create_test_config(DCopsConfigSpec::default());
        config.metadata.uid = None;

        let result = reconciler.reconcile_self_deployment(&config).await;
        assert!(matches!(result, Err(ControllerError::Reconciliation(_))));
        assert!(client.applied().is_empty());
    }

    #[tokio::test]
    async fn test_apply_failure_aborts_before_deployment() {
        let client = MockClusterClient::new();
        client.fail_apply("ClusterRole", "dcops-frontend");
        let reconciler = create_test_reconciler(&client, OperatorSettings::default());

        let result = reconciler
            .reconcile_self_deployment(&create_test_config(DCopsConfigSpec::default()))
            .await;
        assert!(matches!(result, Err(ControllerError::Cluster(ClusterError::Api(_)))));
        assert!(!client.applied().iter().any(|(kind, _, _)| kind == "Deployment"));
    }

    #[tokio::test]
    async fn test_openshift_assets_follow_capability() {
        let client = MockClusterClient::new();
        let reconciler = create_test_reconciler(&client, OperatorSettings::default());
        let config = create_test_config(DCopsConfigSpec::default());

        reconciler.reconcile_self_deployment(&config).await.unwrap();
        assert!(stored::<ClusterRole>(&client, None, "dcops-reader").is_none());

        client.add_group_version(OPENSHIFT_MARKER_GROUP_VERSION, &["deploymentconfigs"]);
        reconciler.reconcile_self_deployment(&config).await.unwrap();
        assert!(stored::<ClusterRole>(&client, None, "dcops-reader").is_some());
        assert!(stored::<ClusterRole>(&client, None, "dcops-cluster-admin").is_some());
        let binding: ClusterRoleBinding = stored(&client, None, "dcops-reader").unwrap();
        assert!(binding.subjects.unwrap().iter().all(|s| s.namespace.is_none()));
    }

    #[tokio::test]
    async fn test_discovery_failure_aborts_before_openshift_assets() {
        let client = MockClusterClient::new();
        client.fail_discovery("etcdserver: request timed out");
        let reconciler = create_test_reconciler(&client, OperatorSettings::default());

        let result = reconciler
            .reconcile_self_deployment(&create_test_config(DCopsConfigSpec::default()))
            .await;
        assert!(matches!(result, Err(ControllerError::Cluster(ClusterError::Api(_)))));
        let applied = client.applied();
        assert!(!applied.iter().any(|(_, name, _)| name == "dcops-reader" || name == "dcops-cluster-admin"));
        assert!(!applied.iter().any(|(kind, _, _)| kind == "Deployment"));
    }

    #[tokio::test]
    async fn test_additional_cas_are_concatenated_in_reference_order() {
        let client = MockClusterClient::new();
        insert_ca_secret(&client, "dcops", "second", Some("SECOND-CA"));
        insert_ca_secret(&client, "dcops", "first", Some("FIRST-CA"));
        insert_ca_secret(&client, "dcops", "no-key", None);
        let reconciler = create_test_reconciler(&client, OperatorSettings::default());
        let config = create_test_config(DCopsConfigSpec {
            additional_certificate_authorities_secret_ref: vec![
                SecretReference::new("first"),
                SecretReference::new("missing"),
                SecretReference::new("no-key"),
                SecretReference::new("second"),
            ],
            ..Default::default()
        });

        reconciler.reconcile_self_deployment(&config).await.unwrap();
        let secret: Secret = stored(&client, Some("dcops"), ADDITIONAL_CA_SECRET_NAME).unwrap();
        let bundle = secret.data.unwrap().remove(CA_KEY).unwrap();
        assert_eq!(bundle.0, b"FIRST-CA\nSECOND-CA\n".to_vec());

        let volumes = volume_names(&stored_deployment(&client, "dcops"));
        let ca_volume = volumes.iter().find(|name| name.starts_with("additionalca-")).unwrap();
        assert_eq!(ca_volume.len(), "additionalca-".len() + 20);
    }

    #[tokio::test]
    async fn test_additional_ca_volume_name_follows_content() {
        let client = MockClusterClient::new();
        insert_ca_secret(&client, "dcops", "corp-ca", Some("ONE"));
        let reconciler = create_test_reconciler(&client, OperatorSettings::default());
        let config = create_test_config(DCopsConfigSpec {
            additional_certificate_authorities_secret_ref: vec![SecretReference::new("corp-ca")],
            ..Default::default()
        });

        reconciler.reconcile_self_deployment(&config).await.unwrap();
        let first = volume_names(&stored_deployment(&client, "dcops"));
        reconciler.reconcile_self_deployment(&config).await.unwrap();
        assert_eq!(volume_names(&stored_deployment(&client, "dcops")), first);

        insert_ca_secret(&client, "dcops", "corp-ca", Some("TWO"));
        reconciler.reconcile_self_deployment(&config).await.unwrap();
        assert_ne!(volume_names(&stored_deployment(&client, "dcops")), first);
    }

    #[tokio::test]
    async fn test_no_usable_ca_removes_aggregate_secret() {
        let client = MockClusterClient::new();
        insert_ca_secret(&client, "dcops", ADDITIONAL_CA_SECRET_NAME, Some("STALE"));
        let reconciler = create_test_reconciler(&client, OperatorSettings::default());
        let config = create_test_config(DCopsConfigSpec {
            additional_certificate_authorities_secret_ref: vec![SecretReference::new("missing")],
            ..Default::default()
        });

        reconciler.reconcile_self_deployment(&config).await.unwrap();
        assert!(stored::<Secret>(&client, Some("dcops"), ADDITIONAL_CA_SECRET_NAME).is_none());
        assert!(client
            .deleted()
            .contains(&("Secret".to_string(), format!("dcops/{}", ADDITIONAL_CA_SECRET_NAME))));
        let volumes = volume_names(&stored_deployment(&client, "dcops"));
        assert!(!volumes.iter().any(|name| name.starts_with("additionalca-")));

        // Nothing left to delete; a second pass still succeeds.
        reconciler.reconcile_self_deployment(&config).await.unwrap();
    }
}
