//! # Controller Tests
//!
//! Sync loops and sync controllers running against the in-memory store.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use manila_csi_driver_operator::catalog::DesiredObject;
use manila_csi_driver_operator::controller::management::operator_resource;
use manila_csi_driver_operator::controller::{
    ConfigMapSyncController, ManagementGate, ManifestController, ManifestSet, ResourceLocation,
    Runnable, SecretSyncController, StatusReporter, SyncController, SyncLoop,
};
use manila_csi_driver_operator::crd::{
    ManagementState, ManilaDriver, ManilaDriverSpec, ManilaDriverStatus, CONDITION_FALSE,
    CONDITION_TRUE,
};
use manila_csi_driver_operator::reconciler::ObjectReconciler;
use manila_csi_driver_operator::store::memory::StoreOp;
use manila_csi_driver_operator::store::{InMemoryStore, ObjectIdentity};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const CLOUDS_YAML: &str = r"
clouds:
  openstack:
    auth:
      auth_url: https://keystone.example.com:13000/v3
      username: manila
      password: s3cret
      project_name: shift
      user_domain_name: Default
    region_name: regionOne
";

fn seed<K>(store: &InMemoryStore, resource: &K) -> ObjectIdentity
where
    K: kube::Resource<DynamicType = ()> + serde::Serialize,
{
    let desired = DesiredObject::from_typed(resource).unwrap();
    store.insert(desired.identity(), desired.object().clone());
    desired.identity().clone()
}

fn seed_operator_resource(store: &InMemoryStore, state: ManagementState) {
    seed(
        store,
        &ManilaDriver::new(
            "cluster",
            ManilaDriverSpec {
                management_state: state,
            },
        ),
    );
}

fn seed_credentials(store: &InMemoryStore, clouds_yaml: &str) {
    seed(
        store,
        &Secret {
            metadata: ObjectMeta {
                name: Some("manila-cloud-credentials".to_string()),
                namespace: Some(common::NAMESPACE.to_string()),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                "clouds.yaml".to_string(),
                ByteString(clouds_yaml.as_bytes().to_vec()),
            )])),
            ..Secret::default()
        },
    );
}

fn cloud_config(namespace: &str, ca_bundle: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some("cloud-provider-config".to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([
            (
                "config".to_string(),
                "[Global]\nsecret-name = openstack-credentials\n".to_string(),
            ),
            ("ca-bundle.pem".to_string(), ca_bundle.to_string()),
        ])),
        ..ConfigMap::default()
    }
}

fn typed<K>(store: &InMemoryStore, id: &ObjectIdentity) -> Option<K>
where
    K: serde::de::DeserializeOwned,
{
    store
        .object(id)
        .map(|object| serde_json::from_value(serde_json::to_value(object).unwrap()).unwrap())
}

async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

fn static_resources_loop(store: &Arc<InMemoryStore>) -> SyncLoop {
    let controller = ManifestController::new(
        ManifestSet::StaticResources,
        common::catalog(),
        ObjectReconciler::new(store.clone()),
    );
    SyncLoop::new(Arc::new(controller)).with_resync_interval(Duration::from_secs(3600))
}

mod sync_loop {
    use super::*;

    #[tokio::test]
    async fn test_first_pass_applies_every_object_and_cancel_stops_loop() {
        let store = Arc::new(InMemoryStore::new());
        let expected = common::catalog().static_resources().unwrap().len();
        let sync_loop = static_resources_loop(&store);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { sync_loop.run(cancel).await }
        });
        wait_until(|| store.snapshot().len() == expected).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sync loop stops on cancellation")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_trigger_runs_an_extra_pass_that_repairs_drift() {
        let store = Arc::new(InMemoryStore::new());
        let expected = common::catalog().static_resources().unwrap().len();
        let sync_loop = static_resources_loop(&store);
        let trigger = sync_loop.trigger();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { sync_loop.run(cancel).await }
        });
        wait_until(|| store.snapshot().len() == expected).await;

        // Someone flips a managed field on the CSIDriver
        let id = common::catalog()
            .static_resources()
            .unwrap()
            .into_iter()
            .find(|object| object.identity().kind() == "CSIDriver")
            .expect("CSIDriver is a static resource")
            .identity()
            .clone();
        let mut drifted = store.object(&id).unwrap();
        drifted.data["spec"]["podInfoOnMount"] = json!(true);
        store.insert(&id, drifted);
        store.clear_calls();

        trigger.notify_one();
        wait_until(|| {
            store
                .object(&id)
                .is_some_and(|o| o.data["spec"]["podInfoOnMount"] == json!(false))
        })
        .await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        let updates: Vec<_> = store
            .mutations()
            .into_iter()
            .filter(|call| call.op == StoreOp::Update)
            .collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].key, id.object_key());
    }
}

mod management {
    use super::*;

    #[tokio::test]
    async fn test_unmanaged_skips_reconciliation_and_reports_paused() {
        let store = Arc::new(InMemoryStore::new());
        seed_operator_resource(&store, ManagementState::Unmanaged);
        let status = Arc::new(StatusReporter::new(store.clone()));
        let sync_loop = static_resources_loop(&store)
            .with_gate(ManagementGate::new(store.clone()))
            .with_status(Arc::clone(&status));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { sync_loop.run(cancel).await }
        });
        wait_until(|| {
            store
                .calls()
                .iter()
                .any(|call| call.op == StoreOp::PatchStatus)
        })
        .await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        // Only the operator resource itself is in the store
        assert_eq!(store.snapshot().len(), 1);
        assert!(store
            .mutations()
            .iter()
            .all(|call| call.op == StoreOp::PatchStatus));

        let conditions = status.conditions().await;
        let available = conditions
            .iter()
            .find(|c| c.r#type == "ManilaDriverStaticResourcesAvailable")
            .unwrap();
        assert_eq!(available.status, CONDITION_FALSE);
        assert_eq!(available.reason.as_deref(), Some("Paused"));

        let published: ManilaDriver = typed(&store, &operator_resource()).unwrap();
        let published: ManilaDriverStatus = published.status.unwrap();
        assert_eq!(published.conditions, conditions);
    }

    #[tokio::test]
    async fn test_removed_is_reported_degraded() {
        let store = Arc::new(InMemoryStore::new());
        seed_operator_resource(&store, ManagementState::Removed);
        let gate = ManagementGate::new(store.clone());
        assert_eq!(gate.state().await.unwrap(), ManagementState::Removed);

        let status = StatusReporter::new(store.clone());
        status
            .report(
                "ManilaDriverController",
                &manila_csi_driver_operator::controller::PassOutcome::Paused(
                    ManagementState::Removed,
                ),
            )
            .await;

        let conditions = status.conditions().await;
        let degraded = conditions
            .iter()
            .find(|c| c.r#type == "ManilaDriverControllerDegraded")
            .unwrap();
        assert_eq!(degraded.status, CONDITION_TRUE);
        assert_eq!(degraded.reason.as_deref(), Some("Unsupported"));
    }

    #[tokio::test]
    async fn test_missing_operator_resource_means_managed() {
        let store = Arc::new(InMemoryStore::new());
        let gate = ManagementGate::new(store.clone());

        assert_eq!(gate.state().await.unwrap(), ManagementState::Managed);
    }

    #[tokio::test]
    async fn test_status_is_published_once_the_resource_appears() {
        let store = Arc::new(InMemoryStore::new());
        let status = StatusReporter::new(store.clone());
        let outcome = manila_csi_driver_operator::controller::PassOutcome::Succeeded;

        status.report("SecretSync", &outcome).await;
        assert!(store.mutations().is_empty());

        seed_operator_resource(&store, ManagementState::Managed);
        status.report("SecretSync", &outcome).await;

        let published: ManilaDriver = typed(&store, &operator_resource()).unwrap();
        let types: Vec<String> = published
            .status
            .unwrap()
            .conditions
            .into_iter()
            .map(|c| c.r#type)
            .collect();
        assert_eq!(types, vec!["SecretSyncAvailable", "SecretSyncDegraded"]);
    }
}

mod secret_sync {
    use super::*;

    fn driver_secret_id() -> ObjectIdentity {
        ObjectIdentity::of::<Secret>(Some(common::NAMESPACE), "csi-manila-secrets")
    }

    #[tokio::test]
    async fn test_credentials_are_translated_into_driver_secret() {
        let store = Arc::new(InMemoryStore::new());
        seed_credentials(&store, CLOUDS_YAML);
        let controller =
            SecretSyncController::new(common::NAMESPACE, ObjectReconciler::new(store.clone()));

        controller.sync().await.unwrap();

        let secret: Secret = typed(&store, &driver_secret_id()).unwrap();
        let data = secret.data.unwrap();
        let value = |key: &str| String::from_utf8(data[key].0.clone()).unwrap();
        assert_eq!(value("os-authURL"), "https://keystone.example.com:13000/v3");
        assert_eq!(value("os-userName"), "manila");
        assert_eq!(value("os-password"), "s3cret");
        assert_eq!(value("os-projectName"), "shift");
        assert_eq!(value("os-region"), "regionOne");
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));

        store.clear_calls();
        controller.sync().await.unwrap();
        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_rotated_password_updates_driver_secret() {
        let store = Arc::new(InMemoryStore::new());
        seed_credentials(&store, CLOUDS_YAML);
        let controller =
            SecretSyncController::new(common::NAMESPACE, ObjectReconciler::new(store.clone()));
        controller.sync().await.unwrap();

        seed_credentials(&store, &CLOUDS_YAML.replace("s3cret", "r0tated"));
        controller.sync().await.unwrap();

        let secret: Secret = typed(&store, &driver_secret_id()).unwrap();
        assert_eq!(secret.data.unwrap()["os-password"].0, b"r0tated".to_vec());
    }

    #[tokio::test]
    async fn test_switch_to_application_credentials_drops_password_keys() {
        let store = Arc::new(InMemoryStore::new());
        seed_credentials(&store, CLOUDS_YAML);
        let controller =
            SecretSyncController::new(common::NAMESPACE, ObjectReconciler::new(store.clone()));
        controller.sync().await.unwrap();

        seed_credentials(
            &store,
            r"
clouds:
  openstack:
    auth:
      auth_url: https://keystone.example.com:13000/v3
      application_credential_id: ac-1
      application_credential_secret: ac-secret
    region_name: regionOne
",
        );
        controller.sync().await.unwrap();

        let secret: Secret = typed(&store, &driver_secret_id()).unwrap();
        let keys: Vec<String> = secret.data.unwrap().into_keys().collect();
        assert_eq!(
            keys,
            vec![
                "os-applicationCredentialID",
                "os-applicationCredentialSecret",
                "os-authURL",
                "os-region",
            ]
        );

        store.clear_calls();
        controller.sync().await.unwrap();
        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials_wait_without_error() {
        let store = Arc::new(InMemoryStore::new());
        let controller =
            SecretSyncController::new(common::NAMESPACE, ObjectReconciler::new(store.clone()));

        controller.sync().await.unwrap();

        assert!(store.mutations().is_empty());
        assert!(store.object(&driver_secret_id()).is_none());
    }

    #[tokio::test]
    async fn test_unusable_credentials_fail_the_pass() {
        let store = Arc::new(InMemoryStore::new());
        seed_credentials(&store, "clouds:\n  other: {}\n");
        let controller =
            SecretSyncController::new(common::NAMESPACE, ObjectReconciler::new(store.clone()));

        let err = controller.sync().await.unwrap_err();

        assert!(format!("{err:#}").contains("no cloud named openstack"));
        assert!(store.mutations().is_empty());
    }
}

mod cloud_config_sync {
    use super::*;

    fn controller(store: &Arc<InMemoryStore>) -> ConfigMapSyncController {
        ConfigMapSyncController::new(
            ResourceLocation::new("openshift-config", "cloud-provider-config"),
            ResourceLocation::new(common::NAMESPACE, "cloud-provider-config"),
            ObjectReconciler::new(store.clone()),
        )
    }

    fn destination() -> ObjectIdentity {
        ObjectIdentity::of::<ConfigMap>(Some(common::NAMESPACE), "cloud-provider-config")
    }

    #[tokio::test]
    async fn test_config_map_is_mirrored_and_follows_source() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, &cloud_config("openshift-config", "-----BEGIN CERTIFICATE-----a"));
        let controller = controller(&store);

        controller.sync().await.unwrap();
        let mirrored: ConfigMap = typed(&store, &destination()).unwrap();
        assert_eq!(
            mirrored.data,
            cloud_config(common::NAMESPACE, "-----BEGIN CERTIFICATE-----a").data
        );

        seed(&store, &cloud_config("openshift-config", "-----BEGIN CERTIFICATE-----b"));
        controller.sync().await.unwrap();
        let mirrored: ConfigMap = typed(&store, &destination()).unwrap();
        assert_eq!(
            mirrored.data.unwrap()["ca-bundle.pem"],
            "-----BEGIN CERTIFICATE-----b"
        );
    }

    #[tokio::test]
    async fn test_missing_source_is_skipped() {
        let store = Arc::new(InMemoryStore::new());

        controller(&store).sync().await.unwrap();

        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_keys_missing_from_source_are_removed_from_destination() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, &cloud_config("openshift-config", "ca"));
        let controller = controller(&store);
        controller.sync().await.unwrap();

        let mut existing = store.object(&destination()).unwrap();
        existing.data["data"]["injected-by-admin"] = json!("drop me");
        existing.data["immutable"] = json!(false);
        store.insert(&destination(), existing);
        store.clear_calls();

        controller.sync().await.unwrap();

        assert_eq!(
            store.mutations().iter().map(|call| call.op).collect::<Vec<_>>(),
            vec![StoreOp::Update]
        );
        let mirrored = store.object(&destination()).unwrap();
        assert!(mirrored.data["data"].get("injected-by-admin").is_none());
        assert_eq!(mirrored.data["immutable"], json!(false));

        store.clear_calls();
        controller.sync().await.unwrap();
        assert!(store.mutations().is_empty());
    }
}
