//! # Controller Wiring
//!
//! Builds one sync loop per controller and the informers that wake them.

use std::fmt::Debug;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::api::storage::v1::CSIDriver;
use kube::api::DynamicObject;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use tokio::sync::Notify;

use crate::catalog::{credentials_request_resource, Catalog};
use crate::config::OperatorConfig;
use crate::constants::{CREDENTIALS_REQUEST_NAMESPACE, CSI_DRIVER_NAME};
use crate::controller::{
    ConfigMapSyncController, EventSource, KubeInformer, ManagementGate, ManifestController,
    ManifestSet, ResourceLocation, Runnable, SecretSyncController, StatusReporter,
    SyncController, SyncLoop,
};
use crate::crd::ManilaDriver;
use crate::reconciler::ObjectReconciler;

/// Every sync loop the operator runs
#[derive(Debug)]
pub struct ControllerSet {
    pub static_resources: SyncLoop,
    pub driver: SyncLoop,
    pub nfs_driver: SyncLoop,
    pub credentials: SyncLoop,
    pub secret_sync: SyncLoop,
    pub cloud_config: SyncLoop,
}

impl ControllerSet {
    /// Build the loops sharing one reconciler, gate and status reporter
    #[must_use]
    pub fn new(
        config: &OperatorConfig,
        catalog: &Catalog,
        reconciler: &ObjectReconciler,
        gate: &ManagementGate,
        status: &Arc<StatusReporter>,
    ) -> Self {
        let wrap = |controller: Arc<dyn SyncController>| {
            SyncLoop::new(controller)
                .with_config(config)
                .with_gate(gate.clone())
                .with_status(Arc::clone(status))
        };
        let manifests = |set: ManifestSet| {
            wrap(Arc::new(ManifestController::new(
                set,
                catalog.clone(),
                reconciler.clone(),
            )))
        };

        Self {
            static_resources: manifests(ManifestSet::StaticResources),
            driver: manifests(ManifestSet::Driver),
            nfs_driver: manifests(ManifestSet::NfsDriver),
            credentials: manifests(ManifestSet::Credentials),
            secret_sync: wrap(Arc::new(SecretSyncController::new(
                &config.operand_namespace,
                reconciler.clone(),
            ))),
            cloud_config: wrap(Arc::new(ConfigMapSyncController::new(
                ResourceLocation::new(&config.cloud_config_namespace, &config.cloud_config_name),
                ResourceLocation::new(&config.operand_namespace, &config.cloud_config_name),
                reconciler.clone(),
            ))),
        }
    }

    fn loops(&self) -> [&SyncLoop; 6] {
        [
            &self.static_resources,
            &self.driver,
            &self.nfs_driver,
            &self.credentials,
            &self.secret_sync,
            &self.cloud_config,
        ]
    }

    /// Loops woken by a change to a resource of the given plural name
    fn interested(&self, plural: &str) -> Vec<Arc<Notify>> {
        match plural {
            "daemonsets" => vec![self.driver.trigger(), self.nfs_driver.trigger()],
            "deployments" => vec![self.driver.trigger()],
            "secrets" => vec![self.secret_sync.trigger()],
            "configmaps" => vec![self.cloud_config.trigger()],
            "namespaces" | "serviceaccounts" | "roles" | "rolebindings" | "clusterroles"
            | "clusterrolebindings" | "csidrivers" => vec![self.static_resources.trigger()],
            "credentialsrequests" => vec![self.credentials.trigger()],
            "maniladrivers" => self.loops().into_iter().map(SyncLoop::trigger).collect(),
            _ => Vec::new(),
        }
    }

    fn watch<K>(&self, informer: KubeInformer<K>) -> Arc<dyn EventSource>
    where
        K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    {
        let informer = self
            .interested(informer.plural())
            .into_iter()
            .fold(informer, KubeInformer::notify);
        Arc::new(informer)
    }

    /// Informers waking the loops that depend on each watched resource
    #[must_use]
    pub fn informers(
        &self,
        client: &Client,
        config: &OperatorConfig,
    ) -> Vec<Arc<dyn EventSource>> {
        let namespace = config.operand_namespace.as_str();

        vec![
            self.watch(KubeInformer::<DaemonSet>::namespaced(client.clone(), namespace)),
            self.watch(KubeInformer::<Deployment>::namespaced(client.clone(), namespace)),
            self.watch(KubeInformer::<Secret>::namespaced(client.clone(), namespace)),
            self.watch(KubeInformer::<ConfigMap>::namespaced(client.clone(), namespace)),
            self.watch(
                KubeInformer::<ConfigMap>::namespaced(
                    client.clone(),
                    &config.cloud_config_namespace,
                )
                .with_field_selector(&format!("metadata.name={}", config.cloud_config_name)),
            ),
            self.watch(
                KubeInformer::<Namespace>::all(client.clone())
                    .with_field_selector(&format!("metadata.name={namespace}")),
            ),
            self.watch(KubeInformer::<ServiceAccount>::namespaced(client.clone(), namespace)),
            self.watch(KubeInformer::<Role>::namespaced(client.clone(), namespace)),
            self.watch(KubeInformer::<RoleBinding>::namespaced(client.clone(), namespace)),
            self.watch(KubeInformer::<ClusterRole>::all(client.clone())),
            self.watch(KubeInformer::<ClusterRoleBinding>::all(client.clone())),
            self.watch(
                KubeInformer::<CSIDriver>::all(client.clone())
                    .with_field_selector(&format!("metadata.name={CSI_DRIVER_NAME}")),
            ),
            self.watch(KubeInformer::<DynamicObject>::dynamic(
                client.clone(),
                &credentials_request_resource(),
                CREDENTIALS_REQUEST_NAMESPACE,
            )),
            self.watch(KubeInformer::<ManilaDriver>::all(client.clone())),
        ]
    }

    /// Hand the loops to the runner
    #[must_use]
    pub fn into_runnables(self) -> Vec<Arc<dyn Runnable>> {
        [
            self.static_resources,
            self.driver,
            self.nfs_driver,
            self.credentials,
            self.secret_sync,
            self.cloud_config,
        ]
        .into_iter()
        .map(|sync_loop| Arc::new(sync_loop) as Arc<dyn Runnable>)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetResolver, EmbeddedAssets};
    use crate::catalog::OperandNames;
    use crate::store::{InMemoryStore, ObjectStore};

    fn controller_set() -> ControllerSet {
        let config = OperatorConfig::default();
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryStore::new());
        let catalog = Catalog::new(
            OperandNames::new(&config.operand_namespace),
            AssetResolver::new(Arc::new(EmbeddedAssets)),
        );
        let reconciler = ObjectReconciler::new(Arc::clone(&store));
        let gate = ManagementGate::new(Arc::clone(&store));
        let status = Arc::new(StatusReporter::new(store));
        ControllerSet::new(&config, &catalog, &reconciler, &gate, &status)
    }

    fn wakes_only(triggers: &[Arc<Notify>], expected: &SyncLoop) -> bool {
        triggers.len() == 1 && Arc::ptr_eq(&triggers[0], &expected.trigger())
    }

    #[test]
    fn test_static_resource_kinds_wake_the_static_resources_loop() {
        let set = controller_set();

        for plural in [
            Namespace::plural(&()),
            ServiceAccount::plural(&()),
            Role::plural(&()),
            RoleBinding::plural(&()),
            ClusterRole::plural(&()),
            ClusterRoleBinding::plural(&()),
            CSIDriver::plural(&()),
        ] {
            assert!(
                wakes_only(&set.interested(&plural), &set.static_resources),
                "{plural}"
            );
        }
    }

    #[test]
    fn test_operand_kinds_wake_their_controllers() {
        let set = controller_set();

        assert!(wakes_only(
            &set.interested(&Secret::plural(&())),
            &set.secret_sync
        ));
        assert!(wakes_only(
            &set.interested(&ConfigMap::plural(&())),
            &set.cloud_config
        ));
        assert!(wakes_only(
            &set.interested(&Deployment::plural(&())),
            &set.driver
        ));
        assert!(wakes_only(
            &set.interested(&credentials_request_resource().plural),
            &set.credentials
        ));
        assert_eq!(set.interested(&DaemonSet::plural(&())).len(), 2);
        assert_eq!(set.interested(&ManilaDriver::plural(&())).len(), 6);
        assert!(set.interested("pods").is_empty());
    }

    #[test]
    fn test_one_runnable_per_controller() {
        let runnables = controller_set().into_runnables();
        let names: Vec<&str> = runnables.iter().map(|runnable| runnable.name()).collect();

        assert_eq!(
            names,
            vec![
                "ManilaDriverStaticResources",
                "ManilaDriverController",
                "NFSDriverController",
                "ManilaDriverCredentials",
                "SecretSync",
                "CloudConfigSync",
            ]
        );
    }
}
