//! # Cloud Config Sync
//!
//! Copies the cluster's cloud provider ConfigMap (it carries the OpenStack CA
//! bundle) into the operand namespace, where the driver mounts it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use tracing::info;

use crate::catalog::DesiredObject;
use crate::controller::runnable::SyncController;
use crate::reconciler::ObjectReconciler;
use crate::store::ObjectIdentity;

/// Location of a namespaced object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLocation {
    pub namespace: String,
    pub name: String,
}

impl ResourceLocation {
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// Mirrors one ConfigMap from `source` to `destination`
#[derive(Debug, Clone)]
pub struct ConfigMapSyncController {
    source: ResourceLocation,
    destination: ResourceLocation,
    reconciler: ObjectReconciler,
}

impl ConfigMapSyncController {
    #[must_use]
    pub fn new(
        source: ResourceLocation,
        destination: ResourceLocation,
        reconciler: ObjectReconciler,
    ) -> Self {
        Self {
            source,
            destination,
            reconciler,
        }
    }

    /// Destination ConfigMap carrying the source's data
    fn mirror(&self, source: ConfigMap) -> Result<DesiredObject> {
        let mirrored = ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.destination.name.clone()),
                namespace: Some(self.destination.namespace.clone()),
                ..ObjectMeta::default()
            },
            data: source.data,
            binary_data: source.binary_data,
            ..ConfigMap::default()
        };
        Ok(DesiredObject::from_typed(&mirrored)?)
    }
}

#[async_trait]
impl SyncController for ConfigMapSyncController {
    fn name(&self) -> &str {
        "CloudConfigSync"
    }

    async fn sync(&self) -> Result<()> {
        let source =
            ObjectIdentity::of::<ConfigMap>(Some(&self.source.namespace), &self.source.name);
        let Some(object) = self.reconciler.fetch(&source).await? else {
            info!(source = %source, "Source ConfigMap not found, nothing to sync");
            return Ok(());
        };
        let config_map: ConfigMap = serde_json::from_value(serde_json::to_value(&object)?)
            .with_context(|| format!("Malformed ConfigMap {source}"))?;

        let desired = self.mirror(config_map)?;
        self.reconciler.reconcile(&desired).await?;
        Ok(())
    }
}
