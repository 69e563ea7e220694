//! Shared fixtures for the integration tests

#![allow(dead_code, reason = "not every test binary uses every fixture")]

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::api::DynamicObject;
use manila_csi_driver_operator::assets::{AssetResolver, EmbeddedAssets};
use manila_csi_driver_operator::catalog::{Catalog, OperandNames};

pub const NAMESPACE: &str = "openshift-manila-csi-driver";

/// Catalog over the embedded manifests with every image pinned
pub fn catalog() -> Catalog {
    let assets = AssetResolver::new(Arc::new(EmbeddedAssets))
        .with_override("OPERAND_NAMESPACE", NAMESPACE)
        .with_override("DRIVER_IMAGE", "registry.example.com/manila-csi-plugin:v1")
        .with_override("NFS_DRIVER_IMAGE", "registry.example.com/nfs-csi-plugin:v1")
        .with_override("PROVISIONER_IMAGE", "registry.example.com/csi-provisioner:v1")
        .with_override("SNAPSHOTTER_IMAGE", "registry.example.com/csi-snapshotter:v1")
        .with_override(
            "NODE_DRIVER_REGISTRAR_IMAGE",
            "registry.example.com/csi-node-driver-registrar:v1",
        )
        .with_override("LIVENESS_PROBE_IMAGE", "registry.example.com/livenessprobe:v1");
    Catalog::new(OperandNames::new(NAMESPACE), assets)
}

/// Stored objects with server-assigned metadata removed
pub fn normalized(objects: BTreeMap<String, DynamicObject>) -> BTreeMap<String, serde_json::Value> {
    objects
        .into_iter()
        .map(|(key, mut object)| {
            object.metadata.uid = None;
            object.metadata.resource_version = None;
            object.metadata.generation = None;
            let value = serde_json::to_value(&object).expect("stored object serializes");
            (key, value)
        })
        .collect()
}
