//! # Desired-State Catalog
//!
//! The fixed, versioned set of objects the operator is responsible for.
//!
//! Objects come from two places:
//! - typed builders (controller plugin RBAC)
//! - embedded YAML manifests resolved through the asset override hook
//!
//! Every object is turned into a `DesiredObject` with a stable identity before
//! it reaches the reconciler.

mod labels;
pub mod rbac;

pub use labels::{
    OperandNames, PluginLabels, CONTROLLER_PLUGIN_LABELS, CONTROLLER_PLUGIN_NAME,
    NODE_PLUGIN_LABELS,
};

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::api::storage::v1::CSIDriver;
use kube::api::DynamicObject;
use kube::core::{ApiResource, GroupVersionKind, TypeMeta};
use kube::Resource;
use serde::Serialize;
use thiserror::Error;

use crate::assets::{AssetError, AssetResolver};
use crate::store::ObjectIdentity;

/// Bumped whenever the set of managed objects or their templates change
pub const CATALOG_VERSION: &str = "1";

/// Namespace, driver registration and node service account
pub const STATIC_PREREQUISITE_ASSETS: &[&str] =
    &["namespace.yaml", "csidriver.yaml", "node_sa.yaml"];

/// Cluster roles shipped as manifests
pub const STATIC_ROLE_ASSETS: &[&str] =
    &["rbac/snapshotter_role.yaml", "rbac/privileged_role.yaml"];

/// Bindings shipped as manifests
pub const STATIC_BINDING_ASSETS: &[&str] = &[
    "rbac/snapshotter_binding.yaml",
    "rbac/controller_privileged_binding.yaml",
    "rbac/node_privileged_binding.yaml",
];

/// Controller plugin Deployment and node plugin DaemonSet
pub const DRIVER_ASSETS: &[&str] = &["controller.yaml", "node.yaml"];

/// NFS node plugin DaemonSet
pub const NFS_DRIVER_ASSETS: &[&str] = &["node_nfs.yaml"];

/// CredentialsRequest handled by the cloud credential operator
pub const CREDENTIALS_ASSETS: &[&str] = &["credentials.yaml"];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("Failed to parse manifest {asset}: {source}")]
    Parse {
        asset: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Manifest {asset} has no apiVersion/kind")]
    MissingType { asset: String },
    #[error("Unknown kind {kind} ({api_version}) in manifest {asset}")]
    UnknownKind {
        asset: String,
        api_version: String,
        kind: String,
    },
    #[error("{kind} object has no metadata.name")]
    MissingName { kind: String },
    #[error("Failed to convert {kind} object: {source}")]
    Serialization {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One object the operator is responsible for
///
/// Immutable once built: the identity is derived from the object itself.
#[derive(Debug, Clone)]
pub struct DesiredObject {
    identity: ObjectIdentity,
    object: DynamicObject,
}

impl DesiredObject {
    /// Build from a typed k8s-openapi object
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the object has no name or fails to serialize.
    pub fn from_typed<K>(resource: &K) -> Result<Self, CatalogError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let kind = K::kind(&()).to_string();
        let value =
            serde_json::to_value(resource).map_err(|source| CatalogError::Serialization {
                kind: kind.clone(),
                source,
            })?;
        let object: DynamicObject = serde_json::from_value(value)
            .map_err(|source| CatalogError::Serialization { kind, source })?;
        Self::new(ApiResource::erase::<K>(&()), object)
    }

    /// Parse one YAML manifest
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the manifest does not parse, names an unknown
    /// kind or has no name.
    pub fn from_manifest(asset: &str, bytes: &[u8]) -> Result<Self, CatalogError> {
        let object: DynamicObject =
            serde_yaml::from_slice(bytes).map_err(|source| CatalogError::Parse {
                asset: asset.to_string(),
                source,
            })?;
        let Some(types) = object.types.as_ref() else {
            return Err(CatalogError::MissingType {
                asset: asset.to_string(),
            });
        };
        let resource = resource_for(types).ok_or_else(|| CatalogError::UnknownKind {
            asset: asset.to_string(),
            api_version: types.api_version.clone(),
            kind: types.kind.clone(),
        })?;
        Self::new(resource, object)
    }

    fn new(resource: ApiResource, mut object: DynamicObject) -> Result<Self, CatalogError> {
        let Some(name) = object.metadata.name.clone() else {
            return Err(CatalogError::MissingName {
                kind: resource.kind.clone(),
            });
        };
        if object.types.is_none() {
            object.types = Some(TypeMeta {
                api_version: resource.api_version.clone(),
                kind: resource.kind.clone(),
            });
        }
        let identity =
            ObjectIdentity::new(resource, object.metadata.namespace.as_deref(), &name);
        Ok(Self { identity, object })
    }

    #[must_use]
    pub fn identity(&self) -> &ObjectIdentity {
        &self.identity
    }

    #[must_use]
    pub fn object(&self) -> &DynamicObject {
        &self.object
    }
}

/// `CredentialsRequest` has no Rust type; it is handled as a dynamic object
#[must_use]
pub fn credentials_request_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("cloudcredential.openshift.io", "v1", "CredentialsRequest"),
        "credentialsrequests",
    )
}

/// API resource for the kinds the catalog knows how to manage
#[must_use]
pub fn resource_for(types: &TypeMeta) -> Option<ApiResource> {
    let resource = match (types.api_version.as_str(), types.kind.as_str()) {
        ("v1", "Namespace") => ApiResource::erase::<Namespace>(&()),
        ("v1", "ServiceAccount") => ApiResource::erase::<ServiceAccount>(&()),
        ("v1", "ConfigMap") => ApiResource::erase::<ConfigMap>(&()),
        ("v1", "Secret") => ApiResource::erase::<Secret>(&()),
        ("rbac.authorization.k8s.io/v1", "ClusterRole") => ApiResource::erase::<ClusterRole>(&()),
        ("rbac.authorization.k8s.io/v1", "ClusterRoleBinding") => {
            ApiResource::erase::<ClusterRoleBinding>(&())
        }
        ("rbac.authorization.k8s.io/v1", "Role") => ApiResource::erase::<Role>(&()),
        ("rbac.authorization.k8s.io/v1", "RoleBinding") => ApiResource::erase::<RoleBinding>(&()),
        ("storage.k8s.io/v1", "CSIDriver") => ApiResource::erase::<CSIDriver>(&()),
        ("apps/v1", "DaemonSet") => ApiResource::erase::<DaemonSet>(&()),
        ("apps/v1", "Deployment") => ApiResource::erase::<Deployment>(&()),
        ("cloudcredential.openshift.io/v1", "CredentialsRequest") => {
            credentials_request_resource()
        }
        _ => return None,
    };
    Some(resource)
}

/// Builds the desired objects of every controller
#[derive(Debug, Clone)]
pub struct Catalog {
    names: OperandNames,
    assets: AssetResolver,
}

impl Catalog {
    #[must_use]
    pub fn new(names: OperandNames, assets: AssetResolver) -> Self {
        Self { names, assets }
    }

    #[must_use]
    pub fn names(&self) -> &OperandNames {
        &self.names
    }

    #[must_use]
    pub fn version(&self) -> &'static str {
        CATALOG_VERSION
    }

    /// Namespace, CSIDriver, service accounts, roles and bindings
    ///
    /// Ordered so every namespace and service account precedes the objects
    /// that reference it.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if an asset is missing or malformed.
    pub fn static_resources(&self) -> Result<Vec<DesiredObject>, CatalogError> {
        let names = &self.names;
        let mut objects = self.manifests(STATIC_PREREQUISITE_ASSETS)?;
        objects.push(DesiredObject::from_typed(&rbac::controller_service_account(names))?);
        objects.push(DesiredObject::from_typed(&rbac::controller_cluster_role(names))?);
        objects.push(DesiredObject::from_typed(&rbac::controller_role(names))?);
        objects.extend(self.manifests(STATIC_ROLE_ASSETS)?);
        objects.extend(self.manifests(STATIC_BINDING_ASSETS)?);
        objects.push(DesiredObject::from_typed(
            &rbac::controller_cluster_role_binding(names),
        )?);
        objects.push(DesiredObject::from_typed(&rbac::controller_role_binding(names))?);
        Ok(objects)
    }

    /// # Errors
    ///
    /// Returns `CatalogError` if an asset is missing or malformed.
    pub fn driver_manifests(&self) -> Result<Vec<DesiredObject>, CatalogError> {
        self.manifests(DRIVER_ASSETS)
    }

    /// # Errors
    ///
    /// Returns `CatalogError` if an asset is missing or malformed.
    pub fn nfs_driver_manifests(&self) -> Result<Vec<DesiredObject>, CatalogError> {
        self.manifests(NFS_DRIVER_ASSETS)
    }

    /// # Errors
    ///
    /// Returns `CatalogError` if an asset is missing or malformed.
    pub fn credentials_manifests(&self) -> Result<Vec<DesiredObject>, CatalogError> {
        self.manifests(CREDENTIALS_ASSETS)
    }

    /// Resolve and parse `assets` in order
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if an asset is missing or malformed.
    pub fn manifests(&self, assets: &[&str]) -> Result<Vec<DesiredObject>, CatalogError> {
        assets
            .iter()
            .map(|asset| {
                let bytes = self.assets.resolve_asset(asset)?;
                DesiredObject::from_manifest(asset, &bytes)
            })
            .collect()
    }
}
