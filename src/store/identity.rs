//! # Object Identity
//!
//! Stable identity of a cluster object: API resource, namespace and name.

use std::fmt;

use kube::core::{ApiResource, GroupVersionKind};
use kube::Resource;

/// Identity of one cluster object
///
/// `namespace` is `None` for cluster-scoped resources.
#[derive(Debug, Clone)]
pub struct ObjectIdentity {
    pub resource: ApiResource,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectIdentity {
    #[must_use]
    pub fn new(resource: ApiResource, namespace: Option<&str>, name: &str) -> Self {
        Self {
            resource,
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Identity of a typed resource (k8s-openapi type or custom resource)
    #[must_use]
    pub fn of<K>(namespace: Option<&str>, name: &str) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self::new(ApiResource::erase::<K>(&()), namespace, name)
    }

    /// Identity of a resource known only by group/version/kind/plural
    #[must_use]
    pub fn from_gvk(
        gvk: &GroupVersionKind,
        plural: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Self {
        Self::new(
            ApiResource::from_gvk_with_plural(gvk, plural),
            namespace,
            name,
        )
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.resource.kind
    }

    /// Key shared by every object of the same resource kind
    #[must_use]
    pub fn kind_key(&self) -> String {
        format!("{}/{}", self.resource.api_version, self.resource.kind)
    }

    /// Key unique to this object
    #[must_use]
    pub fn object_key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.kind_key(),
            self.namespace.as_deref().unwrap_or(""),
            self.name
        )
    }
}

impl PartialEq for ObjectIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.object_key() == other.object_key()
    }
}

impl Eq for ObjectIdentity {}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{} {}/{}", self.resource.kind, namespace, self.name),
            None => write!(f, "{} {}", self.resource.kind, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ServiceAccount;
    use k8s_openapi::api::rbac::v1::ClusterRole;

    #[test]
    fn test_display_namespaced_and_cluster_scoped() {
        let sa = ObjectIdentity::of::<ServiceAccount>(Some("ns"), "sa");
        let cr = ObjectIdentity::of::<ClusterRole>(None, "cr");

        assert_eq!(sa.to_string(), "ServiceAccount ns/sa");
        assert_eq!(cr.to_string(), "ClusterRole cr");
        assert_eq!(cr.kind_key(), "rbac.authorization.k8s.io/v1/ClusterRole");
    }

    #[test]
    fn test_identity_equality_uses_kind_namespace_and_name() {
        let a = ObjectIdentity::of::<ServiceAccount>(Some("ns"), "sa");
        let b = ObjectIdentity::of::<ServiceAccount>(Some("ns"), "sa");
        let other_ns = ObjectIdentity::of::<ServiceAccount>(Some("other"), "sa");

        assert_eq!(a, b);
        assert_ne!(a, other_ns);
    }
}
