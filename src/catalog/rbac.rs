//! Controller plugin RBAC built in code.
//!
//! The controller plugin runs under its own service account bound to a cluster
//! role (volumes, snapshots, events) and to a namespaced role (leader election).

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use kube::api::ObjectMeta;

use super::OperandNames;

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

fn rule(api_group: &str, resource: &str, verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![api_group.to_string()]),
        resources: Some(vec![resource.to_string()]),
        verbs: verbs.iter().map(|verb| (*verb).to_string()).collect(),
        ..PolicyRule::default()
    }
}

fn metadata(names: &OperandNames, namespaced: bool) -> ObjectMeta {
    ObjectMeta {
        name: Some(names.controller_plugin.to_string()),
        namespace: namespaced.then(|| names.namespace.clone()),
        labels: Some(names.controller_plugin_labels.to_map()),
        ..ObjectMeta::default()
    }
}

fn service_account_subject(names: &OperandNames) -> Subject {
    Subject {
        kind: "ServiceAccount".to_string(),
        name: names.controller_plugin.to_string(),
        namespace: Some(names.namespace.clone()),
        ..Subject::default()
    }
}

#[must_use]
pub fn controller_service_account(names: &OperandNames) -> ServiceAccount {
    ServiceAccount {
        metadata: metadata(names, true),
        ..ServiceAccount::default()
    }
}

#[must_use]
pub fn controller_cluster_role(names: &OperandNames) -> ClusterRole {
    ClusterRole {
        metadata: metadata(names, false),
        rules: Some(vec![
            rule("", "nodes", &["get", "list", "watch"]),
            rule("", "secrets", &["get", "list"]),
            rule(
                "",
                "persistentvolumes",
                &["get", "list", "watch", "create", "delete"],
            ),
            rule(
                "",
                "persistentvolumeclaims",
                &["get", "list", "watch", "update"],
            ),
            rule(
                "",
                "events",
                &["list", "watch", "create", "update", "patch"],
            ),
            rule("storage.k8s.io", "storageclasses", &["get", "list", "watch"]),
            rule("storage.k8s.io", "csinodes", &["get", "list", "watch"]),
            rule(
                "snapshot.storage.k8s.io",
                "volumesnapshotclasses",
                &["get", "list", "watch"],
            ),
            rule(
                "snapshot.storage.k8s.io",
                "volumesnapshotcontents",
                &["create", "get", "list", "watch", "update", "delete"],
            ),
            rule(
                "snapshot.storage.k8s.io",
                "volumesnapshots",
                &["get", "list", "watch", "update"],
            ),
            rule(
                "snapshot.storage.k8s.io",
                "volumesnapshots/status",
                &["update"],
            ),
            rule(
                "apiextensions.k8s.io",
                "customresourcedefinitions",
                &["create", "list", "watch", "delete", "get", "update"],
            ),
        ]),
        ..ClusterRole::default()
    }
}

#[must_use]
pub fn controller_cluster_role_binding(names: &OperandNames) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: metadata(names, false),
        subjects: Some(vec![service_account_subject(names)]),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: names.controller_plugin.to_string(),
        },
    }
}

#[must_use]
pub fn controller_role(names: &OperandNames) -> Role {
    Role {
        metadata: metadata(names, true),
        rules: Some(vec![
            rule(
                "",
                "endpoints",
                &["get", "watch", "list", "delete", "update", "create"],
            ),
            rule(
                "",
                "configmaps",
                &["get", "list", "watch", "create", "delete"],
            ),
        ]),
    }
}

#[must_use]
pub fn controller_role_binding(names: &OperandNames) -> RoleBinding {
    RoleBinding {
        metadata: metadata(names, true),
        subjects: Some(vec![service_account_subject(names)]),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: names.controller_plugin.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_reference_the_controller_service_account() {
        let names = OperandNames::new("manila");
        let crb = controller_cluster_role_binding(&names);
        let rb = controller_role_binding(&names);

        for subjects in [crb.subjects.unwrap(), rb.subjects.unwrap()] {
            assert_eq!(subjects.len(), 1);
            assert_eq!(subjects[0].name, "openstack-manila-csi-controllerplugin");
            assert_eq!(subjects[0].namespace.as_deref(), Some("manila"));
        }
        assert_eq!(crb.role_ref.kind, "ClusterRole");
        assert_eq!(rb.role_ref.kind, "Role");
    }

    #[test]
    fn test_cluster_scoped_objects_have_no_namespace() {
        let names = OperandNames::new("manila");
        assert!(controller_cluster_role(&names).metadata.namespace.is_none());
        assert!(controller_cluster_role_binding(&names)
            .metadata
            .namespace
            .is_none());
        assert_eq!(
            controller_role(&names).metadata.namespace.as_deref(),
            Some("manila")
        );
    }

    #[test]
    fn test_objects_carry_controller_plugin_labels() {
        let names = OperandNames::new("manila");
        let labels = controller_service_account(&names).metadata.labels.unwrap();
        assert_eq!(labels["app"], "openstack-manila-csi");
        assert_eq!(labels["component"], "controllerplugin");
    }
}
