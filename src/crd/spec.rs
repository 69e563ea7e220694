//! # ManilaDriver Spec

use serde::{Deserialize, Serialize};

/// Operator configuration resource
///
/// A single instance named `cluster` is honoured.
///
/// # Example
///
/// ```yaml
/// apiVersion: csi.manila.openshift.io/v1alpha1
/// kind: ManilaDriver
/// metadata:
///   name: cluster
/// spec:
///   managementState: Managed
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "ManilaDriver",
    group = "csi.manila.openshift.io",
    version = "v1alpha1",
    status = "crate::crd::ManilaDriverStatus",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".spec.managementState"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManilaDriverSpec {
    /// Whether the operator manages the driver
    #[serde(default)]
    pub management_state: ManagementState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ManagementState {
    /// Reconcile every managed object
    #[default]
    Managed,
    /// Leave the operand alone
    Unmanaged,
    /// Uninstall the operand. Not supported by this operator.
    Removed,
}

impl std::fmt::Display for ManagementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Managed => write!(f, "Managed"),
            Self::Unmanaged => write!(f, "Unmanaged"),
            Self::Removed => write!(f, "Removed"),
        }
    }
}
