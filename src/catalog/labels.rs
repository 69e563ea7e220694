//! Fixed names and labels of the operand's objects.

use std::collections::BTreeMap;

/// Name shared by every controller plugin RBAC object
pub const CONTROLLER_PLUGIN_NAME: &str = "openstack-manila-csi-controllerplugin";

/// Labels identifying one plugin of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginLabels {
    pub app: &'static str,
    pub component: &'static str,
}

pub const CONTROLLER_PLUGIN_LABELS: PluginLabels = PluginLabels {
    app: "openstack-manila-csi",
    component: "controllerplugin",
};

pub const NODE_PLUGIN_LABELS: PluginLabels = PluginLabels {
    app: "openstack-manila-csi",
    component: "nodeplugin",
};

impl PluginLabels {
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app".to_string(), self.app.to_string()),
            ("component".to_string(), self.component.to_string()),
        ])
    }
}

/// Where the operand lives and what its objects are called
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandNames {
    pub namespace: String,
    pub controller_plugin: &'static str,
    pub controller_plugin_labels: PluginLabels,
}

impl OperandNames {
    #[must_use]
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            controller_plugin: CONTROLLER_PLUGIN_NAME,
            controller_plugin_labels: CONTROLLER_PLUGIN_LABELS,
        }
    }
}
