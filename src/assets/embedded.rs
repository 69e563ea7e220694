//! Manifests compiled into the binary.

use super::{AssetError, AssetSource};

const ASSETS: &[(&str, &[u8])] = &[
    ("namespace.yaml", include_bytes!("../../assets/namespace.yaml")),
    ("csidriver.yaml", include_bytes!("../../assets/csidriver.yaml")),
    ("node_sa.yaml", include_bytes!("../../assets/node_sa.yaml")),
    (
        "rbac/snapshotter_role.yaml",
        include_bytes!("../../assets/rbac/snapshotter_role.yaml"),
    ),
    (
        "rbac/snapshotter_binding.yaml",
        include_bytes!("../../assets/rbac/snapshotter_binding.yaml"),
    ),
    (
        "rbac/privileged_role.yaml",
        include_bytes!("../../assets/rbac/privileged_role.yaml"),
    ),
    (
        "rbac/controller_privileged_binding.yaml",
        include_bytes!("../../assets/rbac/controller_privileged_binding.yaml"),
    ),
    (
        "rbac/node_privileged_binding.yaml",
        include_bytes!("../../assets/rbac/node_privileged_binding.yaml"),
    ),
    ("controller.yaml", include_bytes!("../../assets/controller.yaml")),
    ("node.yaml", include_bytes!("../../assets/node.yaml")),
    ("node_nfs.yaml", include_bytes!("../../assets/node_nfs.yaml")),
    ("credentials.yaml", include_bytes!("../../assets/credentials.yaml")),
];

/// Asset source backed by the manifests under `assets/`
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedAssets;

impl EmbeddedAssets {
    /// Names of every embedded asset
    pub fn names() -> impl Iterator<Item = &'static str> {
        ASSETS.iter().map(|(name, _)| *name)
    }
}

impl AssetSource for EmbeddedAssets {
    fn load_asset(&self, name: &str) -> Result<Vec<u8>, AssetError> {
        ASSETS
            .iter()
            .find(|(asset_name, _)| *asset_name == name)
            .map(|(_, bytes)| bytes.to_vec())
            .ok_or_else(|| AssetError::NotFound(name.to_string()))
    }
}
