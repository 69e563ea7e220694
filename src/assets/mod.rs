//! # Asset Override Hook
//!
//! Loads embedded manifests and substitutes environment-provided values into
//! them before they are parsed and applied.
//!
//! Substitution is literal: every `${VAR}` is replaced by the value of `VAR`
//! when it is set and non-empty, otherwise the asset passes through unchanged.
//! There is no escaping and no templating beyond that.

mod embedded;

pub use embedded::EmbeddedAssets;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::constants::{
    DRIVER_IMAGE_ENV, LIVENESS_PROBE_IMAGE_ENV, NFS_DRIVER_IMAGE_ENV,
    NODE_DRIVER_REGISTRAR_IMAGE_ENV, OPERAND_NAMESPACE_ENV, PROVISIONER_IMAGE_ENV,
    SNAPSHOTTER_IMAGE_ENV,
};

/// Image override variables read from the process environment
pub const IMAGE_OVERRIDE_VARS: &[&str] = &[
    NFS_DRIVER_IMAGE_ENV,
    DRIVER_IMAGE_ENV,
    PROVISIONER_IMAGE_ENV,
    SNAPSHOTTER_IMAGE_ENV,
    NODE_DRIVER_REGISTRAR_IMAGE_ENV,
    LIVENESS_PROBE_IMAGE_ENV,
];

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Unknown asset: {0}")]
    NotFound(String),
    #[error("Asset {name} is not valid UTF-8: {source}")]
    NotUtf8 {
        name: String,
        source: std::string::FromUtf8Error,
    },
}

/// Read-only source of static manifests
pub trait AssetSource: Send + Sync + fmt::Debug {
    /// Raw bytes of the named asset
    ///
    /// # Errors
    ///
    /// Returns `AssetError::NotFound` when no asset has that name.
    fn load_asset(&self, name: &str) -> Result<Vec<u8>, AssetError>;
}

/// Asset source with placeholder substitution applied on load
#[derive(Debug, Clone)]
pub struct AssetResolver {
    source: Arc<dyn AssetSource>,
    overrides: Vec<(String, String)>,
}

impl AssetResolver {
    /// Resolver without overrides: assets are returned as embedded
    #[must_use]
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        Self {
            source,
            overrides: Vec::new(),
        }
    }

    /// Resolver for the running operator
    ///
    /// Image overrides come from the process environment. The operand namespace
    /// is always substituted so manifests follow the configured namespace.
    #[must_use]
    pub fn from_env(source: Arc<dyn AssetSource>, operand_namespace: &str) -> Self {
        Self::from_lookup(source, IMAGE_OVERRIDE_VARS, |key| std::env::var(key).ok())
            .with_override(OPERAND_NAMESPACE_ENV, operand_namespace)
    }

    /// Resolver taking the value of each of `vars` from `lookup`
    pub fn from_lookup<F>(source: Arc<dyn AssetSource>, vars: &[&str], lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        vars.iter().fold(Self::new(source), |resolver, var| match lookup(var) {
            Some(value) => resolver.with_override(var, &value),
            None => resolver,
        })
    }

    /// Substitute `${var}` with `value`; empty values are ignored
    #[must_use]
    pub fn with_override(mut self, var: &str, value: &str) -> Self {
        if value.is_empty() {
            return self;
        }
        self.overrides.retain(|(existing, _)| existing != var);
        self.overrides.push((var.to_string(), value.to_string()));
        self
    }

    /// Value substituted for `var`, if any
    #[must_use]
    pub fn override_for(&self, var: &str) -> Option<&str> {
        self.overrides
            .iter()
            .find(|(existing, _)| existing == var)
            .map(|(_, value)| value.as_str())
    }

    /// Load `name` and apply every configured substitution
    ///
    /// # Errors
    ///
    /// Returns `AssetError::NotFound` when the source has no such asset and
    /// `AssetError::NotUtf8` when the asset is not text.
    pub fn resolve_asset(&self, name: &str) -> Result<Vec<u8>, AssetError> {
        let asset = String::from_utf8(self.source.load_asset(name)?).map_err(|source| {
            AssetError::NotUtf8 {
                name: name.to_string(),
                source,
            }
        })?;
        Ok(self
            .overrides
            .iter()
            .fold(asset, |asset, (var, value)| {
                substitute_placeholder(&asset, var, value)
            })
            .into_bytes())
    }
}

/// Replace every literal `${var}` in `asset` with `value`
#[must_use]
pub fn substitute_placeholder(asset: &str, var: &str, value: &str) -> String {
    asset.replace(&format!("${{{var}}}"), value)
}
