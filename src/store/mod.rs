//! # Cluster Object Store
//!
//! The only I/O boundary the reconciliation core touches.
//!
//! - `KubeStore` talks to the Kubernetes API server through kube-rs
//! - `InMemoryStore` is a deterministic in-process store used by tests
//!
//! Objects travel as `DynamicObject` so one store serves every resource kind
//! the catalog manages, typed or not.

mod identity;
mod kube_store;
pub mod memory;

pub use identity::ObjectIdentity;
pub use kube_store::KubeStore;
pub use memory::InMemoryStore;

use std::time::Duration;

use async_trait::async_trait;
use kube::api::DynamicObject;
use thiserror::Error;

/// Errors returned by a cluster object store
///
/// "Not found" on `get` is not an error: it is reported as `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("API error {code} ({reason}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },
    #[error("Kubernetes client error: {0}")]
    Client(#[source] kube::Error),
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Failed to convert object: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Build an API error the way the API server reports it
    pub fn api(code: u16, reason: &str, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            reason: reason.to_string(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { code: 404, .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Api { code: 409, .. })
    }

    /// Errors that are expected to clear up on their own (network, throttling, server load)
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { code, .. } => *code == 408 || *code == 429 || *code >= 500,
            Self::Client(_) | Self::Timeout(_) => true,
            Self::Serialization(_) => false,
        }
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(api_err) => Self::Api {
                code: api_err.code,
                reason: api_err.reason.to_string(),
                message: api_err.message.to_string(),
            },
            other => Self::Client(other),
        }
    }
}

/// Cluster object store
///
/// Every call is expected to be bounded by a deadline supplied by the caller.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the live object, bypassing any cache. `Ok(None)` when it does not exist.
    async fn get(&self, id: &ObjectIdentity) -> Result<Option<DynamicObject>, StoreError>;

    /// Create the object; fails with 409 when it already exists
    async fn create(
        &self,
        id: &ObjectIdentity,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// Replace the object; fails with 404 when missing and 409 on a stale resourceVersion
    async fn update(
        &self,
        id: &ObjectIdentity,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// Merge `status` into the object's status subresource
    async fn patch_status(
        &self,
        id: &ObjectIdentity,
        status: &serde_json::Value,
    ) -> Result<(), StoreError>;
}
