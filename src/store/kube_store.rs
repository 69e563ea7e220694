//! # Kubernetes Store
//!
//! `ObjectStore` backed by the Kubernetes API server.

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;

use super::{ObjectIdentity, ObjectStore, StoreError};
use crate::constants::OPERATOR_NAME;

/// Store talking directly to the API server
///
/// Reads go straight to the server (no informer cache) so reconciliation
/// never diffs against stale state.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, id: &ObjectIdentity) -> Api<DynamicObject> {
        match &id.namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &id.resource),
            None => Api::all_with(self.client.clone(), &id.resource),
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, id: &ObjectIdentity) -> Result<Option<DynamicObject>, StoreError> {
        match self.api(id).get(&id.name).await {
            Ok(object) => Ok(Some(object)),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(
        &self,
        id: &ObjectIdentity,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        Ok(self.api(id).create(&Self::post_params(), object).await?)
    }

    async fn update(
        &self,
        id: &ObjectIdentity,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        Ok(self
            .api(id)
            .replace(&id.name, &Self::post_params(), object)
            .await?)
    }

    async fn patch_status(
        &self,
        id: &ObjectIdentity,
        status: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let patch = json!({ "status": status });
        self.api(id)
            .patch_status(&id.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
