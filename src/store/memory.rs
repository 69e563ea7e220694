//! # In-Memory Store
//!
//! Deterministic `ObjectStore` that mimics the API server semantics the
//! reconciler relies on:
//!
//! - `create` fails with 409 AlreadyExists when the identity is taken
//! - `update` fails with 404 when missing and 409 Conflict on a stale resourceVersion
//! - every write bumps `metadata.resourceVersion`; `uid` and `status` survive updates
//!
//! Every call is recorded, and failures can be injected per operation.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use kube::api::DynamicObject;

use super::{ObjectIdentity, ObjectStore, StoreError};

/// Store operation, used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    Create,
    Update,
    PatchStatus,
}

/// A recorded store call with the object key it targeted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub key: String,
}

impl StoreCall {
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        self.op != StoreOp::Get
    }
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<String, DynamicObject>,
    calls: Vec<StoreCall>,
    failures: VecDeque<(StoreOp, StoreError)>,
    last_resource_version: u64,
}

impl Inner {
    fn record(&mut self, op: StoreOp, id: &ObjectIdentity) -> Result<(), StoreError> {
        self.calls.push(StoreCall {
            op,
            key: id.object_key(),
        });
        match self.failures.iter().position(|(failing, _)| *failing == op) {
            Some(index) => match self.failures.remove(index) {
                Some((_, err)) => Err(err),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    fn next_resource_version(&mut self) -> String {
        self.last_resource_version += 1;
        self.last_resource_version.to_string()
    }
}

/// In-process cluster object store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object as if it already existed on the server
    ///
    /// Server-assigned metadata is filled in when absent. No call is recorded.
    pub fn insert(&self, id: &ObjectIdentity, mut object: DynamicObject) {
        let mut inner = self.lock();
        if object.metadata.uid.is_none() {
            object.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        if object.metadata.resource_version.is_none() {
            object.metadata.resource_version = Some(inner.next_resource_version());
        }
        inner.objects.insert(id.object_key(), object);
    }

    /// Current stored copy of an object
    #[must_use]
    pub fn object(&self, id: &ObjectIdentity) -> Option<DynamicObject> {
        self.lock().objects.get(&id.object_key()).cloned()
    }

    /// Every stored object, keyed by object key
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, DynamicObject> {
        self.lock().objects.clone()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Recorded calls that would have changed cluster state
    #[must_use]
    pub fn mutations(&self) -> Vec<StoreCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make the next call of `op` fail with `err`
    pub fn fail_next(&self, op: StoreOp, err: StoreError) {
        self.lock().failures.push_back((op, err));
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, id: &ObjectIdentity) -> Result<Option<DynamicObject>, StoreError> {
        let mut inner = self.lock();
        inner.record(StoreOp::Get, id)?;
        Ok(inner.objects.get(&id.object_key()).cloned())
    }

    async fn create(
        &self,
        id: &ObjectIdentity,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut inner = self.lock();
        inner.record(StoreOp::Create, id)?;
        let key = id.object_key();
        if inner.objects.contains_key(&key) {
            return Err(StoreError::api(
                409,
                "AlreadyExists",
                format!("{id} already exists"),
            ));
        }
        let mut created = object.clone();
        created.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        created.metadata.resource_version = Some(inner.next_resource_version());
        created.metadata.generation = Some(1);
        inner.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        id: &ObjectIdentity,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut inner = self.lock();
        inner.record(StoreOp::Update, id)?;
        let key = id.object_key();
        let Some(current) = inner.objects.get(&key).cloned() else {
            return Err(StoreError::api(404, "NotFound", format!("{id} not found")));
        };
        if let Some(requested) = &object.metadata.resource_version {
            if current.metadata.resource_version.as_ref() != Some(requested) {
                return Err(StoreError::api(
                    409,
                    "Conflict",
                    format!("{id} has been modified; resourceVersion {requested} is stale"),
                ));
            }
        }

        let mut updated = object.clone();
        updated.metadata.uid.clone_from(&current.metadata.uid);
        updated.metadata.resource_version = Some(inner.next_resource_version());
        let spec_changed = strip_status(&current.data) != strip_status(&object.data);
        let generation = current.metadata.generation.unwrap_or(1);
        updated.metadata.generation = Some(if spec_changed {
            generation + 1
        } else {
            generation
        });
        // status is owned by the status subresource
        if let Some(map) = updated.data.as_object_mut() {
            map.remove("status");
            if let Some(status) = current.data.get("status") {
                map.insert("status".to_string(), status.clone());
            }
        }
        inner.objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn patch_status(
        &self,
        id: &ObjectIdentity,
        status: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.record(StoreOp::PatchStatus, id)?;
        let resource_version = inner.next_resource_version();
        let Some(current) = inner.objects.get_mut(&id.object_key()) else {
            return Err(StoreError::api(404, "NotFound", format!("{id} not found")));
        };
        if !current.data.is_object() {
            current.data = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(map) = current.data.as_object_mut() {
            let merged = match map.remove("status") {
                Some(mut existing) => {
                    merge_patch(&mut existing, status);
                    existing
                }
                None => status.clone(),
            };
            map.insert("status".to_string(), merged);
        }
        current.metadata.resource_version = Some(resource_version);
        Ok(())
    }
}

fn strip_status(data: &serde_json::Value) -> serde_json::Value {
    let mut data = data.clone();
    if let Some(map) = data.as_object_mut() {
        map.remove("status");
    }
    data
}

/// JSON merge patch (RFC 7386): objects merge, null deletes, everything else replaces
fn merge_patch(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target_map), Some(patch_map)) => {
            for (key, value) in patch_map {
                if value.is_null() {
                    target_map.remove(key);
                } else {
                    merge_patch(
                        target_map
                            .entry(key.clone())
                            .or_insert(serde_json::Value::Null),
                        value,
                    );
                }
            }
        }
        _ => *target = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;
    use serde_json::json;

    fn config_map(name: &str, data: serde_json::Value) -> (ObjectIdentity, DynamicObject) {
        let id = ObjectIdentity::of::<ConfigMap>(Some("ns"), name);
        let object = DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            data,
        };
        (id, object)
    }

    #[tokio::test]
    async fn test_create_assigns_server_metadata_and_rejects_duplicates() {
        let store = InMemoryStore::new();
        let (id, object) = config_map("a", json!({"data": {"k": "v"}}));

        let created = store.create(&id, &object).await.unwrap();
        assert!(created.metadata.uid.is_some());
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));

        let err = store.create(&id, &object).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_rejects_stale_resource_version() {
        let store = InMemoryStore::new();
        let (id, object) = config_map("a", json!({"data": {"k": "v"}}));
        let created = store.create(&id, &object).await.unwrap();

        let mut first = created.clone();
        first.data = json!({"data": {"k": "v2"}});
        store.update(&id, &first).await.unwrap();

        // Second writer still holds the original resourceVersion
        let mut second = created;
        second.data = json!({"data": {"k": "v3"}});
        let err = store.update(&id, &second).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let store = InMemoryStore::new();
        let (id, _) = config_map("a", json!({}));
        store.fail_next(StoreOp::Get, StoreError::api(503, "ServiceUnavailable", "down"));

        assert!(store.get(&id).await.is_err());
        assert!(store.get(&id).await.unwrap().is_none());
        assert_eq!(store.calls().len(), 2);
        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_patch_status_merges_and_survives_update() {
        let store = InMemoryStore::new();
        let (id, object) = config_map("a", json!({"spec": {"x": 1}}));
        store.insert(&id, object);

        store
            .patch_status(&id, &json!({"conditions": [], "observedGeneration": 1}))
            .await
            .unwrap();
        let current = store.object(&id).unwrap();
        store.update(&id, &current).await.unwrap();

        let after = store.object(&id).unwrap();
        assert_eq!(after.data["status"]["observedGeneration"], json!(1));
    }
}
