//! # Reconciler
//!
//! Converges one desired object at a time:
//!
//! 1. Take the per-kind lock (one reconcile in flight per resource kind)
//! 2. Read the live object straight from the store
//! 3. Diff it against the desired template
//! 4. Create, update or leave it alone
//!
//! Store errors propagate to the caller; a missing object routes to create.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::catalog::DesiredObject;
use crate::constants::DEFAULT_STORE_CALL_TIMEOUT_SECS;
use crate::diff::{self, DiffError, PatchDecision};
use crate::observability::metrics;
use crate::store::{ObjectIdentity, ObjectStore, StoreError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Store call for {identity} failed: {source}")]
    Store {
        identity: String,
        #[source]
        source: StoreError,
    },
    #[error("Cannot diff {identity}: {source}")]
    Diff {
        identity: String,
        #[source]
        source: DiffError,
    },
}

impl ReconcileError {
    /// Whether retrying later is expected to succeed without intervention
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store { source, .. } => source.is_transient() || source.is_conflict(),
            Self::Diff { .. } => false,
        }
    }
}

/// Outcome of reconciling one object as part of a batch
#[derive(Debug)]
pub struct ObjectOutcome {
    pub identity: ObjectIdentity,
    pub result: Result<PatchDecision, ReconcileError>,
}

/// Fetch-or-create-or-update against a cluster object store
#[derive(Clone)]
pub struct ObjectReconciler {
    store: Arc<dyn ObjectStore>,
    // Per-kind lock map: at most one reconcile per resource kind in flight
    kind_locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
    call_timeout: Duration,
}

impl std::fmt::Debug for ObjectReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectReconciler")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl ObjectReconciler {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            kind_locks: Arc::new(Mutex::new(HashMap::new())),
            call_timeout: Duration::from_secs(DEFAULT_STORE_CALL_TIMEOUT_SECS),
        }
    }

    /// Deadline applied to every store call
    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    fn kind_lock(&self, identity: &ObjectIdentity) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .kind_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(identity.kind_key()).or_default())
    }

    async fn bounded<T, F>(&self, identity: &ObjectIdentity, call: F) -> Result<T, ReconcileError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let result = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.call_timeout)),
        };
        result.map_err(|source| ReconcileError::Store {
            identity: identity.to_string(),
            source,
        })
    }

    /// Read a live object with the store call deadline applied
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Store` when the read fails or times out.
    pub async fn fetch(
        &self,
        identity: &ObjectIdentity,
    ) -> Result<Option<kube::api::DynamicObject>, ReconcileError> {
        self.bounded(identity, self.store.get(identity)).await
    }

    /// Converge one object toward its desired state
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Store` when a store call fails or times out and
    /// `ReconcileError::Diff` when the observed object cannot be compared.
    pub async fn reconcile(&self, desired: &DesiredObject) -> Result<PatchDecision, ReconcileError> {
        let identity = desired.identity();
        let lock = self.kind_lock(identity);
        let _guard = lock.lock().await;

        let result = self.reconcile_locked(desired).await;
        match &result {
            Ok(decision) => metrics::record_reconciliation(identity.kind(), decision.as_str()),
            Err(e) => {
                metrics::increment_reconciliation_errors(identity.kind());
                warn!(object = %identity, error = %e, "Reconciliation failed");
            }
        }
        result
    }

    async fn reconcile_locked(
        &self,
        desired: &DesiredObject,
    ) -> Result<PatchDecision, ReconcileError> {
        let identity = desired.identity();
        let observed = self.bounded(identity, self.store.get(identity)).await?;

        let diff_error = |source| ReconcileError::Diff {
            identity: identity.to_string(),
            source,
        };

        let Some(observed) = observed else {
            self.bounded(identity, self.store.create(identity, desired.object()))
                .await?;
            info!(object = %identity, "Created object");
            return Ok(PatchDecision::Create);
        };

        let changes = diff::compute_diff(&observed, desired.object()).map_err(diff_error)?;
        if changes.is_empty() {
            debug!(object = %identity, "Object up to date");
            return Ok(PatchDecision::NoOp);
        }

        let payload = diff::merge_for_update(&observed, desired.object()).map_err(diff_error)?;
        self.bounded(identity, self.store.update(identity, &payload))
            .await?;
        info!(
            object = %identity,
            changed = ?changes.changed,
            "Updated object"
        );
        Ok(PatchDecision::Update)
    }

    /// Reconcile `objects` in order, continuing past failures
    ///
    /// Order matters where one object is a prerequisite of another (a service
    /// account before its binding). Every outcome is returned.
    pub async fn reconcile_all(&self, objects: &[DesiredObject]) -> Vec<ObjectOutcome> {
        let mut outcomes = Vec::with_capacity(objects.len());
        for desired in objects {
            let result = self.reconcile(desired).await;
            outcomes.push(ObjectOutcome {
                identity: desired.identity().clone(),
                result,
            });
        }
        outcomes
    }
}

/// Collapse batch outcomes into one error listing every failed object
///
/// # Errors
///
/// Returns an error naming each object whose reconciliation failed.
pub fn summarize(outcomes: &[ObjectOutcome]) -> anyhow::Result<()> {
    let failures: Vec<String> = outcomes
        .iter()
        .filter_map(|outcome| outcome.result.as_ref().err().map(ToString::to_string))
        .collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{} of {} objects failed to reconcile: {}",
            failures.len(),
            outcomes.len(),
            failures.join("; ")
        ))
    }
}
