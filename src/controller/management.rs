//! # Management State and Status
//!
//! - `ManagementGate` reads `spec.managementState` of the `ManilaDriver`
//!   resource before every pass
//! - `StatusReporter` folds pass outcomes into per-controller conditions and
//!   writes them to the resource's status subresource

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::constants::OPERATOR_RESOURCE_NAME;
use crate::crd::{set_condition, Condition, ManagementState, ManilaDriver, CONDITION_TRUE};
use crate::observability::metrics;
use crate::store::{ObjectIdentity, ObjectStore};

/// Identity of the singleton operator resource
#[must_use]
pub fn operator_resource() -> ObjectIdentity {
    ObjectIdentity::of::<ManilaDriver>(None, OPERATOR_RESOURCE_NAME)
}

/// Reads the desired management state of the operand
#[derive(Clone)]
pub struct ManagementGate {
    store: Arc<dyn ObjectStore>,
    identity: ObjectIdentity,
}

impl std::fmt::Debug for ManagementGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementGate")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl ManagementGate {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            identity: operator_resource(),
        }
    }

    /// Current management state; `Managed` when the resource does not exist
    ///
    /// # Errors
    ///
    /// Returns an error when the store call fails or the resource is malformed.
    pub async fn state(&self) -> Result<ManagementState> {
        let Some(object) = self
            .store
            .get(&self.identity)
            .await
            .with_context(|| format!("Failed to read {}", self.identity))?
        else {
            return Ok(ManagementState::Managed);
        };
        let state = object
            .data
            .get("spec")
            .and_then(|spec| spec.get("managementState"))
            .cloned()
            .map(serde_json::from_value::<ManagementState>)
            .transpose()
            .with_context(|| format!("Invalid managementState on {}", self.identity))?;
        Ok(state.unwrap_or_default())
    }
}

/// Outcome of one controller pass as seen by the status reporter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Succeeded,
    Failed(String),
    /// Management state does not allow the pass to run
    Paused(ManagementState),
}

#[derive(Debug, Default)]
struct ReporterState {
    conditions: BTreeMap<String, Vec<Condition>>,
    // conditions changed since the last successful publish
    dirty: bool,
}

impl ReporterState {
    fn sorted(&self) -> Vec<Condition> {
        let mut all: Vec<Condition> = self.conditions.values().flatten().cloned().collect();
        all.sort_by(|a, b| a.r#type.cmp(&b.r#type));
        all
    }
}

/// Aggregates per-controller conditions for the operator resource
pub struct StatusReporter {
    store: Arc<dyn ObjectStore>,
    identity: ObjectIdentity,
    state: AsyncMutex<ReporterState>,
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl StatusReporter {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            identity: operator_resource(),
            state: AsyncMutex::new(ReporterState::default()),
        }
    }

    /// Conditions currently held for every controller, sorted by type
    pub async fn conditions(&self) -> Vec<Condition> {
        self.state.lock().await.sorted()
    }

    /// Record the outcome of a pass and publish the conditions
    ///
    /// Publishing is best effort: when the operator resource is missing or the
    /// status write fails, the conditions are published on a later report.
    pub async fn report(&self, controller: &str, outcome: &PassOutcome) {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let (available, degraded, reason, message) = match outcome {
            PassOutcome::Succeeded => (true, false, "AsExpected", String::new()),
            PassOutcome::Failed(message) => (false, true, "SyncFailed", message.clone()),
            PassOutcome::Paused(ManagementState::Removed) => (
                false,
                true,
                "Unsupported",
                "managementState Removed is not supported".to_string(),
            ),
            PassOutcome::Paused(state) => {
                (false, false, "Paused", format!("managementState is {state}"))
            }
        };

        let mut state = self.state.lock().await;
        let entry = state.conditions.entry(controller.to_string()).or_default();
        let mut changed = set_condition(
            entry,
            &format!("{controller}Available"),
            available,
            reason,
            &message,
            &now,
        );
        changed |= set_condition(
            entry,
            &format!("{controller}Degraded"),
            degraded,
            reason,
            &message,
            &now,
        );
        state.dirty |= changed;

        let degraded_count = state
            .conditions
            .values()
            .flatten()
            .filter(|c| c.r#type.ends_with("Degraded") && c.status == CONDITION_TRUE)
            .count();
        metrics::set_controllers_degraded(i64::try_from(degraded_count).unwrap_or(i64::MAX));

        if !state.dirty {
            return;
        }
        match self.publish(state.sorted()).await {
            Ok(true) => state.dirty = false,
            Ok(false) => {}
            Err(e) => warn!(controller, error = %e, "Failed to publish operator status"),
        }
    }

    /// Write the conditions; `Ok(false)` when the operator resource does not exist
    async fn publish(&self, conditions: Vec<Condition>) -> Result<bool> {
        let Some(object) = self.store.get(&self.identity).await? else {
            debug!("Operator resource {} not found, status not published", self.identity);
            return Ok(false);
        };
        let status = serde_json::json!({
            "conditions": conditions,
            "observedGeneration": object.metadata.generation,
        });
        self.store.patch_status(&self.identity, &status).await?;
        Ok(true)
    }
}
