//! # Runnables
//!
//! A `Runnable` is a long-lived unit of work supervised by the
//! `ControllerRunner`. `SyncLoop` turns a `SyncController` (one idempotent
//! sync pass) into a runnable that re-runs the pass on a resync timer, on
//! informer events and after failures.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::OperatorConfig;
use crate::constants::{
    DEFAULT_BACKOFF_MAX_SECS, DEFAULT_BACKOFF_MIN_SECS, DEFAULT_RESYNC_INTERVAL_SECS,
};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::management::{ManagementGate, PassOutcome, StatusReporter};
use crate::crd::ManagementState;
use crate::observability::metrics;

/// Unit of work with a run lifecycle
///
/// `run` must return promptly once `cancel` fires. Returning for any other
/// reason is treated by the runner as a failure of the whole operator.
#[async_trait]
pub trait Runnable: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, cancel: CancellationToken) -> Result<()>;
}

/// One idempotent convergence pass
#[async_trait]
pub trait SyncController: Send + Sync {
    /// Controller name, also used for condition types and metrics
    fn name(&self) -> &str;

    async fn sync(&self) -> Result<()>;
}

/// Runs a controller's pass immediately, then on every resync tick, wake-up
/// trigger, or backoff expiry after a failure
pub struct SyncLoop {
    controller: Arc<dyn SyncController>,
    trigger: Arc<Notify>,
    resync_interval: Duration,
    backoff_min_secs: u64,
    backoff_max_secs: u64,
    gate: Option<ManagementGate>,
    status: Option<Arc<StatusReporter>>,
}

impl std::fmt::Debug for SyncLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncLoop")
            .field("controller", &self.controller.name())
            .field("resync_interval", &self.resync_interval)
            .finish_non_exhaustive()
    }
}

impl SyncLoop {
    #[must_use]
    pub fn new(controller: Arc<dyn SyncController>) -> Self {
        Self {
            controller,
            trigger: Arc::new(Notify::new()),
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            gate: None,
            status: None,
        }
    }

    /// Resync interval and backoff bounds from the operator configuration
    #[must_use]
    pub fn with_config(mut self, config: &OperatorConfig) -> Self {
        self.resync_interval = config.resync_interval();
        self.backoff_min_secs = config.backoff_min_secs;
        self.backoff_max_secs = config.backoff_max_secs;
        self
    }

    #[must_use]
    pub fn with_resync_interval(mut self, resync_interval: Duration) -> Self {
        self.resync_interval = resync_interval;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, min_secs: u64, max_secs: u64) -> Self {
        self.backoff_min_secs = min_secs;
        self.backoff_max_secs = max_secs;
        self
    }

    /// Skip passes unless the operator resource asks for `Managed`
    #[must_use]
    pub fn with_gate(mut self, gate: ManagementGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Report every pass outcome as conditions
    #[must_use]
    pub fn with_status(mut self, status: Arc<StatusReporter>) -> Self {
        self.status = Some(status);
        self
    }

    /// Handle that wakes this loop for an extra pass
    ///
    /// Wake-ups arriving while a pass is running coalesce into one more pass.
    #[must_use]
    pub fn trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.trigger)
    }

    fn backoff(&self) -> FibonacciBackoff {
        FibonacciBackoff::new(self.backoff_min_secs, self.backoff_max_secs)
            .capped_at(self.resync_interval.as_secs())
    }

    async fn report(&self, outcome: PassOutcome) {
        if let Some(status) = &self.status {
            status.report(self.controller.name(), &outcome).await;
        }
    }

    /// One gated, measured pass
    async fn pass(&self) -> Result<()> {
        let name = self.controller.name();
        if let Some(gate) = &self.gate {
            let state = gate.state().await?;
            if state != ManagementState::Managed {
                debug!(controller = name, state = %state, "Pass skipped by management state");
                self.report(PassOutcome::Paused(state)).await;
                return Ok(());
            }
        }

        let start = Instant::now();
        let result = self.controller.sync().await;
        metrics::record_sync_pass(name, result.is_ok(), start.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(()) => PassOutcome::Succeeded,
            Err(e) => PassOutcome::Failed(format!("{e:#}")),
        };
        self.report(outcome).await;
        result
    }
}

#[async_trait]
impl Runnable for SyncLoop {
    fn name(&self) -> &str {
        self.controller.name()
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let name = self.controller.name();
        let mut backoff = self.backoff();
        let mut delay = Duration::ZERO;
        info!(controller = name, "Starting sync loop");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = self.trigger.notified() => debug!(controller = name, "Woken by event"),
                () = tokio::time::sleep(delay) => {}
            }

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.pass() => result,
            };

            delay = match result {
                Ok(()) => {
                    backoff.reset();
                    self.resync_interval
                }
                Err(e) => {
                    let retry = backoff.next_backoff();
                    warn!(
                        controller = name,
                        error = %format!("{e:#}"),
                        retry_in_secs = retry.as_secs(),
                        "Sync pass failed"
                    );
                    retry
                }
            };
        }

        info!(controller = name, "Sync loop stopped");
        Ok(())
    }
}
