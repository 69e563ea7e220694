//! # Controller Runner
//!
//! Supervises the operator's long-lived tasks:
//!
//! 1. Start every event source and wait (bounded) for their initial list
//! 2. Spawn every runnable with a child of the shared cancellation token
//! 3. Wait for cancellation or for any task to stop
//! 4. Cancel the rest, give them a grace period, abort stragglers
//!
//! The runner never returns success. The operator is meant to run until its
//! supervisor restarts it, so every exit is reported as an error.

use std::any::Any;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::OperatorConfig;
use crate::constants::{DEFAULT_INFORMER_SYNC_TIMEOUT_SECS, DEFAULT_SHUTDOWN_GRACE_PERIOD_SECS};
use crate::controller::informer::EventSource;
use crate::controller::runnable::Runnable;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Runner stopped")]
    Stopped,
    #[error("Event sources did not sync within {0:?}")]
    SourcesNotSynced(Duration),
    #[error("{name} failed: {source:#}")]
    TaskFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{name} exited unexpectedly")]
    TaskExited { name: String },
    #[error("{name} panicked: {message}")]
    TaskPanicked { name: String, message: String },
}

type TaskOutcome = Result<anyhow::Result<()>, Box<dyn Any + Send>>;

struct TaskExit {
    name: String,
    outcome: TaskOutcome,
}

impl TaskExit {
    fn into_error(self) -> RunnerError {
        let name = self.name;
        match self.outcome {
            Ok(Ok(())) => RunnerError::TaskExited { name },
            Ok(Err(source)) => RunnerError::TaskFailed { name, source },
            Err(panic) => RunnerError::TaskPanicked {
                name,
                message: panic_message(panic.as_ref()),
            },
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs event sources and runnables until cancellation or the first failure
pub struct ControllerRunner {
    sources: Vec<Arc<dyn EventSource>>,
    runnables: Vec<Arc<dyn Runnable>>,
    grace_period: Duration,
    sync_timeout: Duration,
}

impl std::fmt::Debug for ControllerRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerRunner")
            .field("sources", &self.sources.len())
            .field("runnables", &self.runnables.len())
            .field("grace_period", &self.grace_period)
            .field("sync_timeout", &self.sync_timeout)
            .finish()
    }
}

impl Default for ControllerRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerRunner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            runnables: Vec::new(),
            grace_period: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_PERIOD_SECS),
            sync_timeout: Duration::from_secs(DEFAULT_INFORMER_SYNC_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: &OperatorConfig) -> Self {
        self.grace_period = config.shutdown_grace_period();
        self.sync_timeout = config.informer_sync_timeout();
        self
    }

    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    #[must_use]
    pub fn with_sync_timeout(mut self, sync_timeout: Duration) -> Self {
        self.sync_timeout = sync_timeout;
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.sources.push(source);
        self
    }

    #[must_use]
    pub fn with_runnable(mut self, runnable: Arc<dyn Runnable>) -> Self {
        self.runnables.push(runnable);
        self
    }

    /// Run until `cancel` fires or a task stops
    ///
    /// # Errors
    ///
    /// Always returns an error: `Stopped` after cancellation, otherwise the
    /// reason the first task stopped.
    pub async fn run(self, cancel: CancellationToken) -> Result<Infallible, RunnerError> {
        let child = cancel.child_token();
        let mut tasks: JoinSet<TaskExit> = JoinSet::new();

        info!(sources = self.sources.len(), "Starting event sources");
        for source in &self.sources {
            let source = Arc::clone(source);
            let token = child.clone();
            tasks.spawn(async move {
                let name = source.name().to_string();
                let outcome = AssertUnwindSafe(source.run(token)).catch_unwind().await;
                TaskExit { name, outcome }
            });
        }

        let synced = join_all(self.sources.iter().map(|source| source.synced()));
        let early = tokio::select! {
            biased;
            () = cancel.cancelled() => Some(RunnerError::Stopped),
            Some(exit) = tasks.join_next() => Some(exit_error(exit)),
            result = tokio::time::timeout(self.sync_timeout, synced) => match result {
                Ok(_) => None,
                Err(_) => Some(RunnerError::SourcesNotSynced(self.sync_timeout)),
            },
        };
        if let Some(err) = early {
            self.shutdown(&child, tasks).await;
            return Err(err);
        }

        info!(runnables = self.runnables.len(), "Starting controllers");
        for runnable in &self.runnables {
            let runnable = Arc::clone(runnable);
            let token = child.clone();
            tasks.spawn(async move {
                let name = runnable.name().to_string();
                let outcome = AssertUnwindSafe(runnable.run(token)).catch_unwind().await;
                TaskExit { name, outcome }
            });
        }

        let err = tokio::select! {
            biased;
            () = cancel.cancelled() => RunnerError::Stopped,
            Some(exit) = tasks.join_next() => exit_error(exit),
        };
        if !matches!(err, RunnerError::Stopped) {
            error!(error = %err, "Task stopped, shutting down");
        }
        self.shutdown(&child, tasks).await;
        Err(err)
    }

    async fn shutdown(&self, child: &CancellationToken, mut tasks: JoinSet<TaskExit>) {
        child.cancel();
        let drain = async {
            while let Some(exit) = tasks.join_next().await {
                if let Ok(TaskExit {
                    name,
                    outcome: Ok(Err(e)),
                }) = exit
                {
                    warn!(task = %name, error = %format!("{e:#}"), "Task failed during shutdown");
                }
            }
        };
        if tokio::time::timeout(self.grace_period, drain).await.is_err() {
            warn!(
                grace_period_secs = self.grace_period.as_secs(),
                remaining = tasks.len(),
                "Tasks did not stop within the grace period, aborting"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
        info!("All tasks stopped");
    }
}

fn exit_error(exit: Result<TaskExit, tokio::task::JoinError>) -> RunnerError {
    match exit {
        Ok(exit) => exit.into_error(),
        Err(join_err) => RunnerError::TaskExited {
            name: format!("task {join_err}"),
        },
    }
}
