//! # Initialization
//!
//! Process setup ahead of the controllers: rustls provider, logging, metrics,
//! the probe server and the Kubernetes client.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use kube::Client;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{OperatorConfig, ServerConfig};
use crate::constants::OPERATOR_NAME;
use crate::observability;
use crate::server::{start_server, ServerState};

/// Everything the controllers need from initialization
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Readiness flag shared with the probe server
    pub server_state: Arc<ServerState>,
    /// Stops the probe server; cancelled after the controllers exit
    pub server_cancel: CancellationToken,
    /// Probe server task
    pub server_handle: JoinHandle<()>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the operator process
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
///
/// # Errors
///
/// Returns an error if any step fails; the probe server is stopped in that case.
pub async fn initialize(
    config: &OperatorConfig,
    server_config: &ServerConfig,
) -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_provider| anyhow!("Failed to install rustls crypto provider"))?;

    observability::logging::init_logging(config)?;

    info!("Starting {}", OPERATOR_NAME);
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_cancel = CancellationToken::new();

    let port = server_config.metrics_port;
    let state = Arc::clone(&server_state);
    let cancel = server_cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(port, state, cancel).await {
            error!("HTTP server error: {:#}", e);
        }
    });

    if let Err(e) = wait_for_server_ready(&server_state, &server_handle, server_config).await {
        server_cancel.cancel();
        return Err(e);
    }

    let client = match Client::try_default()
        .await
        .context("Failed to create Kubernetes client")
    {
        Ok(client) => client,
        Err(e) => {
            server_cancel.cancel();
            return Err(e);
        }
    };

    info!(
        operand_namespace = %config.operand_namespace,
        resync_interval_secs = config.resync_interval_secs,
        "Operator initialized"
    );

    Ok(InitializationResult {
        client,
        server_state,
        server_cancel,
        server_handle,
    })
}

/// Wait for the HTTP server to bind its port
async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_config() -> ServerConfig {
        ServerConfig {
            metrics_port: 0,
            startup_timeout_secs: 1,
            poll_interval_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_wait_returns_once_ready() {
        let state = Arc::new(ServerState::default());
        let handle = tokio::spawn(std::future::pending::<()>());
        state.set_ready(true);

        let result = wait_for_server_ready(&state, &handle, &fast_config()).await;
        handle.abort();

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_wait_fails_when_server_task_exits() {
        let state = Arc::new(ServerState::default());
        let handle = tokio::spawn(async {});
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = wait_for_server_ready(&state, &handle, &fast_config())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("failed to start"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let state = Arc::new(ServerState::default());
        let handle = tokio::spawn(std::future::pending::<()>());

        let err = wait_for_server_ready(&state, &handle, &fast_config())
            .await
            .unwrap_err();
        handle.abort();

        assert!(err.to_string().contains("within 1 seconds"));
    }
}
