//! # Runtime
//!
//! Wires initialization, the controllers and the runner into the operator
//! process.
//!
//! - `initialization`: rustls, logging, metrics, probe server, client
//! - `controllers`: sync loops and the informers that wake them

pub mod controllers;
pub mod initialization;

pub use controllers::ControllerSet;
pub use initialization::{initialize, InitializationResult};

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::assets::{AssetResolver, EmbeddedAssets};
use crate::catalog::{Catalog, OperandNames};
use crate::config::{OperatorConfig, ServerConfig};
use crate::controller::{ControllerRunner, ManagementGate, RunnerError, StatusReporter};
use crate::reconciler::ObjectReconciler;
use crate::server::ServerState;
use crate::store::{KubeStore, ObjectStore};

/// Run the operator until it stops
///
/// # Errors
///
/// Never returns `Ok`: a stop after a shutdown signal is reported as an error
/// like any other, so the supervisor restarts the process.
pub async fn run(config: OperatorConfig, server_config: ServerConfig) -> Result<Infallible> {
    let InitializationResult {
        client,
        server_state,
        server_cancel,
        server_handle,
    } = initialize(&config, &server_config).await?;

    let store: Arc<dyn ObjectStore> = Arc::new(KubeStore::new(client.clone()));
    let assets = AssetResolver::from_env(Arc::new(EmbeddedAssets), &config.operand_namespace);
    let catalog = Catalog::new(OperandNames::new(&config.operand_namespace), assets);
    info!(catalog_version = catalog.version(), "Desired-state catalog loaded");

    let reconciler =
        ObjectReconciler::new(Arc::clone(&store)).with_call_timeout(config.store_call_timeout());
    let gate = ManagementGate::new(Arc::clone(&store));
    let status = Arc::new(StatusReporter::new(store));

    let controllers = ControllerSet::new(&config, &catalog, &reconciler, &gate, &status);
    let runner = controllers
        .informers(&client, &config)
        .into_iter()
        .fold(ControllerRunner::new().with_config(&config), |runner, source| {
            runner.with_source(source)
        });
    let runner = controllers
        .into_runnables()
        .into_iter()
        .fold(runner, |runner, runnable| runner.with_runnable(runnable));

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone(), Arc::clone(&server_state)));

    let stopped = runner.run(cancel).await;

    server_cancel.cancel();
    if let Err(e) = server_handle.await {
        error!("HTTP server task failed: {}", e);
    }

    match stopped {
        Err(RunnerError::Stopped) => {
            info!("Controllers stopped after shutdown signal");
            Err(RunnerError::Stopped).context("Operator shut down")
        }
        Err(e) => {
            error!(error = %e, "Controllers stopped");
            Err(e).context("Operator stopped unexpectedly")
        }
        Ok(never) => match never {},
    }
}

/// Cancel `cancel` on SIGINT or SIGTERM, marking the server not ready first
async fn shutdown_on_signal(cancel: CancellationToken, server_state: Arc<ServerState>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for SIGINT: {}", e);
                return;
            }
            info!("Received SIGINT, initiating graceful shutdown...");
        }
        () = terminate() => {
            info!("Received SIGTERM (pod termination), initiating graceful shutdown...");
        }
    }

    server_state.set_ready(false);
    cancel.cancel();
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
