//! # Controller
//!
//! Everything that schedules reconciliation.
//!
//! - `backoff`: Fibonacci backoff for failed passes
//! - `informer`: watch-based event sources
//! - `management`: management state gate and status conditions
//! - `manifests`: controllers applying catalog manifest sets
//! - `resource_sync`: cloud config ConfigMap mirroring
//! - `runnable`: `Runnable`, `SyncController` and the `SyncLoop` wrapper
//! - `runner`: the supervising run loop
//! - `secret_sync`: clouds.yaml to driver secret translation

pub mod backoff;
pub mod informer;
pub mod management;
pub mod manifests;
pub mod resource_sync;
pub mod runnable;
pub mod runner;
pub mod secret_sync;

pub use informer::{EventSource, KubeInformer};
pub use management::{ManagementGate, PassOutcome, StatusReporter};
pub use manifests::{ManifestController, ManifestSet};
pub use resource_sync::{ConfigMapSyncController, ResourceLocation};
pub use runnable::{Runnable, SyncController, SyncLoop};
pub use runner::{ControllerRunner, RunnerError};
pub use secret_sync::{translate_clouds_yaml, SecretSyncController};
