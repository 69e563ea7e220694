//! Manila CSI Driver Operator Library
//!
//! Installs the OpenStack Manila CSI driver and its NFS node plugin into a
//! cluster and keeps them converged on a declared desired state.
//!
//! - `catalog`: the desired objects, built from typed builders and manifests
//! - `assets`: embedded manifests and the image override hook
//! - `diff`: pure comparison of observed and desired objects
//! - `reconciler`: fetch, diff, then create, update or leave alone
//! - `controller`: sync loops, informers and the supervising runner
//! - `runtime`: process wiring used by the binary

pub mod assets;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod diff;
pub mod observability;
pub mod reconciler;
pub mod runtime;
pub mod server;
pub mod store;
