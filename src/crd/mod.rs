//! # Custom Resource Definitions
//!
//! The cluster-scoped `ManilaDriver` resource that switches the operator
//! between managed and unmanaged mode and carries per-controller conditions.
//!
//! - `spec.rs` - Resource spec and management state
//! - `status.rs` - Status and condition bookkeeping

mod spec;
mod status;

pub use spec::{ManagementState, ManilaDriver, ManilaDriverSpec};
pub use status::{
    set_condition, Condition, ManilaDriverStatus, CONDITION_FALSE, CONDITION_TRUE,
};
