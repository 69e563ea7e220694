//! # Logging
//!
//! `tracing-subscriber` setup. `RUST_LOG` wins over `LOG_LEVEL`; output is JSON
//! unless `LOG_FORMAT=text`.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::config::OperatorConfig;

const CRATE_TARGET: &str = "manila_csi_driver_operator";

/// Filter directive used when `RUST_LOG` is not set
#[must_use]
pub fn default_directive(log_level: &str) -> String {
    format!("{CRATE_TARGET}={},kube=warn", log_level.to_lowercase())
}

/// Install the global subscriber
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(config: &OperatorConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level)));

    let result = if config.log_format.eq_ignore_ascii_case("text") {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    } else {
        tracing_subscriber::fmt()
            .json()
            .with_current_span(true)
            .with_env_filter(filter)
            .try_init()
    };
    result.map_err(|e| anyhow!("Failed to initialize tracing subscriber: {e}"))
}
