//! # Configuration
//!
//! Operator and HTTP server settings loaded from environment variables.
//!
//! Environment variables are populated from the operator Deployment. Every
//! setting has a default, so an empty environment yields a working operator.

mod operator;
mod server;

use tracing::warn;

pub use operator::OperatorConfig;
pub use server::ServerConfig;

/// Read a variable through `lookup` and parse it, or return the default
pub(crate) fn var_or_default<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a duration; zero falls back to the default
pub(crate) fn nonzero_or_default<F>(lookup: &F, key: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    match var_or_default(lookup, key, default) {
        0 => {
            warn!(variable = key, default, "Zero is not a valid duration, using the default");
            default
        }
        secs => secs,
    }
}

/// Read a variable through `lookup` as string, or return the default
pub(crate) fn var_or_default_str<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Process environment lookup used by the `from_env` constructors
pub(crate) fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
