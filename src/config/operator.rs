//! # Operator Configuration
//!
//! Operator-level settings loaded from environment variables.

use std::time::Duration;

use super::{nonzero_or_default, process_env, var_or_default_str};
use crate::constants::{
    DEFAULT_BACKOFF_MAX_SECS, DEFAULT_BACKOFF_MIN_SECS, DEFAULT_CLOUD_CONFIG_NAME,
    DEFAULT_CLOUD_CONFIG_NAMESPACE, DEFAULT_INFORMER_SYNC_TIMEOUT_SECS, DEFAULT_OPERAND_NAMESPACE,
    DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_SHUTDOWN_GRACE_PERIOD_SECS,
    DEFAULT_STORE_CALL_TIMEOUT_SECS, OPERAND_NAMESPACE_ENV,
};

/// Operator-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace the driver is installed into
    pub operand_namespace: String,
    /// Namespace of the cloud provider ConfigMap to copy
    pub cloud_config_namespace: String,
    /// Name of the cloud provider ConfigMap to copy
    pub cloud_config_name: String,
    /// Periodic resync interval for every controller (seconds)
    pub resync_interval_secs: u64,
    /// How long runnables get to stop after cancellation (seconds)
    pub shutdown_grace_period_secs: u64,
    /// How long to wait for informers' initial list (seconds)
    pub informer_sync_timeout_secs: u64,
    /// Deadline for a single cluster store call (seconds)
    pub store_call_timeout_secs: u64,
    /// Fibonacci backoff floor after a failed pass (seconds)
    pub backoff_min_secs: u64,
    /// Fibonacci backoff ceiling after a failed pass (seconds)
    pub backoff_max_secs: u64,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(process_env)
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            operand_namespace: var_or_default_str(
                &lookup,
                OPERAND_NAMESPACE_ENV,
                DEFAULT_OPERAND_NAMESPACE,
            ),
            cloud_config_namespace: var_or_default_str(
                &lookup,
                "CLOUD_CONFIG_NAMESPACE",
                DEFAULT_CLOUD_CONFIG_NAMESPACE,
            ),
            cloud_config_name: var_or_default_str(
                &lookup,
                "CLOUD_CONFIG_NAME",
                DEFAULT_CLOUD_CONFIG_NAME,
            ),
            resync_interval_secs: nonzero_or_default(
                &lookup,
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            shutdown_grace_period_secs: nonzero_or_default(
                &lookup,
                "SHUTDOWN_GRACE_PERIOD_SECS",
                DEFAULT_SHUTDOWN_GRACE_PERIOD_SECS,
            ),
            informer_sync_timeout_secs: nonzero_or_default(
                &lookup,
                "INFORMER_SYNC_TIMEOUT_SECS",
                DEFAULT_INFORMER_SYNC_TIMEOUT_SECS,
            ),
            store_call_timeout_secs: nonzero_or_default(
                &lookup,
                "STORE_CALL_TIMEOUT_SECS",
                DEFAULT_STORE_CALL_TIMEOUT_SECS,
            ),
            backoff_min_secs: nonzero_or_default(
                &lookup,
                "BACKOFF_MIN_SECS",
                DEFAULT_BACKOFF_MIN_SECS,
            ),
            backoff_max_secs: nonzero_or_default(
                &lookup,
                "BACKOFF_MAX_SECS",
                DEFAULT_BACKOFF_MAX_SECS,
            ),
            log_level: var_or_default_str(&lookup, "LOG_LEVEL", "INFO"),
            log_format: var_or_default_str(&lookup, "LOG_FORMAT", "json"),
        }
    }

    /// Get resync interval duration
    #[must_use]
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Get shutdown grace period duration
    #[must_use]
    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period_secs)
    }

    /// Get informer sync timeout duration
    #[must_use]
    pub fn informer_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.informer_sync_timeout_secs)
    }

    /// Get store call timeout duration
    #[must_use]
    pub fn store_call_timeout(&self) -> Duration {
        Duration::from_secs(self.store_call_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = OperatorConfig::from_lookup(|_| None);

        assert_eq!(config.operand_namespace, "openshift-manila-csi-driver");
        assert_eq!(config.cloud_config_namespace, "openshift-config");
        assert_eq!(config.resync_interval(), Duration::from_secs(1200));
        assert_eq!(config.shutdown_grace_period(), Duration::from_secs(30));
        assert_eq!(config.log_format, "json");
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPERAND_NAMESPACE", "manila"),
            ("RESYNC_INTERVAL_SECS", " 60 "),
            ("BACKOFF_MAX_SECS", "not-a-number"),
            ("LOG_FORMAT", ""),
        ]);
        let config = OperatorConfig::from_lookup(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.operand_namespace, "manila");
        assert_eq!(config.resync_interval_secs, 60);
        // Unparsable and empty values fall back to defaults
        assert_eq!(config.backoff_max_secs, 300);
        assert_eq!(config.log_format, "json");
    }

    #[test]
    fn test_zero_durations_fall_back_to_defaults() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("RESYNC_INTERVAL_SECS", "0"),
            ("SHUTDOWN_GRACE_PERIOD_SECS", "0"),
            ("INFORMER_SYNC_TIMEOUT_SECS", " 0 "),
            ("STORE_CALL_TIMEOUT_SECS", "0"),
            ("BACKOFF_MIN_SECS", "0"),
        ]);
        let config = OperatorConfig::from_lookup(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.resync_interval(), Duration::from_secs(1200));
        assert_eq!(config.shutdown_grace_period(), Duration::from_secs(30));
        assert_eq!(config.informer_sync_timeout(), Duration::from_secs(60));
        assert_eq!(config.store_call_timeout(), Duration::from_secs(30));
        assert_eq!(config.backoff_min_secs, 5);
    }
}
