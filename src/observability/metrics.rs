//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `manila_operator_reconciliations_total` - Object reconciliations by kind and decision
//! - `manila_operator_reconciliation_errors_total` - Failed object reconciliations by kind
//! - `manila_operator_sync_passes_total` - Controller sync passes by controller and result
//! - `manila_operator_sync_pass_duration_seconds` - Duration of controller sync passes
//! - `manila_operator_informer_events_total` - Watch events received by resource
//! - `manila_operator_controllers_degraded` - Number of controllers currently degraded

use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "manila_operator_reconciliations_total",
            "Total number of object reconciliations by kind and decision",
        ),
        &["kind", "decision"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "manila_operator_reconciliation_errors_total",
            "Total number of failed object reconciliations by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static SYNC_PASSES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "manila_operator_sync_passes_total",
            "Total number of controller sync passes by controller and result",
        ),
        &["controller", "result"],
    )
    .expect("Failed to create SYNC_PASSES_TOTAL metric - this should never happen")
});

static SYNC_PASS_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "manila_operator_sync_pass_duration_seconds",
            "Duration of controller sync passes in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["controller"],
    )
    .expect("Failed to create SYNC_PASS_DURATION metric - this should never happen")
});

static INFORMER_EVENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "manila_operator_informer_events_total",
            "Total number of watch events received by resource",
        ),
        &["resource"],
    )
    .expect("Failed to create INFORMER_EVENTS_TOTAL metric - this should never happen")
});

static CONTROLLERS_DEGRADED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "manila_operator_controllers_degraded",
        "Current number of degraded controllers",
    )
    .expect("Failed to create CONTROLLERS_DEGRADED metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only when a metric is registered twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_PASSES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_PASS_DURATION.clone()))?;
    REGISTRY.register(Box::new(INFORMER_EVENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONTROLLERS_DEGRADED.clone()))?;

    Ok(())
}

pub fn record_reconciliation(kind: &str, decision: &str) {
    RECONCILIATIONS_TOTAL
        .with_label_values(&[kind, decision])
        .inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record one finished sync pass
pub fn record_sync_pass(controller: &str, success: bool, duration: f64) {
    let result = if success { "success" } else { "error" };
    SYNC_PASSES_TOTAL
        .with_label_values(&[controller, result])
        .inc();
    SYNC_PASS_DURATION
        .with_label_values(&[controller])
        .observe(duration);
}

pub fn increment_informer_events(resource: &str) {
    INFORMER_EVENTS_TOTAL.with_label_values(&[resource]).inc();
}

pub fn set_controllers_degraded(count: i64) {
    CONTROLLERS_DEGRADED.set(count);
}
