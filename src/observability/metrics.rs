//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `gitopssets_reconciliations_total` - Total number of reconciliations
//! - `gitopssets_reconciliation_errors_total` - Reconciliation errors by error class
//! - `gitopssets_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `gitopssets_resources_created_total` - Resources created from templates
//! - `gitopssets_resources_updated_total` - Resources updated from templates
//! - `gitopssets_resources_pruned_total` - Resources removed from the inventory
//! - `gitopssets_generator_errors_total` - Generator failures by generator kind
//! - `gitopssets_artifact_fetches_total` - Source artifact downloads
//! - `gitopssets_artifact_fetch_errors_total` - Failed source artifact downloads
//! - `gitopssets_artifact_fetch_duration_seconds` - Duration of artifact downloads
//! - `gitopssets_requeues_total` - Requeues by reason

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gitopssets_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gitopssets_reconciliation_errors_total",
            "Total number of reconciliation errors by error class",
        ),
        &["class"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "gitopssets_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static RESOURCES_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gitopssets_resources_created_total",
        "Total number of resources created from templates",
    )
    .expect("Failed to create RESOURCES_CREATED_TOTAL metric - this should never happen")
});

static RESOURCES_UPDATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gitopssets_resources_updated_total",
        "Total number of resources updated from templates",
    )
    .expect("Failed to create RESOURCES_UPDATED_TOTAL metric - this should never happen")
});

static RESOURCES_PRUNED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gitopssets_resources_pruned_total",
        "Total number of resources pruned from the inventory",
    )
    .expect("Failed to create RESOURCES_PRUNED_TOTAL metric - this should never happen")
});

static GENERATOR_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gitopssets_generator_errors_total",
            "Total number of generator errors by generator kind",
        ),
        &["generator"],
    )
    .expect("Failed to create GENERATOR_ERRORS_TOTAL metric - this should never happen")
});

static ARTIFACT_FETCHES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gitopssets_artifact_fetches_total",
        "Total number of source artifact downloads",
    )
    .expect("Failed to create ARTIFACT_FETCHES_TOTAL metric - this should never happen")
});

static ARTIFACT_FETCH_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gitopssets_artifact_fetch_errors_total",
        "Total number of failed source artifact downloads",
    )
    .expect("Failed to create ARTIFACT_FETCH_ERRORS_TOTAL metric - this should never happen")
});

static ARTIFACT_FETCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "gitopssets_artifact_fetch_duration_seconds",
            "Duration of source artifact downloads in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create ARTIFACT_FETCH_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("gitopssets_requeues_total", "Total number of requeues by reason"),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(RESOURCES_CREATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOURCES_UPDATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOURCES_PRUNED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GENERATOR_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ARTIFACT_FETCHES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ARTIFACT_FETCH_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ARTIFACT_FETCH_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

/// Count a failed reconciliation under its error class
pub fn increment_reconciliation_errors(class: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[class]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_resources_created() {
    RESOURCES_CREATED_TOTAL.inc();
}

pub fn increment_resources_updated() {
    RESOURCES_UPDATED_TOTAL.inc();
}

pub fn increment_resources_pruned() {
    RESOURCES_PRUNED_TOTAL.inc();
}

pub fn increment_generator_errors(generator: &str) {
    GENERATOR_ERRORS_TOTAL.with_label_values(&[generator]).inc();
}

pub fn increment_artifact_fetches() {
    ARTIFACT_FETCHES_TOTAL.inc();
}

pub fn increment_artifact_fetch_errors() {
    ARTIFACT_FETCH_ERRORS_TOTAL.inc();
}

pub fn observe_artifact_fetch_duration(duration: f64) {
    ARTIFACT_FETCH_DURATION.observe(duration);
}

/// Count a requeue; `reason` is `interval` or an error class
pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // Registration happens once per process; a second attempt reports AlreadyReg
        let first = register_metrics();
        let second = register_metrics();
        assert!(first.is_ok() || second.is_err());
    }

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        let after = RECONCILIATIONS_TOTAL.get();
        assert!(after > before);
    }

    #[test]
    fn test_reconciliation_errors_are_labelled_by_class() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["configuration"])
            .get();
        increment_reconciliation_errors("configuration");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["configuration"])
            .get();
        assert!(after > before);
    }

    #[test]
    fn test_generator_errors_are_labelled_by_kind() {
        let before = GENERATOR_ERRORS_TOTAL.with_label_values(&["Matrix"]).get();
        increment_generator_errors("Matrix");
        assert!(GENERATOR_ERRORS_TOTAL.with_label_values(&["Matrix"]).get() > before);
    }

    #[test]
    fn test_observe_durations() {
        observe_reconciliation_duration(1.5);
        observe_artifact_fetch_duration(0.2);
        assert!(ARTIFACT_FETCH_DURATION.get_sample_count() >= 1);
    }
}
