//! High-level recording interface over the raw Prometheus metrics.
//!
//! The pipeline holds a `MetricsCollector` and calls it after each stage.
//! Every method is a no-op until `init_metrics()` has run, so library users
//! and tests never need to set up a registry.

use super::prometheus::{
    BAND_COUNT, STAGE_DURATION, STAGE_FAILURES_TOTAL, STAGE_RECORDS_TOTAL, STRATUM_ENTROPY,
};

/// Metrics collector for recording curation run metrics.
///
/// # Example
///
/// ```ignore
/// use golden_forge::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
/// collector.record_stage_records("dedup", "kept", 70);
/// collector.record_stage_duration("dedup", 0.12);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    pub fn new() -> Self {
        Self
    }

    /// Record `count` records leaving `stage` with `outcome`.
    pub fn record_stage_records(&self, stage: &str, outcome: &str, count: usize) {
        if let Some(records) = STAGE_RECORDS_TOTAL.get() {
            records
                .with_label_values(&[stage, outcome])
                .inc_by(count as f64);
        }

        tracing::trace!(stage, outcome, count, "Recorded stage records metric");
    }

    /// Record a stage failure by error code.
    pub fn record_failure(&self, stage: &str, code: &str) {
        if let Some(failures) = STAGE_FAILURES_TOTAL.get() {
            failures.with_label_values(&[stage, code]).inc();
        }

        tracing::trace!(stage, code, "Recorded stage failure metric");
    }

    /// Record how long `stage` took.
    pub fn record_stage_duration(&self, stage: &str, duration_secs: f64) {
        if let Some(duration) = STAGE_DURATION.get() {
            duration.with_label_values(&[stage]).observe(duration_secs);
        }

        tracing::trace!(stage, duration_secs, "Recorded stage duration metric");
    }

    /// Set the entropy gauge of one stratum.
    pub fn set_stratum_entropy(&self, stratum: &str, entropy: f64) {
        if let Some(gauge) = STRATUM_ENTROPY.get() {
            gauge.with_label_values(&[stratum]).set(entropy);
        }
    }

    /// Set the count gauge of one band.
    pub fn set_band_count(&self, band: &str, count: usize) {
        if let Some(gauge) = BAND_COUNT.get() {
            gauge.with_label_values(&[band]).set(count as f64);
        }
    }
}
