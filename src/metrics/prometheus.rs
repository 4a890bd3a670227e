//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by golden-forge and
//! provides functions for initializing, registering, and exporting metrics.

use prometheus::{CounterVec, Encoder, GaugeVec, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::{Mutex, OnceLock};

/// Global Prometheus registry for all golden-forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Records leaving each stage, labeled by stage and outcome
/// (kept, dropped, trimmed, accepted, rejected, ...).
pub static STAGE_RECORDS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Stage failures, labeled by stage and error code.
pub static STAGE_FAILURES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Stage wall-clock duration in seconds, labeled by stage.
pub static STAGE_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Cluster-assignment entropy of each stratum.
pub static STRATUM_ENTROPY: OnceLock<GaugeVec> = OnceLock::new();

/// Final item count per length band.
pub static BAND_COUNT: OnceLock<GaugeVec> = OnceLock::new();

/// Serializes initialization so every static comes from the same registry.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Initialize all metrics and register them with the registry.
///
/// Should be called once at startup. Recording through
/// [`MetricsCollector`](super::MetricsCollector) is a no-op until then.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let stage_records_total = CounterVec::new(
        Opts::new(
            "golden_stage_records_total",
            "Records leaving each stage by outcome",
        ),
        &["stage", "outcome"],
    )?;

    let stage_failures_total = CounterVec::new(
        Opts::new("golden_stage_failures_total", "Stage failures by error code"),
        &["stage", "code"],
    )?;

    let stage_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "golden_stage_duration_seconds",
            "Stage execution duration in seconds",
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        &["stage"],
    )?;

    let stratum_entropy = GaugeVec::new(
        Opts::new(
            "golden_stratum_entropy",
            "Shannon entropy of cluster assignment per stratum",
        ),
        &["stratum"],
    )?;

    let band_count = GaugeVec::new(
        Opts::new("golden_band_count", "Final items per length band"),
        &["band"],
    )?;

    registry.register(Box::new(stage_records_total.clone()))?;
    registry.register(Box::new(stage_failures_total.clone()))?;
    registry.register(Box::new(stage_duration.clone()))?;
    registry.register(Box::new(stratum_entropy.clone()))?;
    registry.register(Box::new(band_count.clone()))?;

    let _ = STAGE_RECORDS_TOTAL.set(stage_records_total);
    let _ = STAGE_FAILURES_TOTAL.set(stage_failures_total);
    let _ = STAGE_DURATION.set(stage_duration);
    let _ = STRATUM_ENTROPY.set(stratum_entropy);
    let _ = BAND_COUNT.set(band_count);
    let _ = REGISTRY.set(registry);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line if the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
