//! Metrics module for Prometheus-based monitoring.
//!
//! This module provides metrics collection and export for curation runs:
//! per-stage record outcomes, failures by error code, stage durations,
//! per-stratum entropy and band counts.
//!
//! Metrics are operational only and never part of the locked outputs.
//!
//! # Example
//!
//! ```ignore
//! use golden_forge::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! // Initialize metrics on startup
//! init_metrics().expect("Failed to initialize metrics");
//!
//! let collector = MetricsCollector::new();
//! collector.record_stage_records("dedup", "dropped", 4);
//!
//! // Text exposition, e.g. for --metrics-out
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

// Re-export key types for convenient access
pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

// Re-export metric constants for direct access when needed
pub use prometheus::{
    BAND_COUNT, REGISTRY, STAGE_DURATION, STAGE_FAILURES_TOTAL, STAGE_RECORDS_TOTAL,
    STRATUM_ENTROPY,
};
