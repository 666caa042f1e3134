//! Prometheus metrics registration and export.
//!
//! This module defines the Prometheus metrics used by the job worker and
//! provides functions for initializing, registering, and exporting them.

use prometheus::{CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all styling_jobs metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total number of jobs handled, labeled by kind and outcome.
pub static JOBS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Job handling duration in seconds, labeled by kind.
pub static JOB_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Number of entries in each queue structure, labeled by queue name.
pub static QUEUE_DEPTH: OnceLock<GaugeVec> = OnceLock::new();

/// Number of jobs currently being processed.
pub static JOBS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Products seen by catalog syncs, labeled by result (synced/error).
pub static SYNC_PRODUCTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Idempotent: a second call builds a throwaway registry and leaves the
/// first one in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let jobs_total = CounterVec::new(
        Opts::new("styling_jobs_jobs_total", "Total number of jobs handled"),
        &["kind", "outcome"],
    )?;

    let job_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "styling_jobs_job_duration_seconds",
            "Job handling duration in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]),
        &["kind"],
    )?;

    let queue_depth = GaugeVec::new(
        Opts::new("styling_jobs_queue_depth", "Number of entries per queue structure"),
        &["queue"],
    )?;

    let jobs_in_progress = Gauge::new(
        "styling_jobs_jobs_in_progress",
        "Number of jobs currently being processed",
    )?;

    let sync_products_total = CounterVec::new(
        Opts::new(
            "styling_jobs_sync_products_total",
            "Products processed by catalog syncs",
        ),
        &["result"],
    )?;

    registry.register(Box::new(jobs_total.clone()))?;
    registry.register(Box::new(job_duration.clone()))?;
    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(jobs_in_progress.clone()))?;
    registry.register(Box::new(sync_products_total.clone()))?;

    // If any of these fail, metrics were already initialized
    let _ = REGISTRY.set(registry);
    let _ = JOBS_TOTAL.set(jobs_total);
    let _ = JOB_DURATION.set(job_duration);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = JOBS_IN_PROGRESS.set(jobs_in_progress);
    let _ = SYNC_PRODUCTS_TOTAL.set(sync_products_total);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead when the registry has not been initialized
/// or encoding fails.
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
