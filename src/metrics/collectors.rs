//! Recording interface for worker metrics.
//!
//! `MetricsCollector` wraps the raw Prometheus statics so call sites never
//! deal with label ordering or uninitialized registries. Every method is a
//! no-op until [`super::init_metrics`] has run.

use crate::scheduler::{JobKind, QueueStats};

use super::prometheus::{
    JOBS_IN_PROGRESS, JOBS_TOTAL, JOB_DURATION, QUEUE_DEPTH, SYNC_PRODUCTS_TOTAL,
};

/// Outcome label for a handled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Failed with attempts remaining.
    Retryable,
    /// Failed with the attempt cap exceeded, or a failed sync.
    Failed,
}

impl JobOutcome {
    /// Label value for this outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Retryable => "retryable",
            JobOutcome::Failed => "failed",
        }
    }
}

/// Metrics collector for recording worker operational metrics.
///
/// # Example
///
/// ```ignore
/// use styling_jobs::metrics::{init_metrics, JobOutcome, MetricsCollector};
/// use styling_jobs::scheduler::JobKind;
///
/// init_metrics()?;
/// let collector = MetricsCollector::new();
/// collector.record_job(JobKind::EnrichProduct, JobOutcome::Completed, 3.2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    pub fn new() -> Self {
        Self
    }

    /// Record a handled job and its duration.
    pub fn record_job(&self, kind: JobKind, outcome: JobOutcome, duration_secs: f64) {
        if let Some(jobs_total) = JOBS_TOTAL.get() {
            jobs_total
                .with_label_values(&[kind.as_str(), outcome.as_str()])
                .inc();
        }

        if let Some(job_duration) = JOB_DURATION.get() {
            job_duration
                .with_label_values(&[kind.as_str()])
                .observe(duration_secs);
        }

        tracing::trace!(
            kind = kind.as_str(),
            outcome = outcome.as_str(),
            duration_secs = duration_secs,
            "Recorded job metric"
        );
    }

    /// Mark a job as started.
    pub fn job_started(&self) {
        if let Some(gauge) = JOBS_IN_PROGRESS.get() {
            gauge.inc();
        }
    }

    /// Mark a job as finished.
    pub fn job_finished(&self) {
        if let Some(gauge) = JOBS_IN_PROGRESS.get() {
            gauge.dec();
        }
    }

    /// Publish enrichment queue counts and the sync backlog.
    pub fn set_queue_depths(&self, stats: &QueueStats, sync_pending: Option<u64>) {
        let Some(depth) = QUEUE_DEPTH.get() else {
            return;
        };

        depth.with_label_values(&["enrichment_pending"]).set(stats.pending as f64);
        depth
            .with_label_values(&["enrichment_processing"])
            .set(stats.processing as f64);
        depth.with_label_values(&["enrichment_failed"]).set(stats.failed as f64);
        depth
            .with_label_values(&["enrichment_completed"])
            .set(stats.completed as f64);

        if let Some(sync_pending) = sync_pending {
            depth.with_label_values(&["sync_pending"]).set(sync_pending as f64);
        }
    }

    /// Record the per-product counts of one catalog sync.
    pub fn record_sync_products(&self, synced: u64, errors: u64) {
        if let Some(counter) = SYNC_PRODUCTS_TOTAL.get() {
            counter.with_label_values(&["synced"]).inc_by(synced as f64);
            counter.with_label_values(&["error"]).inc_by(errors as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    #[test]
    fn test_outcome_labels() {
        assert_eq!(JobOutcome::Completed.as_str(), "completed");
        assert_eq!(JobOutcome::Retryable.as_str(), "retryable");
        assert_eq!(JobOutcome::Failed.as_str(), "failed");
    }

    #[test]
    fn test_collector_records_into_registry() {
        init_metrics().expect("init metrics");
        let collector = MetricsCollector::new();

        collector.record_job(JobKind::SyncShopify, JobOutcome::Failed, 0.4);
        collector.set_queue_depths(
            &QueueStats {
                pending: 3,
                processing: 1,
                failed: 0,
                completed: 7,
            },
            Some(2),
        );
        collector.record_sync_products(10, 1);

        let text = export_metrics();
        assert!(text.contains("styling_jobs_job_duration_seconds"));
        assert!(text.contains("queue=\"enrichment_pending\""));
        assert!(text.contains("styling_jobs_sync_products_total"));
    }

    #[test]
    fn test_collector_is_noop_safe() {
        // Must never panic whether or not the registry exists.
        let collector = MetricsCollector::new();
        collector.job_started();
        collector.job_finished();
    }
}
