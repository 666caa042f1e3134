//! Single polling worker that drains the job store.
//!
//! The worker handles one job at a time: it pops the next job, dispatches it
//! to the handler for its kind and reports the result back to the store.
//! Handler errors stay inside the job; only failures to read the queue reach
//! the outer loop, which logs them, backs off and keeps polling.
//!
//! Scale out by running more worker processes against the same store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PollPolicy;
use crate::enrichment::EnrichmentOutcome;
use crate::error::{EnrichmentError, SyncError};
use crate::metrics::{JobOutcome, MetricsCollector};
use crate::sync::SyncReport;

use super::job::{EnrichJob, Job, SyncJob};
use super::store::{JobStore, JobStoreError};

/// Handler for `enrich-product` jobs.
#[async_trait]
pub trait EnrichmentHandler: Send + Sync {
    /// Enriches one product.
    async fn enrich(&self, product_id: &str) -> Result<EnrichmentOutcome, EnrichmentError>;
}

/// Handler for `sync-shopify` jobs.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    /// Pulls a brand's full catalog and upserts it.
    async fn sync(&self, brand_id: &str, access_token: &str) -> Result<SyncReport, SyncError>;
}

/// What a single [`Worker::run_one`] call did.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Both queues were empty.
    Idle,
    /// An enrichment job completed.
    Enriched { product_id: String, attempts: u32 },
    /// An enrichment job failed and was recorded as such.
    EnrichmentFailed {
        product_id: String,
        attempts: u32,
        retryable: bool,
        error: String,
    },
    /// A sync job finished; per-product errors are counted in the report.
    Synced { brand_id: String, report: SyncReport },
    /// A sync job aborted.
    SyncFailed { brand_id: String, error: String },
}

impl RunOutcome {
    /// Returns `true` unless both queues were empty.
    pub fn did_work(&self) -> bool {
        !matches!(self, RunOutcome::Idle)
    }

    fn metric_outcome(&self) -> Option<JobOutcome> {
        match self {
            RunOutcome::Idle => None,
            RunOutcome::Enriched { .. } | RunOutcome::Synced { .. } => Some(JobOutcome::Completed),
            RunOutcome::EnrichmentFailed {
                retryable: true, ..
            } => Some(JobOutcome::Retryable),
            RunOutcome::EnrichmentFailed { .. } | RunOutcome::SyncFailed { .. } => {
                Some(JobOutcome::Failed)
            }
        }
    }
}

/// A sequential job worker.
pub struct Worker {
    /// Identifier used in log lines.
    id: String,
    store: Arc<dyn JobStore>,
    enrichment: Arc<dyn EnrichmentHandler>,
    sync: Arc<dyn SyncHandler>,
    policy: PollPolicy,
    metrics: MetricsCollector,
}

impl Worker {
    /// Creates a worker with the default poll policy and a random id.
    pub fn new(
        store: Arc<dyn JobStore>,
        enrichment: Arc<dyn EnrichmentHandler>,
        sync: Arc<dyn SyncHandler>,
    ) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("worker-{}", &id[..8]),
            store,
            enrichment,
            sync,
            policy: PollPolicy::default(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Sets the worker id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the poll and backoff policy.
    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the worker's ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the poll policy.
    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Pops and handles at most one job.
    ///
    /// # Errors
    ///
    /// Only a failure to read the next job is returned. Everything that
    /// happens once a job has been popped is reported through [`RunOutcome`].
    pub async fn run_one(&self) -> Result<RunOutcome, JobStoreError> {
        let Some(job) = self.store.next_job().await? else {
            return Ok(RunOutcome::Idle);
        };

        Ok(self.process_job(job).await)
    }

    /// Main worker loop.
    ///
    /// Polls until a shutdown signal arrives (or its sender is dropped). A job
    /// in flight is always finished before the signal is observed.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            worker_id = %self.id,
            poll_interval_ms = self.policy.poll_interval.as_millis() as u64,
            "Worker started"
        );

        let mut idle_cycles: u64 = 0;

        loop {
            match shutdown_rx.try_recv() {
                Ok(())
                | Err(broadcast::error::TryRecvError::Closed)
                | Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    info!(worker_id = %self.id, "Worker received shutdown signal");
                    break;
                }
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            let pause = match self.run_one().await {
                Ok(RunOutcome::Idle) => {
                    idle_cycles += 1;
                    debug!(worker_id = %self.id, idle_cycles, "No jobs available");

                    if self.policy.should_log_idle(idle_cycles) {
                        self.log_idle(idle_cycles).await;
                    }
                    Some(self.policy.poll_interval)
                }
                Ok(_) => {
                    idle_cycles = 0;
                    None
                }
                Err(e) => {
                    error!(
                        worker_id = %self.id,
                        error = %e,
                        backoff_ms = self.policy.error_backoff.as_millis() as u64,
                        "Failed to poll job store"
                    );
                    Some(self.policy.error_backoff)
                }
            };

            if let Some(pause) = pause {
                if sleep_or_shutdown(pause, &mut shutdown_rx).await {
                    info!(worker_id = %self.id, "Worker received shutdown signal");
                    break;
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    async fn log_idle(&self, idle_cycles: u64) {
        let stats = self.store.enrichment_stats().await;
        let sync_pending = self.store.sync_pending().await.ok();
        self.metrics.set_queue_depths(&stats, sync_pending);

        info!(
            worker_id = %self.id,
            idle_cycles,
            pending = stats.pending,
            processing = stats.processing,
            failed = stats.failed,
            completed = stats.completed,
            sync_pending = ?sync_pending,
            "Worker idle"
        );
    }

    async fn process_job(&self, job: Job) -> RunOutcome {
        let kind = job.kind();
        let start_time = Instant::now();
        self.metrics.job_started();

        let outcome = match job {
            Job::EnrichProduct(EnrichJob { product_id }) => {
                self.process_enrichment(product_id).await
            }
            Job::SyncShopify(sync_job) => self.process_sync(sync_job).await,
        };

        self.metrics.job_finished();
        if let Some(metric_outcome) = outcome.metric_outcome() {
            self.metrics
                .record_job(kind, metric_outcome, start_time.elapsed().as_secs_f64());
        }

        outcome
    }

    async fn process_enrichment(&self, product_id: String) -> RunOutcome {
        let start_time = Instant::now();

        let attempts = match self.store.mark_enrichment_processing(&product_id).await {
            Ok(attempts) => attempts,
            Err(e) => {
                error!(
                    worker_id = %self.id,
                    product_id = %product_id,
                    error = %e,
                    "Failed to claim enrichment job"
                );
                let message = format!("Failed to claim job: {}", e);
                return self.fail_enrichment(product_id, 0, message).await;
            }
        };

        info!(
            worker_id = %self.id,
            product_id = %product_id,
            attempts,
            "Processing enrichment job"
        );

        match self.enrichment.enrich(&product_id).await {
            Ok(outcome) => {
                if let Err(e) = self.store.mark_enrichment_completed(&product_id).await {
                    warn!(
                        worker_id = %self.id,
                        product_id = %product_id,
                        error = %e,
                        "Product enriched but completion was not recorded"
                    );
                }

                info!(
                    worker_id = %self.id,
                    product_id = %product_id,
                    attempts,
                    embedded = outcome.embedded,
                    duration_ms = start_time.elapsed().as_millis() as u64,
                    "Product enriched"
                );

                RunOutcome::Enriched {
                    product_id,
                    attempts,
                }
            }
            Err(e) => self.fail_enrichment(product_id, attempts, e.to_string()).await,
        }
    }

    async fn fail_enrichment(&self, product_id: String, attempts: u32, error: String) -> RunOutcome {
        let retryable = match self.store.mark_enrichment_failed(&product_id, &error).await {
            Ok(retryable) => retryable,
            Err(e) => {
                // The attempts counter was not touched, so a re-enqueue is still possible.
                error!(
                    worker_id = %self.id,
                    product_id = %product_id,
                    error = %e,
                    "Failed to record enrichment failure"
                );
                true
            }
        };

        if retryable {
            warn!(
                worker_id = %self.id,
                product_id = %product_id,
                attempts,
                retryable,
                error = %error,
                "Enrichment failed"
            );
        } else {
            error!(
                worker_id = %self.id,
                product_id = %product_id,
                attempts,
                retryable,
                error = %error,
                "Enrichment failed permanently"
            );
        }

        RunOutcome::EnrichmentFailed {
            product_id,
            attempts,
            retryable,
            error,
        }
    }

    async fn process_sync(&self, job: SyncJob) -> RunOutcome {
        let start_time = Instant::now();
        info!(worker_id = %self.id, brand_id = %job.brand_id, "Processing sync job");

        match self.sync.sync(&job.brand_id, &job.access_token).await {
            Ok(report) => {
                self.metrics
                    .record_sync_products(report.synced, report.errors);
                info!(
                    worker_id = %self.id,
                    brand_id = %job.brand_id,
                    synced = report.synced,
                    errors = report.errors,
                    duration_ms = start_time.elapsed().as_millis() as u64,
                    "Catalog sync finished"
                );

                RunOutcome::Synced {
                    brand_id: job.brand_id,
                    report,
                }
            }
            Err(e) => {
                error!(
                    worker_id = %self.id,
                    brand_id = %job.brand_id,
                    error = %e,
                    "Catalog sync failed"
                );

                RunOutcome::SyncFailed {
                    brand_id: job.brand_id,
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Sleeps for `duration`, returning `true` early if shutdown was signalled.
async fn sleep_or_shutdown(duration: Duration, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown_rx.recv() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::memory::InMemoryJobStore;
    use crate::storage::ProductAttributes;

    struct OkEnrichment;

    #[async_trait]
    impl EnrichmentHandler for OkEnrichment {
        async fn enrich(&self, _product_id: &str) -> Result<EnrichmentOutcome, EnrichmentError> {
            Ok(EnrichmentOutcome {
                attributes: ProductAttributes::default(),
                embedded: false,
            })
        }
    }

    struct FailingEnrichment;

    #[async_trait]
    impl EnrichmentHandler for FailingEnrichment {
        async fn enrich(&self, product_id: &str) -> Result<EnrichmentOutcome, EnrichmentError> {
            Err(EnrichmentError::ProductNotFound(product_id.to_string()))
        }
    }

    struct CountingSync;

    #[async_trait]
    impl SyncHandler for CountingSync {
        async fn sync(&self, _brand_id: &str, _token: &str) -> Result<SyncReport, SyncError> {
            Ok(SyncReport {
                synced: 2,
                errors: 1,
            })
        }
    }

    fn worker(store: Arc<InMemoryJobStore>, enrichment: Arc<dyn EnrichmentHandler>) -> Worker {
        Worker::new(store, enrichment, Arc::new(CountingSync)).with_id("test-worker")
    }

    #[test]
    fn test_run_outcome_metric_mapping() {
        assert_eq!(RunOutcome::Idle.metric_outcome(), None);
        assert!(!RunOutcome::Idle.did_work());

        let failed = RunOutcome::EnrichmentFailed {
            product_id: "P1".to_string(),
            attempts: 4,
            retryable: false,
            error: "x".to_string(),
        };
        assert!(failed.did_work());
        assert_eq!(failed.metric_outcome(), Some(JobOutcome::Failed));
    }

    #[tokio::test]
    async fn test_run_one_idle_on_empty_store() {
        let store = Arc::new(InMemoryJobStore::new());
        let worker = worker(store, Arc::new(OkEnrichment));
        assert_eq!(worker.run_one().await.expect("run"), RunOutcome::Idle);
    }

    #[tokio::test]
    async fn test_run_one_completes_enrichment() {
        let store = Arc::new(InMemoryJobStore::new());
        store.enqueue_enrichment("P1", 100).await.expect("enqueue");
        let worker = worker(store.clone(), Arc::new(OkEnrichment));

        let outcome = worker.run_one().await.expect("run");
        assert_eq!(
            outcome,
            RunOutcome::Enriched {
                product_id: "P1".to_string(),
                attempts: 1
            }
        );
        assert_eq!(store.enrichment_stats().await.completed, 1);
    }

    #[tokio::test]
    async fn test_run_one_records_failure() {
        let store = Arc::new(InMemoryJobStore::new());
        store.enqueue_enrichment("P1", 100).await.expect("enqueue");
        let worker = worker(store.clone(), Arc::new(FailingEnrichment));

        match worker.run_one().await.expect("run") {
            RunOutcome::EnrichmentFailed {
                attempts,
                retryable,
                ..
            } => {
                assert_eq!(attempts, 1);
                assert!(retryable);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(store
            .enrichment_failure("P1")
            .await
            .expect("failure")
            .is_some());
    }

    #[tokio::test]
    async fn test_run_one_reports_sync_counts() {
        let store = Arc::new(InMemoryJobStore::new());
        store.enqueue_sync_shopify("B1", "tok").await.expect("enqueue");
        let worker = worker(store, Arc::new(OkEnrichment));

        assert_eq!(
            worker.run_one().await.expect("run"),
            RunOutcome::Synced {
                brand_id: "B1".to_string(),
                report: SyncReport {
                    synced: 2,
                    errors: 1
                }
            }
        );
    }

    #[tokio::test]
    async fn test_run_stops_when_sender_dropped() {
        let store = Arc::new(InMemoryJobStore::new());
        let worker = worker(store, Arc::new(OkEnrichment));
        let (tx, rx) = broadcast::channel(1);
        drop(tx);

        // Returns immediately instead of polling forever.
        worker.run(rx).await;
    }
}
