//! Worker loop end to end over the in-memory store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use styling_jobs::config::PollPolicy;
use styling_jobs::enrichment::EnrichmentOutcome;
use styling_jobs::error::{EnrichmentError, LlmError, SyncError};
use styling_jobs::scheduler::{
    EnrichmentHandler, EnrichmentJobStatus, FailureRecord, InMemoryJobStore, JobStore,
    JobStoreError, Priority, QueueStats, SyncHandler, SyncJob, Worker,
};
use styling_jobs::storage::ProductAttributes;
use styling_jobs::sync::SyncReport;
use tokio::sync::broadcast;

/// Fails every product whose id starts with `bad`.
#[derive(Default)]
struct RecordingEnrichment {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl EnrichmentHandler for RecordingEnrichment {
    async fn enrich(&self, product_id: &str) -> Result<EnrichmentOutcome, EnrichmentError> {
        self.seen.lock().unwrap().push(product_id.to_string());
        if product_id.starts_with("bad") {
            return Err(EnrichmentError::Llm(LlmError::ParseError(
                "not json".to_string(),
            )));
        }
        Ok(EnrichmentOutcome {
            attributes: ProductAttributes::default(),
            embedded: true,
        })
    }
}

#[derive(Default)]
struct RecordingSync {
    brands: Mutex<Vec<String>>,
}

#[async_trait]
impl SyncHandler for RecordingSync {
    async fn sync(&self, brand_id: &str, _access_token: &str) -> Result<SyncReport, SyncError> {
        self.brands.lock().unwrap().push(brand_id.to_string());
        if brand_id == "B404" {
            return Err(SyncError::BrandNotFound(brand_id.to_string()));
        }
        Ok(SyncReport {
            synced: 3,
            errors: 0,
        })
    }
}

/// Delegates to an in-memory store but fails the first `failures` polls.
struct FlakyStore {
    inner: InMemoryJobStore,
    failures: AtomicU32,
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn enqueue_enrichment(
        &self,
        product_id: &str,
        priority: Priority,
    ) -> Result<(), JobStoreError> {
        self.inner.enqueue_enrichment(product_id, priority).await
    }

    async fn next_enrichment_job(&self) -> Result<Option<String>, JobStoreError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(JobStoreError::ConnectionFailed("connection refused".to_string()));
        }
        self.inner.next_enrichment_job().await
    }

    async fn mark_enrichment_processing(&self, product_id: &str) -> Result<u32, JobStoreError> {
        self.inner.mark_enrichment_processing(product_id).await
    }

    async fn mark_enrichment_completed(&self, product_id: &str) -> Result<(), JobStoreError> {
        self.inner.mark_enrichment_completed(product_id).await
    }

    async fn mark_enrichment_failed(
        &self,
        product_id: &str,
        error: &str,
    ) -> Result<bool, JobStoreError> {
        self.inner.mark_enrichment_failed(product_id, error).await
    }

    async fn enrichment_status(
        &self,
        product_id: &str,
    ) -> Result<EnrichmentJobStatus, JobStoreError> {
        self.inner.enrichment_status(product_id).await
    }

    async fn enrichment_stats(&self) -> QueueStats {
        self.inner.enrichment_stats().await
    }

    async fn enrichment_failure(
        &self,
        product_id: &str,
    ) -> Result<Option<FailureRecord>, JobStoreError> {
        self.inner.enrichment_failure(product_id).await
    }

    async fn enrichment_attempts(&self, product_id: &str) -> Result<u32, JobStoreError> {
        self.inner.enrichment_attempts(product_id).await
    }

    async fn enqueue_sync_shopify(
        &self,
        brand_id: &str,
        access_token: &str,
    ) -> Result<(), JobStoreError> {
        self.inner.enqueue_sync_shopify(brand_id, access_token).await
    }

    async fn next_sync_job(&self) -> Result<Option<SyncJob>, JobStoreError> {
        self.inner.next_sync_job().await
    }

    async fn sync_pending(&self) -> Result<u64, JobStoreError> {
        self.inner.sync_pending().await
    }
}

fn fast_policy() -> PollPolicy {
    PollPolicy::default()
        .with_poll_interval(Duration::from_millis(100))
        .with_error_backoff(Duration::from_millis(250))
        .with_idle_log_every(5)
}

async fn run_for(worker: Worker, duration: Duration) {
    let worker = Arc::new(worker);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run(shutdown_rx).await })
    };

    tokio::time::sleep(duration).await;
    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker should stop after shutdown")
        .expect("worker task should not panic");
}

#[tokio::test(start_paused = true)]
async fn test_worker_drains_both_queues_in_order() {
    let store = Arc::new(InMemoryJobStore::new());
    let enrichment = Arc::new(RecordingEnrichment::default());
    let sync = Arc::new(RecordingSync::default());

    store.enqueue_sync_shopify("B1", "tok").await.unwrap();
    store.enqueue_enrichment("P-low", 100).await.unwrap();
    store.enqueue_enrichment("bad-1", 100).await.unwrap();
    store.enqueue_enrichment("P-urgent", 50).await.unwrap();

    let worker = Worker::new(store.clone(), enrichment.clone(), sync.clone())
        .with_id("test-worker")
        .with_policy(fast_policy());
    run_for(worker, Duration::from_secs(2)).await;

    assert_eq!(
        *enrichment.seen.lock().unwrap(),
        vec!["P-urgent", "P-low", "bad-1"]
    );
    assert_eq!(*sync.brands.lock().unwrap(), vec!["B1"]);

    assert_eq!(
        store.enrichment_status("P-urgent").await.unwrap(),
        EnrichmentJobStatus::Completed
    );
    assert_eq!(
        store.enrichment_status("bad-1").await.unwrap(),
        EnrichmentJobStatus::Failed
    );
    let failure = store.enrichment_failure("bad-1").await.unwrap().unwrap();
    assert!(failure.error.contains("not json"));
    assert_eq!(failure.attempts, 1);

    let stats = store.enrichment_stats().await;
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(store.sync_pending().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_jobs_are_not_retried_automatically() {
    let store = Arc::new(InMemoryJobStore::new());
    let enrichment = Arc::new(RecordingEnrichment::default());

    store.enqueue_enrichment("bad-1", 100).await.unwrap();

    let worker = Worker::new(
        store.clone(),
        enrichment.clone(),
        Arc::new(RecordingSync::default()),
    )
    .with_policy(fast_policy());
    run_for(worker, Duration::from_secs(5)).await;

    assert_eq!(enrichment.seen.lock().unwrap().len(), 1);
    assert_eq!(store.enrichment_stats().await.pending, 0);
}

#[tokio::test(start_paused = true)]
async fn test_sync_error_does_not_stop_the_loop() {
    let store = Arc::new(InMemoryJobStore::new());
    let sync = Arc::new(RecordingSync::default());

    store.enqueue_sync_shopify("B404", "tok").await.unwrap();
    store.enqueue_sync_shopify("B2", "tok").await.unwrap();

    let worker = Worker::new(
        store.clone(),
        Arc::new(RecordingEnrichment::default()),
        sync.clone(),
    )
    .with_policy(fast_policy());
    run_for(worker, Duration::from_secs(1)).await;

    assert_eq!(*sync.brands.lock().unwrap(), vec!["B404", "B2"]);
}

#[tokio::test(start_paused = true)]
async fn test_store_errors_back_off_and_recover() {
    let store = Arc::new(FlakyStore {
        inner: InMemoryJobStore::new(),
        failures: AtomicU32::new(3),
    });
    let enrichment = Arc::new(RecordingEnrichment::default());
    store.enqueue_enrichment("P1", 100).await.unwrap();

    let worker = Worker::new(
        store.clone(),
        enrichment.clone(),
        Arc::new(RecordingSync::default()),
    )
    .with_policy(fast_policy());
    run_for(worker, Duration::from_secs(2)).await;

    assert_eq!(*enrichment.seen.lock().unwrap(), vec!["P1"]);
    assert_eq!(
        store.enrichment_status("P1").await.unwrap(),
        EnrichmentJobStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_an_idle_worker() {
    let store = Arc::new(InMemoryJobStore::new());
    let worker = Worker::new(
        store,
        Arc::new(RecordingEnrichment::default()),
        Arc::new(RecordingSync::default()),
    )
    .with_policy(PollPolicy::default().with_poll_interval(Duration::from_secs(60)));

    // The shutdown must interrupt the long idle sleep.
    run_for(worker, Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_dropped_sender_stops_the_worker() {
    let worker = Worker::new(
        Arc::new(InMemoryJobStore::new()),
        Arc::new(RecordingEnrichment::default()),
        Arc::new(RecordingSync::default()),
    )
    .with_policy(fast_policy());

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    drop(shutdown_tx);

    tokio::time::timeout(Duration::from_secs(5), worker.run(shutdown_rx))
        .await
        .expect("worker should stop once the sender is gone");
}
