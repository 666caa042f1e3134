//! Process-local job store.
//!
//! Mirrors the Redis layout with plain collections behind a mutex: a sorted
//! set for the enrichment queue, a marker set with a whole-set expiry, and
//! hash maps for attempts, failures and completions. Sync payloads are kept
//! serialized so malformed entries behave as they do in Redis.
//!
//! Used by tests and by dry runs of the CLI that should not touch Redis.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::warn;

use super::job::{
    is_retryable, EnrichmentJobStatus, FailureRecord, Priority, QueueStats, SyncJob,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_PROCESSING_TTL_SECS,
};
use super::store::{require_brand_id, require_product_id, JobStore, JobStoreError};

#[derive(Default)]
struct State {
    /// Ordered by (priority, insertion sequence).
    queue: BTreeSet<(Priority, u64, String)>,
    queued: HashMap<String, (Priority, u64)>,
    seq: u64,
    processing: HashSet<String>,
    processing_expires_at: Option<Instant>,
    attempts: HashMap<String, u32>,
    failed: HashMap<String, FailureRecord>,
    completed: HashMap<String, DateTime<Utc>>,
    sync: VecDeque<String>,
}

impl State {
    fn expire_processing(&mut self) {
        if let Some(at) = self.processing_expires_at {
            if Instant::now() >= at {
                self.processing.clear();
                self.processing_expires_at = None;
            }
        }
    }

    fn remove_queued(&mut self, product_id: &str) {
        if let Some((priority, seq)) = self.queued.remove(product_id) {
            self.queue.remove(&(priority, seq, product_id.to_string()));
        }
    }
}

/// In-memory implementation of [`JobStore`].
pub struct InMemoryJobStore {
    state: Mutex<State>,
    max_attempts: u32,
    processing_ttl: Duration,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobStore {
    /// Creates an empty store with the default attempt cap and marker TTL.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            processing_ttl: Duration::from_secs(DEFAULT_PROCESSING_TTL_SECS),
        }
    }

    /// Sets the attempt cap.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the processing marker expiry.
    pub fn with_processing_ttl(mut self, ttl: Duration) -> Self {
        self.processing_ttl = ttl;
        self
    }

    /// Appends a raw payload to the sync list without serializing it.
    pub fn push_raw_sync_payload(&self, raw: impl Into<String>) {
        self.lock().sync.push_back(raw.into());
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue_enrichment(
        &self,
        product_id: &str,
        priority: Priority,
    ) -> Result<(), JobStoreError> {
        let product_id = require_product_id(product_id)?;
        let mut state = self.lock();

        state.failed.remove(product_id);
        state.completed.remove(product_id);
        state.processing.remove(product_id);

        state.remove_queued(product_id);
        state.seq += 1;
        let seq = state.seq;
        state.queue.insert((priority, seq, product_id.to_string()));
        state.queued.insert(product_id.to_string(), (priority, seq));

        state.attempts.insert(product_id.to_string(), 0);
        Ok(())
    }

    async fn next_enrichment_job(&self) -> Result<Option<String>, JobStoreError> {
        let mut state = self.lock();
        let Some(entry) = state.queue.pop_first() else {
            return Ok(None);
        };
        let (_, _, product_id) = entry;
        state.queued.remove(&product_id);
        Ok(Some(product_id))
    }

    async fn mark_enrichment_processing(&self, product_id: &str) -> Result<u32, JobStoreError> {
        let mut state = self.lock();
        state.expire_processing();

        state.processing.insert(product_id.to_string());
        state.processing_expires_at = Some(Instant::now() + self.processing_ttl);

        let attempts = state.attempts.entry(product_id.to_string()).or_insert(0);
        *attempts += 1;
        Ok(*attempts)
    }

    async fn mark_enrichment_completed(&self, product_id: &str) -> Result<(), JobStoreError> {
        let mut state = self.lock();
        state.processing.remove(product_id);
        state.completed.insert(product_id.to_string(), Utc::now());
        state.attempts.remove(product_id);
        Ok(())
    }

    async fn mark_enrichment_failed(
        &self,
        product_id: &str,
        error: &str,
    ) -> Result<bool, JobStoreError> {
        let mut state = self.lock();
        state.processing.remove(product_id);

        let attempts = state.attempts.get(product_id).copied().unwrap_or(0);
        state
            .failed
            .insert(product_id.to_string(), FailureRecord::now(error, attempts));

        let retryable = is_retryable(attempts, self.max_attempts);
        if !retryable {
            state.attempts.remove(product_id);
        }
        Ok(retryable)
    }

    async fn enrichment_status(
        &self,
        product_id: &str,
    ) -> Result<EnrichmentJobStatus, JobStoreError> {
        let mut state = self.lock();
        state.expire_processing();

        let status = if state.queued.contains_key(product_id) {
            EnrichmentJobStatus::Pending
        } else if state.processing.contains(product_id) {
            EnrichmentJobStatus::Processing
        } else if state.completed.contains_key(product_id) {
            EnrichmentJobStatus::Completed
        } else if state.failed.contains_key(product_id) {
            EnrichmentJobStatus::Failed
        } else {
            EnrichmentJobStatus::Unknown
        };
        Ok(status)
    }

    async fn enrichment_stats(&self) -> QueueStats {
        let mut state = self.lock();
        state.expire_processing();

        QueueStats {
            pending: state.queue.len() as u64,
            processing: state.processing.len() as u64,
            failed: state.failed.len() as u64,
            completed: state.completed.len() as u64,
        }
    }

    async fn enrichment_failure(
        &self,
        product_id: &str,
    ) -> Result<Option<FailureRecord>, JobStoreError> {
        Ok(self.lock().failed.get(product_id).cloned())
    }

    async fn enrichment_attempts(&self, product_id: &str) -> Result<u32, JobStoreError> {
        Ok(self.lock().attempts.get(product_id).copied().unwrap_or(0))
    }

    async fn enqueue_sync_shopify(
        &self,
        brand_id: &str,
        access_token: &str,
    ) -> Result<(), JobStoreError> {
        let brand_id = require_brand_id(brand_id)?;
        let payload = serde_json::to_string(&SyncJob::new(brand_id, access_token))?;
        self.lock().sync.push_back(payload);
        Ok(())
    }

    async fn next_sync_job(&self) -> Result<Option<SyncJob>, JobStoreError> {
        let Some(raw) = self.lock().sync.pop_front() else {
            return Ok(None);
        };

        match serde_json::from_str::<SyncJob>(&raw) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                warn!(error = %e, "Dropping malformed sync payload");
                Ok(None)
            }
        }
    }

    async fn sync_pending(&self) -> Result<u64, JobStoreError> {
        Ok(self.lock().sync.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reenqueue_moves_entry_to_new_priority() {
        let store = InMemoryJobStore::new();
        store.enqueue_enrichment("P1", 100).await.expect("enqueue");
        store.enqueue_enrichment("P2", 80).await.expect("enqueue");
        store.enqueue_enrichment("P1", 50).await.expect("re-enqueue");

        assert_eq!(store.enrichment_stats().await.pending, 2);
        assert_eq!(
            store.next_enrichment_job().await.expect("pop"),
            Some("P1".to_string())
        );
        assert_eq!(
            store.next_enrichment_job().await.expect("pop"),
            Some("P2".to_string())
        );
    }

    #[tokio::test]
    async fn test_enqueue_stores_trimmed_id() {
        let store = InMemoryJobStore::new();
        store.enqueue_enrichment(" P1 ", 100).await.expect("enqueue");

        assert_eq!(
            store.enrichment_status("P1").await.expect("status"),
            EnrichmentJobStatus::Pending
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_marker_expires_as_a_whole() {
        let store = InMemoryJobStore::new().with_processing_ttl(Duration::from_secs(300));
        store.enqueue_enrichment("P1", 100).await.expect("enqueue");
        store.next_enrichment_job().await.expect("pop");
        store.mark_enrichment_processing("P1").await.expect("claim");

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(
            store.enrichment_status("P1").await.expect("status"),
            EnrichmentJobStatus::Processing
        );

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(
            store.enrichment_status("P1").await.expect("status"),
            EnrichmentJobStatus::Unknown
        );
        // Expiry is bookkeeping only: the job is not re-queued.
        assert_eq!(store.enrichment_stats().await.pending, 0);
    }

    #[tokio::test]
    async fn test_malformed_sync_payload_is_dropped() {
        let store = InMemoryJobStore::new();
        store.push_raw_sync_payload("{not json");
        store
            .enqueue_sync_shopify("B1", "tok")
            .await
            .expect("enqueue sync");

        assert_eq!(store.next_sync_job().await.expect("pop"), None);
        assert_eq!(
            store.next_sync_job().await.expect("pop"),
            Some(SyncJob::new("B1", "tok"))
        );
        assert_eq!(store.sync_pending().await.expect("len"), 0);
    }
}
