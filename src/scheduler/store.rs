//! The job store contract shared by every queue backend.
//!
//! A `JobStore` owns all in-flight job state: the enrichment priority queue,
//! processing markers, attempt counters, failure and completion records, and
//! the FIFO sync list. Each primitive is atomic in the backing store, but the
//! multi-step operations (enqueue, claim, complete, fail) are not wrapped in a
//! transaction. Two concurrent enqueues of the same product can interleave;
//! this race is accepted.

use async_trait::async_trait;
use thiserror::Error;

use super::job::{EnrichmentJobStatus, FailureRecord, Job, Priority, QueueStats, SyncJob};

/// Errors that can occur during job store operations.
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// Failed to connect to the backing store.
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    RedisError(#[from] redis::RedisError),

    /// Failed to serialize or parse stored job data.
    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// The product id is empty or a serialized placeholder.
    #[error("Invalid product id: {0:?}")]
    InvalidProductId(String),

    /// The brand id is empty or a serialized placeholder.
    #[error("Invalid brand id: {0:?}")]
    InvalidBrandId(String),
}

/// Queue and status registry for background jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Queues a product for enrichment.
    ///
    /// Clears any failure record, completion record and processing marker
    /// for the product, inserts it at `priority` (re-inserting moves an
    /// existing entry) and resets its attempts to 0.
    async fn enqueue_enrichment(
        &self,
        product_id: &str,
        priority: Priority,
    ) -> Result<(), JobStoreError>;

    /// Removes and returns the queued product with the lowest priority.
    async fn next_enrichment_job(&self) -> Result<Option<String>, JobStoreError>;

    /// Claims a product: sets its processing marker and returns the
    /// incremented attempts counter.
    async fn mark_enrichment_processing(&self, product_id: &str) -> Result<u32, JobStoreError>;

    /// Clears the processing marker, records completion and clears attempts.
    async fn mark_enrichment_completed(&self, product_id: &str) -> Result<(), JobStoreError>;

    /// Clears the processing marker and records the failure.
    ///
    /// Returns whether the job is still retryable (`attempts <= max_attempts`).
    /// A non-retryable job also has its attempts counter cleared. Nothing is
    /// re-enqueued; retry is left to the caller.
    async fn mark_enrichment_failed(
        &self,
        product_id: &str,
        error: &str,
    ) -> Result<bool, JobStoreError>;

    /// Derives the status of a product's enrichment job.
    async fn enrichment_status(
        &self,
        product_id: &str,
    ) -> Result<EnrichmentJobStatus, JobStoreError>;

    /// Returns counts per enrichment structure, or zeros if the store is unreachable.
    async fn enrichment_stats(&self) -> QueueStats;

    /// Returns the failure record for a product, if any.
    async fn enrichment_failure(
        &self,
        product_id: &str,
    ) -> Result<Option<FailureRecord>, JobStoreError>;

    /// Returns the current attempts counter for a product.
    async fn enrichment_attempts(&self, product_id: &str) -> Result<u32, JobStoreError>;

    /// Appends a sync job to the FIFO sync list. No dedup.
    async fn enqueue_sync_shopify(
        &self,
        brand_id: &str,
        access_token: &str,
    ) -> Result<(), JobStoreError>;

    /// Pops the oldest sync job. Malformed payloads are dropped and yield `None`.
    async fn next_sync_job(&self) -> Result<Option<SyncJob>, JobStoreError>;

    /// Returns the number of queued sync payloads.
    async fn sync_pending(&self) -> Result<u64, JobStoreError>;

    /// Returns the next job of any kind.
    ///
    /// Enrichment is always drained first; the sync list is only consulted
    /// when the enrichment queue is empty, so a steady enrichment backlog
    /// starves sync jobs.
    async fn next_job(&self) -> Result<Option<Job>, JobStoreError> {
        if let Some(product_id) = self.next_enrichment_job().await? {
            return Ok(Some(Job::enrich(product_id)));
        }

        Ok(self.next_sync_job().await?.map(Job::SyncShopify))
    }
}

/// Validates a product id for enqueueing.
pub(crate) fn require_product_id(product_id: &str) -> Result<&str, JobStoreError> {
    super::job::validate_id(product_id)
        .ok_or_else(|| JobStoreError::InvalidProductId(product_id.to_string()))
}

/// Validates a brand id for enqueueing.
pub(crate) fn require_brand_id(brand_id: &str) -> Result<&str, JobStoreError> {
    super::job::validate_id(brand_id).ok_or_else(|| JobStoreError::InvalidBrandId(brand_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = JobStoreError::ConnectionFailed("refused".to_string());
        assert!(err.to_string().contains("refused"));

        let err = JobStoreError::InvalidProductId("undefined".to_string());
        assert!(err.to_string().contains("undefined"));
    }

    #[test]
    fn test_require_product_id() {
        assert_eq!(require_product_id(" P1 ").ok(), Some("P1"));
        assert!(matches!(
            require_product_id("null"),
            Err(JobStoreError::InvalidProductId(_))
        ));
        assert!(matches!(
            require_brand_id(""),
            Err(JobStoreError::InvalidBrandId(_))
        ));
    }
}
