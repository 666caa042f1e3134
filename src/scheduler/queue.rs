//! Redis-backed job store.
//!
//! # Key Layout
//!
//! All keys live under a configurable prefix (`jobs` by default):
//!
//! - `{prefix}:enrichment:queue`: Sorted set of product ids, lowest score pops first
//! - `{prefix}:enrichment:seq`: Counter used to break priority ties by insertion order
//! - `{prefix}:enrichment:processing`: Set of claimed product ids, whole-key expiry
//! - `{prefix}:enrichment:attempts`: Hash of product id to claim count
//! - `{prefix}:enrichment:failed`: Hash of product id to `{error, attempts, failedAt}`
//! - `{prefix}:enrichment:completed`: Hash of product id to completion timestamp
//! - `{prefix}:sync:shopify`: List of `{brandId, accessToken}` payloads, FIFO
//!
//! # Scores
//!
//! A sorted set breaks score ties by member name, not by insertion. The score
//! therefore packs the priority above a per-enqueue sequence number:
//! `priority * 2^32 + (seq mod 2^32)`. With `i16` priorities the magnitude
//! stays below 2^47 and is exact as an `f64`. Negative priorities give
//! negative scores, which sort ahead of every non-negative one.
//!
//! # Reliability
//!
//! Every command used here is atomic on its own. Enqueue, claim, complete and
//! fail are sequences of commands and can interleave with each other. Nothing
//! recovers a job whose worker dies after the claim: its marker expires and
//! the job stays lost until it is enqueued again.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use super::job::{
    is_retryable, EnrichmentJobStatus, FailureRecord, Priority, QueueStats, SyncJob,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_PROCESSING_TTL_SECS,
};
use super::store::{require_brand_id, require_product_id, JobStore, JobStoreError};

/// Default namespace for all job keys.
pub const DEFAULT_KEY_PREFIX: &str = "jobs";

const SEQUENCE_SPAN: f64 = 4_294_967_296.0;

/// Names of the Redis keys used by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    /// Sorted set of queued product ids.
    pub enrichment_queue: String,
    /// Tie-break sequence counter.
    pub enrichment_seq: String,
    /// Set of claimed product ids.
    pub enrichment_processing: String,
    /// Hash of attempt counters.
    pub enrichment_attempts: String,
    /// Hash of failure records.
    pub enrichment_failed: String,
    /// Hash of completion timestamps.
    pub enrichment_completed: String,
    /// List of sync payloads.
    pub sync_queue: String,
}

impl KeySpace {
    /// Builds the key names under `prefix`.
    pub fn new(prefix: &str) -> Self {
        Self {
            enrichment_queue: format!("{}:enrichment:queue", prefix),
            enrichment_seq: format!("{}:enrichment:seq", prefix),
            enrichment_processing: format!("{}:enrichment:processing", prefix),
            enrichment_attempts: format!("{}:enrichment:attempts", prefix),
            enrichment_failed: format!("{}:enrichment:failed", prefix),
            enrichment_completed: format!("{}:enrichment:completed", prefix),
            sync_queue: format!("{}:sync:shopify", prefix),
        }
    }

    fn all(&self) -> [&str; 7] {
        [
            &self.enrichment_queue,
            &self.enrichment_seq,
            &self.enrichment_processing,
            &self.enrichment_attempts,
            &self.enrichment_failed,
            &self.enrichment_completed,
            &self.sync_queue,
        ]
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

/// Packs a priority and an insertion sequence into a sorted set score.
pub fn enrichment_score(priority: Priority, seq: u64) -> f64 {
    f64::from(priority) * SEQUENCE_SPAN + (seq % (1u64 << 32)) as f64
}

/// Redis implementation of [`JobStore`].
///
/// The connection is injected or opened explicitly; there is no shared
/// global connection.
pub struct RedisJobStore {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    keys: KeySpace,
    max_attempts: u32,
    processing_ttl: Duration,
}

impl RedisJobStore {
    /// Connects to Redis and creates a store under `key_prefix`.
    ///
    /// # Errors
    ///
    /// Returns `JobStoreError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str, key_prefix: &str) -> Result<Self, JobStoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| JobStoreError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| JobStoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(redis, key_prefix))
    }

    /// Creates a store from an existing ConnectionManager.
    pub fn from_connection(redis: ConnectionManager, key_prefix: &str) -> Self {
        Self {
            redis,
            keys: KeySpace::new(key_prefix),
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

    /// Returns the key names used by this store.
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Deletes every key in this store's namespace.
    ///
    /// **Warning**: This permanently deletes all queued jobs and records.
    pub async fn clear(&self) -> Result<(), JobStoreError> {
        let mut conn = self.redis.clone();

        let mut pipe = redis::pipe();
        for key in self.keys.all() {
            pipe.del(key).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;

        Ok(())
    }

    async fn try_stats(&self) -> Result<QueueStats, JobStoreError> {
        let mut conn = self.redis.clone();

        let (pending, processing, failed, completed): (u64, u64, u64, u64) = redis::pipe()
            .zcard(&self.keys.enrichment_queue)
            .scard(&self.keys.enrichment_processing)
            .hlen(&self.keys.enrichment_failed)
            .hlen(&self.keys.enrichment_completed)
            .query_async(&mut conn)
            .await?;

        Ok(QueueStats {
            pending,
            processing,
            failed,
            completed,
        })
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn enqueue_enrichment(
        &self,
        product_id: &str,
        priority: Priority,
    ) -> Result<(), JobStoreError> {
        let product_id = require_product_id(product_id)?;
        let mut conn = self.redis.clone();

        conn.hdel::<_, _, ()>(&self.keys.enrichment_failed, product_id)
            .await?;
        conn.hdel::<_, _, ()>(&self.keys.enrichment_completed, product_id)
            .await?;
        conn.srem::<_, _, ()>(&self.keys.enrichment_processing, product_id)
            .await?;

        let seq: u64 = conn.incr(&self.keys.enrichment_seq, 1u64).await?;
        conn.zadd::<_, _, _, ()>(
            &self.keys.enrichment_queue,
            product_id,
            enrichment_score(priority, seq),
        )
        .await?;

        conn.hset::<_, _, _, ()>(&self.keys.enrichment_attempts, product_id, 0u32)
            .await?;

        Ok(())
    }

    async fn next_enrichment_job(&self) -> Result<Option<String>, JobStoreError> {
        let mut conn = self.redis.clone();

        // ZPOPMIN replies with a flat [member, score] array.
        let popped: Vec<String> = redis::cmd("ZPOPMIN")
            .arg(&self.keys.enrichment_queue)
            .arg(1)
            .query_async(&mut conn)
            .await?;

        Ok(popped.into_iter().next())
    }

    async fn mark_enrichment_processing(&self, product_id: &str) -> Result<u32, JobStoreError> {
        let mut conn = self.redis.clone();

        let (attempts,): (u32,) = redis::pipe()
            .sadd(&self.keys.enrichment_processing, product_id)
            .ignore()
            .cmd("EXPIRE")
            .arg(&self.keys.enrichment_processing)
            .arg(self.processing_ttl.as_secs())
            .ignore()
            .hincr(&self.keys.enrichment_attempts, product_id, 1u32)
            .query_async(&mut conn)
            .await?;

        Ok(attempts)
    }

    async fn mark_enrichment_completed(&self, product_id: &str) -> Result<(), JobStoreError> {
        let mut conn = self.redis.clone();

        redis::pipe()
            .srem(&self.keys.enrichment_processing, product_id)
            .ignore()
            .hset(
                &self.keys.enrichment_completed,
                product_id,
                Utc::now().to_rfc3339(),
            )
            .ignore()
            .hdel(&self.keys.enrichment_attempts, product_id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn mark_enrichment_failed(
        &self,
        product_id: &str,
        error: &str,
    ) -> Result<bool, JobStoreError> {
        let mut conn = self.redis.clone();

        conn.srem::<_, _, ()>(&self.keys.enrichment_processing, product_id)
            .await?;

        let attempts: Option<u32> = conn
            .hget(&self.keys.enrichment_attempts, product_id)
            .await?;
        let attempts = attempts.unwrap_or(0);

        let record = serde_json::to_string(&FailureRecord::now(error, attempts))?;
        conn.hset::<_, _, _, ()>(&self.keys.enrichment_failed, product_id, record)
            .await?;

        let retryable = is_retryable(attempts, self.max_attempts);
        if !retryable {
            conn.hdel::<_, _, ()>(&self.keys.enrichment_attempts, product_id)
                .await?;
        }

        Ok(retryable)
    }

    async fn enrichment_status(
        &self,
        product_id: &str,
    ) -> Result<EnrichmentJobStatus, JobStoreError> {
        let mut conn = self.redis.clone();

        let score: Option<f64> = conn
            .zscore(&self.keys.enrichment_queue, product_id)
            .await?;
        if score.is_some() {
            return Ok(EnrichmentJobStatus::Pending);
        }

        let processing: bool = conn
            .sismember(&self.keys.enrichment_processing, product_id)
            .await?;
        if processing {
            return Ok(EnrichmentJobStatus::Processing);
        }

        let completed: bool = conn
            .hexists(&self.keys.enrichment_completed, product_id)
            .await?;
        if completed {
            return Ok(EnrichmentJobStatus::Completed);
        }

        let failed: bool = conn
            .hexists(&self.keys.enrichment_failed, product_id)
            .await?;
        if failed {
            return Ok(EnrichmentJobStatus::Failed);
        }

        Ok(EnrichmentJobStatus::Unknown)
    }

    async fn enrichment_stats(&self) -> QueueStats {
        match self.try_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Failed to read enrichment queue stats, reporting zeros");
                QueueStats::default()
            }
        }
    }

    async fn enrichment_failure(
        &self,
        product_id: &str,
    ) -> Result<Option<FailureRecord>, JobStoreError> {
        let mut conn = self.redis.clone();
        let data: Option<String> = conn.hget(&self.keys.enrichment_failed, product_id).await?;

        match data {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn enrichment_attempts(&self, product_id: &str) -> Result<u32, JobStoreError> {
        let mut conn = self.redis.clone();
        let attempts: Option<u32> = conn
            .hget(&self.keys.enrichment_attempts, product_id)
            .await?;
        Ok(attempts.unwrap_or(0))
    }

    async fn enqueue_sync_shopify(
        &self,
        brand_id: &str,
        access_token: &str,
    ) -> Result<(), JobStoreError> {
        let brand_id = require_brand_id(brand_id)?;
        let serialized = serde_json::to_string(&SyncJob::new(brand_id, access_token))?;

        let mut conn = self.redis.clone();
        conn.rpush::<_, _, ()>(&self.keys.sync_queue, serialized)
            .await?;
        Ok(())
    }

    async fn next_sync_job(&self) -> Result<Option<SyncJob>, JobStoreError> {
        let mut conn = self.redis.clone();

        let data: Option<String> = redis::cmd("LPOP")
            .arg(&self.keys.sync_queue)
            .query_async(&mut conn)
            .await?;

        let Some(data) = data else {
            return Ok(None);
        };

        match serde_json::from_str::<SyncJob>(&data) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                warn!(error = %e, "Dropping malformed sync payload");
                Ok(None)
            }
        }
    }

    async fn sync_pending(&self) -> Result<u64, JobStoreError> {
        let mut conn = self.redis.clone();
        let len: u64 = conn.llen(&self.keys.sync_queue).await?;
        Ok(len)
    }
}
