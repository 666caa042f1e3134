//! Background job pipeline: a Redis-backed queue drained by polling workers.
//!
//! This module provides:
//!
//! - **JobStore**: queue and status registry contract, with Redis and in-memory backends
//! - **Worker**: single sequential loop dispatching jobs to their handlers
//! - **Job**: tagged union of the two job kinds and their queue records
//!
//! # Architecture
//!
//! ```text
//!      ┌─────────────────┐   ┌─────────────────┐
//!      │ Import pipeline │   │  Admin actions  │
//!      │  (priority 100) │   │ (priority 50,   │
//!      └────────┬────────┘   │  sync brand)    │
//!               │            └────────┬────────┘
//!               └──────────┬──────────┘
//!                   ┌──────▼───────┐
//!                   │   JobStore   │  enrichment: sorted set
//!                   │   (Redis)    │  sync: FIFO list
//!                   └──────┬───────┘
//!         ┌────────────────┼────────────────┐
//!         ▼                ▼                ▼
//!    ┌─────────┐      ┌─────────┐      ┌─────────┐
//!    │ Worker 1│      │ Worker 2│      │ Worker N│   one process each
//!    └─────────┘      └─────────┘      └─────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use styling_jobs::scheduler::{JobStore, RedisJobStore, Worker, DEFAULT_PRIORITY};
//!
//! let store = Arc::new(RedisJobStore::connect("redis://localhost:6379", "jobs").await?);
//! store.enqueue_enrichment("prod_123", DEFAULT_PRIORITY).await?;
//!
//! let worker = Worker::new(store, enrichment_processor, sync_processor);
//! let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
//! worker.run(shutdown_rx).await;
//! ```
//!
//! # Delivery
//!
//! - Enrichment jobs pop in ascending priority, ties in insertion order
//! - Sync jobs pop strictly FIFO, and only when no enrichment job is queued
//! - Failed enrichment jobs are never re-queued automatically
//! - A job claimed by a worker that dies is lost until re-enqueued

pub mod job;
pub mod memory;
pub mod queue;
pub mod store;
pub mod worker;

pub use job::{
    validate_id, EnrichJob, EnrichmentJobStatus, FailureRecord, Job, JobKind, Priority,
    QueueStats, SyncJob, DEFAULT_MAX_ATTEMPTS, DEFAULT_PRIORITY, DEFAULT_PROCESSING_TTL_SECS,
    REENRICH_PRIORITY,
};
pub use memory::InMemoryJobStore;
pub use queue::{enrichment_score, KeySpace, RedisJobStore, DEFAULT_KEY_PREFIX};
pub use store::{JobStore, JobStoreError};
pub use worker::{EnrichmentHandler, RunOutcome, SyncHandler, Worker};
