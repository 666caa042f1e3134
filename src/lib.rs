//! styling-jobs: background job pipeline for a fashion catalog.
//!
//! Products are queued for enrichment (LLM classification plus an embedding)
//! and brand catalogs are queued for sync from Shopify. A Redis-backed
//! [`scheduler::JobStore`] owns all in-flight job state and a polling
//! [`scheduler::Worker`] drains it one job at a time.

pub mod cli;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod scheduler;
pub mod storage;
pub mod sync;
pub mod utils;

pub use config::{ConfigError, PollPolicy, WorkerConfig};
pub use error::{CommerceError, EnrichmentError, LlmError, SyncError};
pub use scheduler::{Job, JobStore, JobStoreError, RunOutcome, Worker};
