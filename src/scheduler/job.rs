//! Job definitions for the scheduler.
//!
//! This module defines the types that flow through the job pipeline:
//!
//! - `Job`: A unit of work handed to the worker, either an enrichment or a sync
//! - `EnrichJob` / `SyncJob`: Payloads for the two job kinds
//! - `EnrichmentJobStatus`: Status of an enrichment job derived from queue state
//! - `FailureRecord`: Failure details stored for an enrichment job
//! - `QueueStats`: Counts per enrichment structure

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of claims before an enrichment job is terminally failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Expiry refreshed on the processing marker at every claim.
pub const DEFAULT_PROCESSING_TTL_SECS: u64 = 300;

/// Priority of an enrichment job. Lower values are dequeued first; negative
/// values jump ahead of both defaults.
pub type Priority = i16;

/// Priority used by the product import pipeline.
pub const DEFAULT_PRIORITY: Priority = 100;

/// Priority used by the admin re-enrich action.
pub const REENRICH_PRIORITY: Priority = 50;

/// Kind of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// LLM classification and embedding of one product.
    #[serde(rename = "enrich-product")]
    EnrichProduct,
    /// Full catalog pull for one brand from the commerce API.
    #[serde(rename = "sync-shopify")]
    SyncShopify,
}

impl JobKind {
    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::EnrichProduct => "enrich-product",
            JobKind::SyncShopify => "sync-shopify",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an enrichment job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichJob {
    /// Product to enrich.
    pub product_id: String,
}

/// Payload of a catalog sync job.
///
/// Serialized as `{"brandId": .., "accessToken": ..}` in the sync list.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    /// Brand whose catalog is pulled.
    pub brand_id: String,
    /// Commerce API access token for the brand's shop.
    pub access_token: String,
}

impl SyncJob {
    /// Creates a new sync payload.
    pub fn new(brand_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            brand_id: brand_id.into(),
            access_token: access_token.into(),
        }
    }
}

impl fmt::Debug for SyncJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncJob")
            .field("brand_id", &self.brand_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// A job handed to the worker.
///
/// Serializes as `{"kind": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum Job {
    /// Enrich a single product.
    #[serde(rename = "enrich-product")]
    EnrichProduct(EnrichJob),
    /// Sync a brand's catalog.
    #[serde(rename = "sync-shopify")]
    SyncShopify(SyncJob),
}

impl Job {
    /// Creates an enrichment job.
    pub fn enrich(product_id: impl Into<String>) -> Self {
        Job::EnrichProduct(EnrichJob {
            product_id: product_id.into(),
        })
    }

    /// Creates a sync job.
    pub fn sync(brand_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Job::SyncShopify(SyncJob::new(brand_id, access_token))
    }

    /// Returns the kind of this job.
    pub fn kind(&self) -> JobKind {
        match self {
            Job::EnrichProduct(_) => JobKind::EnrichProduct,
            Job::SyncShopify(_) => JobKind::SyncShopify,
        }
    }
}

/// Status of an enrichment job, derived on read from the queue structures.
///
/// Checked in order: queued, processing marker, completion record, failure record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentJobStatus {
    /// Waiting in the priority queue.
    Pending,
    /// Claimed by a worker.
    Processing,
    /// Completion recorded.
    Completed,
    /// Failure recorded.
    Failed,
    /// No trace in any structure.
    Unknown,
}

impl fmt::Display for EnrichmentJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichmentJobStatus::Pending => write!(f, "pending"),
            EnrichmentJobStatus::Processing => write!(f, "processing"),
            EnrichmentJobStatus::Completed => write!(f, "completed"),
            EnrichmentJobStatus::Failed => write!(f, "failed"),
            EnrichmentJobStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Failure details stored per product id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    /// Error message of the last failure.
    pub error: String,
    /// Attempts counted when the failure was recorded.
    pub attempts: u32,
    /// When the failure was recorded.
    pub failed_at: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a failure record stamped with the current time.
    pub fn now(error: impl Into<String>, attempts: u32) -> Self {
        Self {
            error: error.into(),
            attempts,
            failed_at: Utc::now(),
        }
    }
}

/// Counts per enrichment structure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs waiting in the priority queue.
    pub pending: u64,
    /// Jobs carrying a processing marker.
    pub processing: u64,
    /// Failure records.
    pub failed: u64,
    /// Completion records.
    pub completed: u64,
}

/// Returns whether a failure after `attempts` claims may still be retried.
pub fn is_retryable(attempts: u32, max_attempts: u32) -> bool {
    attempts <= max_attempts
}

/// Checks that an id is usable as a queue member.
///
/// Empty ids and the strings `undefined` / `null` (left behind by upstream
/// serialization bugs) are rejected.
pub fn validate_id(id: &str) -> Option<&str> {
    let trimmed = id.trim();
    match trimmed {
        "" | "undefined" | "null" => None,
        _ => Some(trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_wire_format_for_sync() {
        let job = Job::sync("B1", "tok");
        let value = serde_json::to_value(&job).expect("job should serialize");

        assert_eq!(
            value,
            serde_json::json!({
                "kind": "sync-shopify",
                "payload": { "brandId": "B1", "accessToken": "tok" }
            })
        );
    }

    #[test]
    fn test_job_wire_format_for_enrichment() {
        let job = Job::enrich("P1");
        let value = serde_json::to_value(&job).expect("job should serialize");

        assert_eq!(value["kind"], "enrich-product");
        assert_eq!(value["payload"]["productId"], "P1");
        assert_eq!(job.kind(), JobKind::EnrichProduct);
    }

    #[test]
    fn test_sync_job_debug_redacts_token() {
        let job = SyncJob::new("B1", "shpat_secret");
        let rendered = format!("{:?}", job);

        assert!(rendered.contains("B1"));
        assert!(!rendered.contains("shpat_secret"));
    }

    #[test]
    fn test_failure_record_field_names() {
        let record = FailureRecord::now("boom", 2);
        let value = serde_json::to_value(&record).expect("record should serialize");

        assert_eq!(value["error"], "boom");
        assert_eq!(value["attempts"], 2);
        assert!(value.get("failedAt").is_some());
    }

    #[test]
    fn test_validate_id() {
        assert_eq!(validate_id("P1"), Some("P1"));
        assert_eq!(validate_id("  P1 "), Some("P1"));
        assert_eq!(validate_id(""), None);
        assert_eq!(validate_id("   "), None);
        assert_eq!(validate_id("undefined"), None);
        assert_eq!(validate_id("null"), None);
    }

    #[test]
    fn test_is_retryable_boundary() {
        assert!(is_retryable(1, 3));
        assert!(is_retryable(3, 3));
        assert!(!is_retryable(4, 3));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(EnrichmentJobStatus::Pending.to_string(), "pending");
        assert_eq!(EnrichmentJobStatus::Unknown.to_string(), "unknown");
        assert_eq!(JobKind::SyncShopify.to_string(), "sync-shopify");
    }
}
