//! Error types for the job handlers and their collaborators.
//!
//! Queue errors live with the store ([`crate::scheduler::JobStoreError`]) and
//! database errors with the storage layer ([`crate::storage::DatabaseError`]).
//! This module holds the errors of the external services and of the two job
//! handlers:
//! - LLM API interactions
//! - Commerce (GraphQL) API interactions
//! - Product enrichment
//! - Brand catalog synchronization

use std::time::Duration;

use thiserror::Error;

use crate::storage::DatabaseError;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors returned by the commerce API client.
#[derive(Debug, Error)]
pub enum CommerceError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Access token rejected ({status})")]
    Unauthorized { status: u16 },

    #[error("Rate limited by commerce API{}", retry_after.map(|d| format!(", retry after {}s", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("Commerce API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response from commerce API: {0}")]
    InvalidResponse(String),
}

/// Errors raised while enriching a single product.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Product '{0}' not found")]
    ProductNotFound(String),

    #[error("Classification failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Unusable classification response: {0}")]
    InvalidClassification(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Errors that abort a brand catalog sync.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Brand '{0}' not found")]
    BrandNotFound(String),

    #[error("Brand '{0}' has no shop domain configured")]
    MissingShopDomain(String),

    #[error("Catalog fetch failed: {0}")]
    Commerce(#[from] CommerceError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
