//! Worker configuration.
//!
//! This module provides configuration for the job pipeline: connection
//! strings, queue limits, the polling policy, and model names for the
//! enrichment step.

use std::time::Duration;

use thiserror::Error;

use crate::scheduler::job::{DEFAULT_MAX_ATTEMPTS, DEFAULT_PROCESSING_TTL_SECS};
use crate::scheduler::queue::DEFAULT_KEY_PREFIX;

/// Default Redis connection URL.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default page size for catalog sync queries.
pub const DEFAULT_SYNC_PAGE_SIZE: u32 = 50;

/// Largest page size the commerce API accepts.
pub const MAX_SYNC_PAGE_SIZE: u32 = 250;

/// Default commerce API version.
pub const DEFAULT_SHOPIFY_API_VERSION: &str = "2024-01";

/// Default model for attribute classification.
pub const DEFAULT_CLASSIFIER_MODEL: &str = "openai/gpt-4o-mini";

/// Default model for text embeddings.
pub const DEFAULT_EMBEDDING_MODEL: &str = "openai/text-embedding-3-small";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Polling and backoff policy of the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep after a poll that found no work.
    pub poll_interval: Duration,
    /// Log an idle notice every this many consecutive idle polls.
    pub idle_log_every: u64,
    /// Sleep after the queue itself failed.
    pub error_backoff: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            idle_log_every: 30,
            error_backoff: Duration::from_millis(2000),
        }
    }
}

impl PollPolicy {
    /// Returns whether the idle notice is due after `idle_cycles` idle polls.
    pub fn should_log_idle(&self, idle_cycles: u64) -> bool {
        self.idle_log_every > 0 && idle_cycles > 0 && idle_cycles % self.idle_log_every == 0
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the idle notice cadence.
    pub fn with_idle_log_every(mut self, cycles: u64) -> Self {
        self.idle_log_every = cycles;
        self
    }

    /// Sets the backoff after queue errors.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }
}

/// Configuration for the job worker and its producers.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    // Queue settings
    /// Redis connection URL.
    pub redis_url: String,
    /// Namespace for all job keys.
    pub key_prefix: String,
    /// Claims allowed before an enrichment job fails terminally.
    pub max_attempts: u32,
    /// Expiry refreshed on the processing marker at every claim.
    pub processing_ttl: Duration,
    /// Polling behaviour of the worker loop.
    pub poll: PollPolicy,

    // Storage settings
    /// PostgreSQL connection URL.
    pub database_url: Option<String>,

    // Sync settings
    /// Products fetched per commerce API page.
    pub sync_page_size: u32,
    /// Commerce API version segment.
    pub shopify_api_version: String,

    // LLM settings
    /// Model used for attribute classification.
    pub classifier_model: String,
    /// Model used for text embeddings.
    pub embedding_model: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            processing_ttl: Duration::from_secs(DEFAULT_PROCESSING_TTL_SECS),
            poll: PollPolicy::default(),

            database_url: None,

            sync_page_size: DEFAULT_SYNC_PAGE_SIZE,
            shopify_api_version: DEFAULT_SHOPIFY_API_VERSION.to_string(),

            classifier_model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }
}

impl WorkerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: Redis connection URL (default: redis://127.0.0.1:6379)
    /// - `JOBS_KEY_PREFIX`: Key namespace (default: jobs)
    /// - `JOBS_MAX_ATTEMPTS`: Attempt cap (default: 3)
    /// - `JOBS_PROCESSING_TTL_SECS`: Processing marker expiry (default: 300)
    /// - `JOBS_POLL_INTERVAL_MS`: Idle poll interval (default: 2000)
    /// - `JOBS_IDLE_LOG_EVERY`: Idle notice cadence (default: 30)
    /// - `JOBS_ERROR_BACKOFF_MS`: Backoff after queue errors (default: 2000)
    /// - `DATABASE_URL`: PostgreSQL connection URL (optional here)
    /// - `SHOPIFY_PAGE_SIZE`: Products per page (default: 50)
    /// - `SHOPIFY_API_VERSION`: API version (default: 2024-01)
    /// - `ENRICHMENT_MODEL`: Classifier model
    /// - `EMBEDDING_MODEL`: Embedding model
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REDIS_URL") {
            config.redis_url = val;
        }

        if let Ok(val) = std::env::var("JOBS_KEY_PREFIX") {
            config.key_prefix = val;
        }

        if let Ok(val) = std::env::var("JOBS_MAX_ATTEMPTS") {
            config.max_attempts = parse_env_value(&val, "JOBS_MAX_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("JOBS_PROCESSING_TTL_SECS") {
            let secs: u64 = parse_env_value(&val, "JOBS_PROCESSING_TTL_SECS")?;
            config.processing_ttl = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("JOBS_POLL_INTERVAL_MS") {
            let ms: u64 = parse_env_value(&val, "JOBS_POLL_INTERVAL_MS")?;
            config.poll.poll_interval = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("JOBS_IDLE_LOG_EVERY") {
            config.poll.idle_log_every = parse_env_value(&val, "JOBS_IDLE_LOG_EVERY")?;
        }

        if let Ok(val) = std::env::var("JOBS_ERROR_BACKOFF_MS") {
            let ms: u64 = parse_env_value(&val, "JOBS_ERROR_BACKOFF_MS")?;
            config.poll.error_backoff = Duration::from_millis(ms);
        }

        config.database_url = std::env::var("DATABASE_URL").ok();

        if let Ok(val) = std::env::var("SHOPIFY_PAGE_SIZE") {
            config.sync_page_size = parse_env_value(&val, "SHOPIFY_PAGE_SIZE")?;
        }

        if let Ok(val) = std::env::var("SHOPIFY_API_VERSION") {
            config.shopify_api_version = val;
        }

        if let Ok(val) = std::env::var("ENRICHMENT_MODEL") {
            config.classifier_model = val;
        }

        if let Ok(val) = std::env::var("EMBEDDING_MODEL") {
            config.embedding_model = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Returns the database URL or a `MissingEnvVar` error.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "redis_url cannot be empty".to_string(),
            ));
        }

        if self.key_prefix.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "key_prefix cannot be empty".to_string(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.processing_ttl.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "processing_ttl must be at least one second".to_string(),
            ));
        }

        if self.poll.poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        if !(1..=MAX_SYNC_PAGE_SIZE).contains(&self.sync_page_size) {
            return Err(ConfigError::ValidationFailed(format!(
                "sync_page_size must be between 1 and {}",
                MAX_SYNC_PAGE_SIZE
            )));
        }

        if self.classifier_model.is_empty() || self.embedding_model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model names cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Sets the Redis URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Sets the key namespace.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
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

    /// Sets the polling policy.
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Sets the database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Sets the sync page size.
    pub fn with_sync_page_size(mut self, page_size: u32) -> Self {
        self.sync_page_size = page_size;
        self
    }

    /// Sets the classifier model.
    pub fn with_classifier_model(mut self, model: impl Into<String>) -> Self {
        self.classifier_model = model.into();
        self
    }

    /// Sets the embedding model.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }
}

/// Parse an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
