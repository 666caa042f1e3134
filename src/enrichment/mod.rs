//! Product enrichment.
//!
//! Each product is classified by an LLM into category, gender, primary color
//! and product type, the merged attributes are persisted, and an embedding of
//! the product text is stored for similarity search.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use styling_jobs::enrichment::EnrichmentProcessor;
//!
//! let llm = Arc::new(LiteLlmClient::from_env()?);
//! let processor = EnrichmentProcessor::new(db.clone(), llm.clone(), llm);
//! let outcome = processor.run("product-id").await?;
//! ```

pub mod classify;
pub mod processor;
pub mod text;

pub use classify::{merge_attributes, parse_classification, Classification};
pub use processor::{EnrichmentOutcome, EnrichmentProcessor};
pub use text::{build_embedding_text, build_text_bundle, strip_markup};
