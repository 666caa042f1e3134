//! Brand catalog synchronization from a remote commerce API.
//!
//! A sync job pages through the brand's products with a cursor-based GraphQL
//! query and upserts each one keyed by `(brand, source product id)`.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use styling_jobs::sync::{ShopifyClient, SyncProcessor};
//!
//! let processor = SyncProcessor::new(db.clone(), Arc::new(ShopifyClient::default()))
//!     .with_job_store(store.clone());
//! let report = processor.run("brand_123", &access_token).await?;
//! println!("synced {} products, {} errors", report.synced, report.errors);
//! ```

pub mod processor;
pub mod shopify;

pub use processor::{SyncProcessor, SyncReport};
pub use shopify::{CatalogPage, CatalogSource, ShopifyClient};
