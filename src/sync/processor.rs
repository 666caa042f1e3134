//! Brand catalog synchronization.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{CommerceError, SyncError};
use crate::scheduler::{JobStore, SyncHandler, DEFAULT_PRIORITY};
use crate::storage::CatalogRepository;

use super::shopify::CatalogSource;

/// Per-product counts of one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Products upserted.
    pub synced: u64,
    /// Products that could not be normalized or upserted.
    pub errors: u64,
}

/// Pages through a brand's remote catalog and upserts every product.
pub struct SyncProcessor {
    catalog: Arc<dyn CatalogRepository>,
    source: Arc<dyn CatalogSource>,
    /// When set, every upserted product is queued for enrichment.
    job_store: Option<Arc<dyn JobStore>>,
}

impl SyncProcessor {
    /// Creates a processor that only upserts.
    pub fn new(catalog: Arc<dyn CatalogRepository>, source: Arc<dyn CatalogSource>) -> Self {
        Self {
            catalog,
            source,
            job_store: None,
        }
    }

    /// Enqueues an enrichment job for each upserted product.
    pub fn with_job_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.job_store = Some(store);
        self
    }

    /// Syncs one brand.
    ///
    /// # Errors
    ///
    /// Fails when the brand cannot be resolved to a shop domain or a page
    /// fetch fails. Individual products never fail the run; they are counted
    /// in [`SyncReport::errors`].
    pub async fn run(&self, brand_id: &str, access_token: &str) -> Result<SyncReport, SyncError> {
        let brand = self
            .catalog
            .find_brand(brand_id)
            .await?
            .ok_or_else(|| SyncError::BrandNotFound(brand_id.to_string()))?;

        let shop_domain = brand
            .shop_domain
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| SyncError::MissingShopDomain(brand_id.to_string()))?;

        let mut report = SyncReport::default();
        let mut cursor: Option<String> = None;
        let mut seen_cursors: HashSet<String> = HashSet::new();
        let mut pages = 0u32;

        loop {
            let page = self
                .source
                .fetch_page(shop_domain, access_token, cursor.as_deref())
                .await?;
            pages += 1;

            debug!(
                brand_id = %brand_id,
                page = pages,
                products = page.products.len(),
                rejected = page.rejected.len(),
                "Fetched catalog page"
            );

            for reason in &page.rejected {
                warn!(brand_id = %brand_id, reason = %reason, "Skipping catalog product");
                report.errors += 1;
            }

            for product in &page.products {
                match self.catalog.upsert_product(brand_id, product).await {
                    Ok(outcome) => {
                        report.synced += 1;
                        self.queue_enrichment(&outcome.product_id).await;
                    }
                    Err(e) => {
                        warn!(
                            brand_id = %brand_id,
                            source_id = %product.source_id,
                            error = %e,
                            "Failed to upsert product"
                        );
                        report.errors += 1;
                    }
                }
            }

            match page.next_cursor {
                Some(next) if !seen_cursors.insert(next.clone()) => {
                    return Err(CommerceError::InvalidResponse(format!(
                        "pagination cursor '{}' was already visited",
                        next
                    ))
                    .into());
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(report)
    }

    async fn queue_enrichment(&self, product_id: &str) {
        let Some(store) = &self.job_store else {
            return;
        };

        if let Err(e) = store.enqueue_enrichment(product_id, DEFAULT_PRIORITY).await {
            warn!(
                product_id = %product_id,
                error = %e,
                "Failed to enqueue enrichment for synced product"
            );
        }
    }
}

#[async_trait]
impl SyncHandler for SyncProcessor {
    async fn sync(&self, brand_id: &str, access_token: &str) -> Result<SyncReport, SyncError> {
        self.run(brand_id, access_token).await
    }
}
