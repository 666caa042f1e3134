//! Persistence seams used by the job handlers.
//!
//! [`super::Database`] implements both traits against PostgreSQL; tests use
//! small in-process fakes.

use async_trait::async_trait;

use super::database::DatabaseError;
use super::models::{
    BrandRecord, CatalogProduct, EnrichmentStatus, ProductAttributes, ProductDetails,
    UpsertOutcome,
};

/// Product persistence needed by the enrichment step.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Loads a product with its brand, variants and images.
    async fn find_product(&self, product_id: &str)
        -> Result<Option<ProductDetails>, DatabaseError>;

    /// Sets the persisted enrichment status, and the error text for failures.
    async fn set_enrichment_status(
        &self,
        product_id: &str,
        status: EnrichmentStatus,
        error: Option<&str>,
    ) -> Result<(), DatabaseError>;

    /// Writes enriched attributes, marks the row completed and stamps `enriched_at`.
    async fn save_enrichment(
        &self,
        product_id: &str,
        attributes: &ProductAttributes,
    ) -> Result<(), DatabaseError>;

    /// Stores the embedding in the portable JSON column.
    async fn save_embedding_json(
        &self,
        product_id: &str,
        embedding: &[f32],
    ) -> Result<(), DatabaseError>;

    /// Stores the embedding in the native vector column.
    async fn save_embedding_vector(
        &self,
        product_id: &str,
        embedding: &[f32],
    ) -> Result<(), DatabaseError>;

    /// Returns the persisted enrichment status of a product, if the row exists.
    async fn enrichment_status(
        &self,
        product_id: &str,
    ) -> Result<Option<EnrichmentStatus>, DatabaseError>;

    /// Counts product rows per persisted enrichment status.
    async fn count_by_enrichment_status(
        &self,
    ) -> Result<Vec<(EnrichmentStatus, u64)>, DatabaseError>;
}

/// Brand and catalog persistence needed by the sync step.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Loads a brand.
    async fn find_brand(&self, brand_id: &str) -> Result<Option<BrandRecord>, DatabaseError>;

    /// Inserts or updates a product keyed by `(brand_id, source_id)`.
    ///
    /// Variants and images are replaced wholesale.
    async fn upsert_product(
        &self,
        brand_id: &str,
        product: &CatalogProduct,
    ) -> Result<UpsertOutcome, DatabaseError>;
}
