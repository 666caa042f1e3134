//! Records read and written by the job handlers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted enrichment state of a product row.
///
/// Tracked independently of the queue's own status; the two can diverge
/// when a worker dies between writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EnrichmentStatus {
    /// All variants, in lifecycle order.
    pub const ALL: [EnrichmentStatus; 4] = [
        EnrichmentStatus::Pending,
        EnrichmentStatus::Processing,
        EnrichmentStatus::Completed,
        EnrichmentStatus::Failed,
    ];

    /// Column value for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::Pending => "pending",
            EnrichmentStatus::Processing => "processing",
            EnrichmentStatus::Completed => "completed",
            EnrichmentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrichmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EnrichmentStatus::Pending),
            "processing" => Ok(EnrichmentStatus::Processing),
            "completed" => Ok(EnrichmentStatus::Completed),
            "failed" => Ok(EnrichmentStatus::Failed),
            other => Err(format!("unknown enrichment status '{}'", other)),
        }
    }
}

/// A brand row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandRecord {
    pub id: String,
    pub name: String,
    /// Shop domain on the commerce platform, e.g. `acme.myshopify.com`.
    pub shop_domain: Option<String>,
}

/// A product row with the columns the enrichment step uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductRecord {
    pub id: String,
    pub brand_id: String,
    pub source_product_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub product_type: Option<String>,
    pub vendor: Option<String>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub gender: Option<String>,
    pub primary_color: Option<String>,
    pub enrichment_status: Option<EnrichmentStatus>,
    pub enrichment_error: Option<String>,
    pub enriched_at: Option<DateTime<Utc>>,
}

/// A stored variant.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRecord {
    pub title: String,
    pub sku: Option<String>,
    pub price: Option<f64>,
    pub available: bool,
}

/// A stored image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub url: String,
    pub alt_text: Option<String>,
    pub position: i32,
}

/// A product loaded together with its brand, variants and images.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDetails {
    pub product: ProductRecord,
    pub brand: Option<BrandRecord>,
    pub variants: Vec<VariantRecord>,
    pub images: Vec<ImageRecord>,
}

/// Attributes written by a successful enrichment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAttributes {
    pub category: Option<String>,
    pub gender: Option<String>,
    pub primary_color: Option<String>,
    pub product_type: Option<String>,
}

/// A selected option on a catalog variant (e.g. `Color: Red`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantOption {
    pub name: String,
    pub value: String,
}

/// A variant in normalized catalog form.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogVariant {
    pub source_id: String,
    pub title: String,
    pub sku: Option<String>,
    pub price: Option<f64>,
    pub available: bool,
    pub options: Vec<VariantOption>,
}

/// An image in normalized catalog form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogImage {
    pub url: String,
    pub alt_text: Option<String>,
    pub position: i32,
}

/// A product in normalized catalog form, ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogProduct {
    /// Identifier on the commerce platform.
    pub source_id: String,
    pub title: String,
    pub description: Option<String>,
    pub product_type: Option<String>,
    pub vendor: Option<String>,
    pub handle: Option<String>,
    pub tags: Vec<String>,
    pub variants: Vec<CatalogVariant>,
    pub images: Vec<CatalogImage>,
}

/// Result of upserting one catalog product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub product_id: String,
    /// `true` when a new row was inserted.
    pub created: bool,
}
