//! Database schema constants.
//!
//! Only the columns the job handlers read or write are modelled; the rest of
//! the product data model belongs to the API service.

/// SQL for enabling the pgvector extension.
pub const CREATE_VECTOR_EXTENSION: &str = "CREATE EXTENSION IF NOT EXISTS vector";

/// SQL schema for creating the brands table.
pub const CREATE_BRANDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS brands (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    shop_domain TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// SQL schema for creating the products table.
pub const CREATE_PRODUCTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY,
    brand_id TEXT NOT NULL REFERENCES brands(id) ON DELETE CASCADE,
    source_product_id TEXT,
    title TEXT NOT NULL,
    description TEXT,
    product_type TEXT,
    vendor TEXT,
    tags TEXT[] NOT NULL DEFAULT '{}',
    handle TEXT,
    category TEXT,
    gender TEXT,
    primary_color TEXT,
    enrichment_status VARCHAR(20) NOT NULL DEFAULT 'pending',
    enrichment_error TEXT,
    enriched_at TIMESTAMPTZ,
    embedding JSONB,
    embedding_vector vector(1536),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(brand_id, source_product_id)
)
"#;

/// SQL schema for creating the product_variants table.
pub const CREATE_PRODUCT_VARIANTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS product_variants (
    id SERIAL PRIMARY KEY,
    product_id TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    source_variant_id TEXT,
    title TEXT NOT NULL,
    sku TEXT,
    price DOUBLE PRECISION,
    available BOOLEAN NOT NULL DEFAULT TRUE,
    options JSONB NOT NULL DEFAULT '[]'
)
"#;

/// SQL schema for creating the product_images table.
pub const CREATE_PRODUCT_IMAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS product_images (
    id SERIAL PRIMARY KEY,
    product_id TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    alt_text TEXT,
    position INTEGER NOT NULL DEFAULT 0
)
"#;

/// SQL for creating indexes on frequently queried columns.
pub const CREATE_INDEXES: [&str; 4] = [
    "CREATE INDEX IF NOT EXISTS idx_products_brand_id ON products(brand_id)",
    "CREATE INDEX IF NOT EXISTS idx_products_enrichment_status ON products(enrichment_status)",
    "CREATE INDEX IF NOT EXISTS idx_product_variants_product_id ON product_variants(product_id)",
    "CREATE INDEX IF NOT EXISTS idx_product_images_product_id ON product_images(product_id)",
];

/// Returns all schema creation statements in order.
///
/// Tables must be created in dependency order due to foreign key constraints.
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut statements = vec![
        CREATE_VECTOR_EXTENSION,
        CREATE_BRANDS_TABLE,
        CREATE_PRODUCTS_TABLE,
        CREATE_PRODUCT_VARIANTS_TABLE,
        CREATE_PRODUCT_IMAGES_TABLE,
    ];
    statements.extend(CREATE_INDEXES);
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_schema_statements_order() {
        let statements = all_schema_statements();
        assert_eq!(statements.len(), 9);
        assert!(statements[0].contains("vector"));
        // Brands must precede products, which the child tables reference
        assert!(statements[1].contains("CREATE TABLE IF NOT EXISTS brands"));
        assert!(statements[2].contains("CREATE TABLE IF NOT EXISTS products"));
        assert!(statements[5..].iter().all(|s| s.contains("CREATE INDEX")));
    }

    #[test]
    fn test_products_table_carries_queue_columns() {
        assert!(CREATE_PRODUCTS_TABLE.contains("enrichment_status"));
        assert!(CREATE_PRODUCTS_TABLE.contains("embedding JSONB"));
        assert!(CREATE_PRODUCTS_TABLE.contains("embedding_vector vector"));
        assert!(CREATE_PRODUCTS_TABLE.contains("UNIQUE(brand_id, source_product_id)"));
    }
}
