//! Shopify Admin GraphQL catalog source.
//!
//! Fetches a shop's products one cursor page at a time and normalizes each
//! node into a [`CatalogProduct`].

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::{DEFAULT_SHOPIFY_API_VERSION, DEFAULT_SYNC_PAGE_SIZE, MAX_SYNC_PAGE_SIZE};
use crate::error::CommerceError;
use crate::storage::{CatalogImage, CatalogProduct, CatalogVariant, VariantOption};

/// Variants fetched per product.
const VARIANTS_PER_PRODUCT: u32 = 100;

/// Images fetched per product.
const IMAGES_PER_PRODUCT: u32 = 20;

const PRODUCTS_QUERY: &str = r#"
query Products($first: Int!, $after: String, $variantsFirst: Int!, $imagesFirst: Int!) {
  products(first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    nodes {
      id
      title
      descriptionHtml
      productType
      vendor
      handle
      tags
      variants(first: $variantsFirst) {
        nodes { id title sku price availableForSale selectedOptions { name value } }
      }
      images(first: $imagesFirst) {
        nodes { url altText }
      }
    }
  }
}
"#;

/// One page of a catalog listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogPage {
    /// Products that normalized cleanly.
    pub products: Vec<CatalogProduct>,
    /// Reasons for nodes that could not be normalized.
    pub rejected: Vec<String>,
    /// Cursor of the next page, `None` on the last page.
    pub next_cursor: Option<String>,
}

/// A paginated remote catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetches the page after `cursor` (the first page when `None`).
    async fn fetch_page(
        &self,
        shop_domain: &str,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<CatalogPage, CommerceError>;
}

/// Client for the Shopify Admin GraphQL API.
pub struct ShopifyClient {
    api_version: String,
    page_size: u32,
    http_client: Client,
}

impl Default for ShopifyClient {
    fn default() -> Self {
        Self::new(DEFAULT_SHOPIFY_API_VERSION, DEFAULT_SYNC_PAGE_SIZE)
    }
}

impl ShopifyClient {
    /// Creates a client; the page size is clamped to `1..=250`.
    pub fn new(api_version: impl Into<String>, page_size: u32) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_version: api_version.into(),
            page_size: page_size.clamp(1, MAX_SYNC_PAGE_SIZE),
            http_client,
        }
    }

    /// Returns the effective page size.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Returns the GraphQL endpoint for a shop.
    pub fn endpoint(&self, shop_domain: &str) -> String {
        let domain = shop_domain
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        format!("https://{}/admin/api/{}/graphql.json", domain, self.api_version)
    }

    fn request_body(&self, cursor: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "query": PRODUCTS_QUERY,
            "variables": {
                "first": self.page_size,
                "after": cursor,
                "variantsFirst": VARIANTS_PER_PRODUCT,
                "imagesFirst": IMAGES_PER_PRODUCT,
            }
        })
    }
}

#[async_trait]
impl CatalogSource for ShopifyClient {
    async fn fetch_page(
        &self,
        shop_domain: &str,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<CatalogPage, CommerceError> {
        let response = self
            .http_client
            .post(self.endpoint(shop_domain))
            .header("X-Shopify-Access-Token", access_token)
            .header("Content-Type", "application/json")
            .json(&self.request_body(cursor))
            .send()
            .await
            .map_err(|e| CommerceError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(CommerceError::Unauthorized {
                status: status.as_u16(),
            });
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(CommerceError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CommerceError::ApiError {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let graphql_response: GraphQLResponse = response.json().await.map_err(|e| {
            CommerceError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        parse_products_response(graphql_response)
    }
}

/// Reads a `Retry-After` header given in whole seconds. Anything else is ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn parse_products_response(response: GraphQLResponse) -> Result<CatalogPage, CommerceError> {
    if let Some(errors) = response.errors {
        if !errors.is_empty() {
            let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
            return Err(CommerceError::InvalidResponse(format!(
                "GraphQL errors: {}",
                messages.join("; ")
            )));
        }
    }

    let data = response.data.ok_or_else(|| {
        CommerceError::InvalidResponse("No data in GraphQL response".to_string())
    })?;

    let connection = data.products;
    let mut page = CatalogPage {
        next_cursor: if connection.page_info.has_next_page {
            connection.page_info.end_cursor
        } else {
            None
        },
        ..CatalogPage::default()
    };

    if connection.page_info.has_next_page && page.next_cursor.is_none() {
        return Err(CommerceError::InvalidResponse(
            "hasNextPage without endCursor".to_string(),
        ));
    }

    for node in connection.nodes {
        match normalize_product(node) {
            Ok(product) => page.products.push(product),
            Err(reason) => page.rejected.push(reason),
        }
    }

    Ok(page)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Maps a product node to its normalized catalog form.
fn normalize_product(node: ProductNode) -> Result<CatalogProduct, String> {
    let source_id = non_empty(node.id).ok_or_else(|| "product node without id".to_string())?;
    let title = non_empty(node.title)
        .ok_or_else(|| format!("product {} has no title", source_id))?;

    let variants = node
        .variants
        .map(|c| c.nodes)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| {
            let source_id = non_empty(v.id)?;
            Some(CatalogVariant {
                source_id,
                title: non_empty(v.title).unwrap_or_else(|| "Default".to_string()),
                sku: non_empty(v.sku),
                price: v.price.and_then(|p| p.trim().parse().ok()),
                available: v.available_for_sale.unwrap_or(false),
                options: v
                    .selected_options
                    .into_iter()
                    .map(|o| VariantOption {
                        name: o.name,
                        value: o.value,
                    })
                    .collect(),
            })
        })
        .collect();

    let images = node
        .images
        .map(|c| c.nodes)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|i| non_empty(i.url).map(|url| (url, non_empty(i.alt_text))))
        .enumerate()
        .map(|(position, (url, alt_text))| CatalogImage {
            url,
            alt_text,
            position: position as i32,
        })
        .collect();

    Ok(CatalogProduct {
        source_id,
        title,
        description: non_empty(node.description_html),
        product_type: non_empty(node.product_type),
        vendor: non_empty(node.vendor),
        handle: non_empty(node.handle),
        tags: node
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        variants,
        images,
    })
}

/// GraphQL response wrapper.
#[derive(Debug, Deserialize)]
struct GraphQLResponse {
    data: Option<GraphQLData>,
    errors: Option<Vec<GraphQLError>>,
}

/// GraphQL error.
#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQLData {
    products: ProductConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductConnection {
    nodes: Vec<ProductNode>,
    page_info: PageInfo,
}

/// Page info for pagination.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductNode {
    id: Option<String>,
    title: Option<String>,
    description_html: Option<String>,
    product_type: Option<String>,
    vendor: Option<String>,
    handle: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    variants: Option<Connection<VariantNode>>,
    images: Option<Connection<ImageNode>>,
}

#[derive(Debug, Deserialize)]
struct Connection<T> {
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantNode {
    id: Option<String>,
    title: Option<String>,
    sku: Option<String>,
    price: Option<String>,
    available_for_sale: Option<bool>,
    #[serde(default)]
    selected_options: Vec<SelectedOption>,
}

#[derive(Debug, Deserialize)]
struct SelectedOption {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageNode {
    url: Option<String>,
    alt_text: Option<String>,
}
