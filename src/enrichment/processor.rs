//! Product enrichment: classify with an LLM, persist, then embed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_CLASSIFIER_MODEL, DEFAULT_EMBEDDING_MODEL};
use crate::error::EnrichmentError;
use crate::llm::{EmbeddingProvider, GenerationRequest, LlmProvider};
use crate::scheduler::EnrichmentHandler;
use crate::storage::{EnrichmentStatus, ProductAttributes, ProductDetails, ProductRepository};

use super::classify::{classification_messages, merge_attributes, parse_classification};
use super::text::{build_embedding_text, build_text_bundle};

const CLASSIFIER_MAX_TOKENS: u32 = 300;

/// Result of enriching one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichmentOutcome {
    /// Attributes written to the product row.
    pub attributes: ProductAttributes,
    /// Whether the embedding was stored in both columns.
    pub embedded: bool,
}

/// Runs the enrichment pipeline for single products.
pub struct EnrichmentProcessor {
    products: Arc<dyn ProductRepository>,
    llm: Arc<dyn LlmProvider>,
    embeddings: Arc<dyn EmbeddingProvider>,
    classifier_model: String,
    embedding_model: String,
}

impl EnrichmentProcessor {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        llm: Arc<dyn LlmProvider>,
        embeddings: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            products,
            llm,
            embeddings,
            classifier_model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    pub fn with_classifier_model(mut self, model: impl Into<String>) -> Self {
        self.classifier_model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Enriches one product.
    ///
    /// The product is marked `processing` first. Any failure before the
    /// attributes are persisted marks it `failed` with the error text. The
    /// embedding step runs afterwards and never fails the call.
    ///
    /// # Errors
    ///
    /// `ProductNotFound` when no row exists, otherwise the classification or
    /// database error that stopped the run.
    pub async fn run(&self, product_id: &str) -> Result<EnrichmentOutcome, EnrichmentError> {
        let details = self
            .products
            .find_product(product_id)
            .await?
            .ok_or_else(|| EnrichmentError::ProductNotFound(product_id.to_string()))?;

        let attributes = match self.classify_and_save(&details).await {
            Ok(attributes) => attributes,
            Err(e) => {
                let message = e.to_string();
                if let Err(mark_err) = self
                    .products
                    .set_enrichment_status(product_id, EnrichmentStatus::Failed, Some(&message))
                    .await
                {
                    warn!(
                        product_id = %product_id,
                        error = %mark_err,
                        "Failed to mark product enrichment as failed"
                    );
                }
                return Err(e);
            }
        };

        let embedded = self.embed(&details, &attributes).await;

        info!(
            product_id = %product_id,
            category = ?attributes.category,
            embedded,
            "Product enriched"
        );

        Ok(EnrichmentOutcome {
            attributes,
            embedded,
        })
    }

    async fn classify_and_save(
        &self,
        details: &ProductDetails,
    ) -> Result<ProductAttributes, EnrichmentError> {
        let product_id = details.product.id.as_str();

        self.products
            .set_enrichment_status(product_id, EnrichmentStatus::Processing, None)
            .await?;

        let bundle = build_text_bundle(details);
        let request = GenerationRequest::new(
            self.classifier_model.clone(),
            classification_messages(&bundle),
        )
        .with_temperature(0.0)
        .with_max_tokens(CLASSIFIER_MAX_TOKENS)
        .with_json_output();

        let response = self.llm.generate(request).await?;
        let reply = response.first_content().ok_or_else(|| {
            EnrichmentError::InvalidClassification("response has no content".to_string())
        })?;
        debug!(product_id = %product_id, reply_len = reply.len(), "Classifier replied");

        let classification = parse_classification(reply)?;
        let attributes = merge_attributes(classification, &details.product);

        self.products.save_enrichment(product_id, &attributes).await?;
        Ok(attributes)
    }

    /// Stores an embedding in both columns. Failures are logged only.
    async fn embed(&self, details: &ProductDetails, attributes: &ProductAttributes) -> bool {
        let product_id = details.product.id.as_str();
        let text = build_embedding_text(&details.product, attributes);

        let embedding = match self.embeddings.embed(&self.embedding_model, &text).await {
            Ok(embedding) if !embedding.is_empty() => embedding,
            Ok(_) => {
                warn!(product_id = %product_id, "Embedding provider returned an empty vector");
                return false;
            }
            Err(e) => {
                warn!(product_id = %product_id, error = %e, "Embedding request failed");
                return false;
            }
        };

        let mut stored = true;
        if let Err(e) = self.products.save_embedding_json(product_id, &embedding).await {
            warn!(product_id = %product_id, error = %e, "Failed to store JSON embedding");
            stored = false;
        }
        if let Err(e) = self
            .products
            .save_embedding_vector(product_id, &embedding)
            .await
        {
            warn!(product_id = %product_id, error = %e, "Failed to store vector embedding");
            stored = false;
        }
        stored
    }
}

#[async_trait]
impl EnrichmentHandler for EnrichmentProcessor {
    async fn enrich(&self, product_id: &str) -> Result<EnrichmentOutcome, EnrichmentError> {
        self.run(product_id).await
    }
}
