//! LLM integration for the enrichment step.
//!
//! The enrichment processor depends only on the [`LlmProvider`] and
//! [`EmbeddingProvider`] traits; [`LiteLlmClient`] implements both against an
//! OpenAI-compatible endpoint.
//!
//! ```ignore
//! use styling_jobs::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("Classify this dress")])
//!     .with_json_output();
//! let response = client.generate(request).await?;
//! ```

pub mod litellm;

pub use litellm::{
    Choice, EmbeddingProvider, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider,
    Message, ResponseFormat, Usage,
};
