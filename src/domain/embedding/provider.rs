//! Embedding provider trait definition

use async_trait::async_trait;
use std::fmt::Debug;

use super::EmbeddingRequest;
use crate::domain::DomainError;

/// Trait for embedding providers (Ollama, OpenAI-compatible servers, ...)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Generate the embedding vector for the request's text
    async fn embed(&self, request: EmbeddingRequest) -> Result<Vec<f32>, DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;

    /// Get the embedding dimensions for a model, when known up front
    fn dimensions(&self, model: &str) -> Option<usize>;
}
