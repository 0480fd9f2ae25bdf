//! Embedding provider domain models and traits

mod provider;
mod request;

pub use provider::EmbeddingProvider;
pub use request::EmbeddingRequest;

#[cfg(test)]
pub use provider::mock::MockEmbeddingProvider;
