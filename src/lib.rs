//! Semantic command cache
//!
//! Replays previously resolved smart-home commands for paraphrased
//! utterances:
//! - Embedding similarity search over learned entries and curated anchors
//! - Cross-encoder reranking to reject near misses
//! - Admission rules keeping state-dependent and one-off commands out
//! - JSON snapshot persistence with LRU eviction

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use infrastructure::services::{CommandCacheService, StoreOutcome};

use std::sync::Arc;

use domain::{AnchorSource, CacheSnapshotRepository, DomainError};
use infrastructure::embedding::OllamaEmbeddingProvider;
use infrastructure::http::HttpClient;
use infrastructure::persistence::{
    InMemorySnapshotRepository, JsonFileAnchorSource, JsonFileSnapshotRepository,
    StaticAnchorSource,
};
use infrastructure::rerank::HttpReranker;
use tracing::info;

/// Wire the cache service from configuration
pub async fn create_service(config: &AppConfig) -> Result<CommandCacheService, DomainError> {
    let http_client = HttpClient::with_timeout(config.cache.provider_timeout())?;

    let mut embedding_provider =
        OllamaEmbeddingProvider::with_base_url(http_client.clone(), &config.embedding.base_url);
    if let Some(dimensions) = config.embedding.dimensions {
        embedding_provider = embedding_provider.with_dimensions(dimensions);
    }

    let snapshots: Arc<dyn CacheSnapshotRepository> = match &config.storage.cache_file {
        Some(path) => Arc::new(JsonFileSnapshotRepository::new(path)),
        None => {
            info!("No cache file configured, learned entries are kept in memory");
            Arc::new(InMemorySnapshotRepository::new())
        }
    };

    let anchors: Arc<dyn AnchorSource> = match &config.storage.anchors_file {
        Some(path) => Arc::new(JsonFileAnchorSource::new(path)),
        None => Arc::new(StaticAnchorSource::empty()),
    };

    let mut builder = CommandCacheService::builder(config.cache.clone())
        .embedding_provider(Arc::new(embedding_provider))
        .snapshot_repository(snapshots)
        .anchor_source(anchors);

    if config.cache.rerank_enabled {
        builder = builder.reranker(Arc::new(HttpReranker::with_base_url(
            http_client,
            &config.reranker.base_url,
        )));
    }

    if let Some(dimensions) = config.embedding.dimensions {
        builder = builder.expected_dimensions(dimensions);
    }

    builder.init().await
}
