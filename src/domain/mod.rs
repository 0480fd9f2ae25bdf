//! Domain layer - Core business logic and entities

pub mod command_cache;
pub mod embedding;
pub mod error;
pub mod rerank;
pub mod vector;

pub use command_cache::{
    Admission, AnchorDefinition, AnchorSet, AnchorSource, CacheEntry, CacheHit, CacheSnapshot,
    CacheSnapshotRepository, CacheStats, CacheStore, CacheSummary, CommandCacheConfig,
    DisambiguationContext, EntryOrigin, IntentDescriptor, IntentKind, Resolution, SkipReason,
};
pub use embedding::{EmbeddingProvider, EmbeddingRequest};
pub use error::DomainError;
pub use rerank::{RankedCandidate, RerankStage, RerankVerdict, Reranker};
pub use vector::{cosine_similarity, try_cosine_similarity};
