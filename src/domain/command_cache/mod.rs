//! Semantic command cache domain
//!
//! Maps natural-language smart-home commands to previously resolved intents
//! by embedding similarity, gated by an optional reranker.

mod admission;
mod config;
mod entry;
mod normalize;
mod repository;
mod stats;
mod store;

pub use admission::{classify, Admission, IntentKind, SkipReason, MIN_CACHE_WORDS};
pub use config::CommandCacheConfig;
pub use entry::{
    CacheEntry, CacheHit, DisambiguationContext, EntryOrigin, IntentDescriptor, Resolution,
};
pub use normalize::{
    canonicalize, inject_numeric_slots, is_bypass, normalize_query, word_count, NormalizedQuery,
    NumericKind, NumericValue, NUMERIC_SLOTS,
};
pub use repository::{
    AnchorDefinition, AnchorSet, AnchorSource, CacheSnapshot, CacheSnapshotRepository,
    SNAPSHOT_VERSION,
};
pub use stats::CacheStats;
pub use store::{CacheStore, CacheSummary, LoadReport, ScoredCandidate};

#[cfg(test)]
pub use repository::{MockAnchorSource, MockCacheSnapshotRepository};
