use serde::{Deserialize, Serialize};

/// Command cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    #[serde(default)]
    pub total_lookups: u64,
    #[serde(default)]
    pub hits: u64,
    #[serde(default)]
    pub misses: u64,
    /// Embedding matches the reranker refused
    #[serde(default)]
    pub reranker_blocks: u64,
    #[serde(default)]
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache
    pub fn hit_rate(&self) -> f64 {
        if self.total_lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_lookups as f64
        }
    }
}
