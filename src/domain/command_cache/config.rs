//! Command cache configuration

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Configuration for the command cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandCacheConfig {
    /// Whether the cache participates at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Minimum cosine similarity for a candidate (0.0 to 1.0)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Maximum number of learned entries; anchors don't count
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Candidates handed to the reranker
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Embedding model; snapshots written for another model are discarded
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Whether the reranker stage is used
    #[serde(default = "default_enabled")]
    pub rerank_enabled: bool,

    /// Minimum reranker score when no domain override applies
    #[serde(default = "default_rerank_threshold")]
    pub rerank_threshold: f32,

    /// Per device domain rerank thresholds
    #[serde(default = "default_domain_rerank_thresholds")]
    pub domain_rerank_thresholds: HashMap<String, f32>,

    /// Similarity at which a new store only refreshes the existing entry
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f32,

    /// Upper bound for a single embedding or rerank call
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_similarity_threshold() -> f32 {
    0.85
}

fn default_max_entries() -> usize {
    200
}

fn default_top_k() -> usize {
    5
}

fn default_embedding_model() -> String {
    "bge-m3".to_string()
}

fn default_rerank_threshold() -> f32 {
    0.70
}

fn default_domain_rerank_thresholds() -> HashMap<String, f32> {
    // Light-style on/off commands have close "an"/"aus" neighbours
    [
        ("light", 0.73),
        ("switch", 0.73),
        ("fan", 0.73),
        ("cover", 0.73),
        ("climate", 0.69),
    ]
    .into_iter()
    .map(|(domain, threshold)| (domain.to_string(), threshold))
    .collect()
}

fn default_duplicate_threshold() -> f32 {
    0.95
}

fn default_provider_timeout_ms() -> u64 {
    10_000
}

impl Default for CommandCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            similarity_threshold: default_similarity_threshold(),
            max_entries: default_max_entries(),
            top_k: default_top_k(),
            embedding_model: default_embedding_model(),
            rerank_enabled: default_enabled(),
            rerank_threshold: default_rerank_threshold(),
            domain_rerank_thresholds: default_domain_rerank_thresholds(),
            duplicate_threshold: default_duplicate_threshold(),
            provider_timeout_ms: default_provider_timeout_ms(),
        }
    }
}

impl CommandCacheConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the provider timeout as Duration
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    /// Rerank threshold for a device domain, falling back to the global one
    pub fn rerank_threshold_for(&self, domain: Option<&str>) -> f32 {
        domain
            .and_then(|d| self.domain_rerank_thresholds.get(d))
            .copied()
            .unwrap_or(self.rerank_threshold)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the similarity threshold
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the maximum number of learned entries
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the embedding model
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_rerank_enabled(mut self, enabled: bool) -> Self {
        self.rerank_enabled = enabled;
        self
    }

    /// Set the global rerank threshold
    pub fn with_rerank_threshold(mut self, threshold: f32) -> Self {
        self.rerank_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Override the rerank threshold for one device domain
    pub fn with_domain_rerank_threshold(mut self, domain: impl Into<String>, threshold: f32) -> Self {
        self.domain_rerank_thresholds
            .insert(domain.into(), threshold.clamp(0.0, 1.0));
        self
    }

    /// Drop all per-domain overrides
    pub fn without_domain_rerank_thresholds(mut self) -> Self {
        self.domain_rerank_thresholds.clear();
        self
    }

    pub fn with_duplicate_threshold(mut self, threshold: f32) -> Self {
        self.duplicate_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Reject configurations the cache cannot run with
    pub fn validate(&self) -> Result<(), DomainError> {
        let unit_range = |name: &str, value: f32| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(DomainError::configuration(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )))
            }
        };

        unit_range("similarity_threshold", self.similarity_threshold)?;
        unit_range("rerank_threshold", self.rerank_threshold)?;
        unit_range("duplicate_threshold", self.duplicate_threshold)?;

        for (domain, threshold) in &self.domain_rerank_thresholds {
            unit_range(&format!("domain_rerank_thresholds.{}", domain), *threshold)?;
        }

        if self.max_entries == 0 {
            return Err(DomainError::configuration("max_entries must be at least 1"));
        }

        if self.top_k == 0 {
            return Err(DomainError::configuration("top_k must be at least 1"));
        }

        if self.provider_timeout_ms == 0 {
            return Err(DomainError::configuration(
                "provider_timeout_ms must be greater than 0",
            ));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(DomainError::configuration("embedding_model must not be empty"));
        }

        Ok(())
    }
}
