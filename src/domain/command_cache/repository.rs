//! Persistence traits for learned snapshots and anchor definitions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use super::entry::{CacheEntry, IntentDescriptor};
use super::stats::CacheStats;
use crate::domain::DomainError;

/// Current on-disk format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Learned entries as persisted between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: u32,
    /// Model the embeddings were produced with
    pub embedding_model: String,
    #[serde(default)]
    pub entries: Vec<CacheEntry>,
    #[serde(default)]
    pub stats: CacheStats,
}

impl CacheSnapshot {
    pub fn new(embedding_model: impl Into<String>, entries: Vec<CacheEntry>, stats: CacheStats) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            embedding_model: embedding_model.into(),
            entries,
            stats,
        }
    }

    /// Whether the snapshot's embeddings are usable with `model`
    pub fn is_compatible_with(&self, model: &str) -> bool {
        self.embedding_model == model
    }
}

/// A pre-seeded command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorDefinition {
    pub id: String,
    pub text: String,
    pub intent: IntentDescriptor,
    #[serde(default)]
    pub entity_ids: Vec<String>,
    /// Precomputed embedding; computed at startup when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl AnchorDefinition {
    pub fn new(id: impl Into<String>, text: impl Into<String>, intent: IntentDescriptor) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            intent,
            entity_ids: Vec::new(),
            embedding: None,
        }
    }

    pub fn with_entity_ids(mut self, entity_ids: Vec<String>) -> Self {
        self.entity_ids = entity_ids;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Anchor definitions file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorSet {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Model the embedded anchors were produced with, if any were
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub anchors: Vec<AnchorDefinition>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl AnchorSet {
    pub fn new(anchors: Vec<AnchorDefinition>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            embedding_model: None,
            anchors,
        }
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Precomputed embeddings are only trusted for the model they came from
    pub fn embeddings_usable_with(&self, model: &str) -> bool {
        self.embedding_model.as_deref() == Some(model)
    }
}

/// Storage for learned-entry snapshots
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CacheSnapshotRepository: Send + Sync {
    /// Load the last snapshot; `None` when nothing was saved yet
    async fn load(&self) -> Result<Option<CacheSnapshot>, DomainError>;

    /// Replace the stored snapshot
    async fn save(&self, snapshot: &CacheSnapshot) -> Result<(), DomainError>;
}

/// Source of anchor definitions
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AnchorSource: Send + Sync {
    async fn load_anchors(&self) -> Result<AnchorSet, DomainError>;
}
