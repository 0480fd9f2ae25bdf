//! Cache entry and the resolution types flowing in and out of the cache

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured intent: what the command does and with which parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDescriptor {
    /// Device domain, e.g. `light`
    #[serde(default)]
    pub domain: String,
    /// Intent name, e.g. `HassTurnOn`
    pub intent_name: String,
    /// Resolved slot values
    #[serde(default)]
    pub slots: BTreeMap<String, serde_json::Value>,
}

impl IntentDescriptor {
    pub fn new(domain: impl Into<String>, intent_name: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            intent_name: intent_name.into(),
            slots: BTreeMap::new(),
        }
    }

    pub fn with_slot(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.slots.insert(name.into(), value.into());
        self
    }

    pub fn slot(&self, name: &str) -> Option<&serde_json::Value> {
        self.slots.get(name)
    }

    /// Slot value as a string, if it is one
    pub fn slot_str(&self, name: &str) -> Option<&str> {
        self.slots.get(name).and_then(|v| v.as_str())
    }
}

/// Outstanding clarification a hit can replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisambiguationContext {
    /// Question put to the user, replayed verbatim on a hit
    pub pending_question: String,
    /// Entities the user was asked to choose between
    pub candidate_entity_ids: Vec<String>,
}

impl DisambiguationContext {
    pub fn new(pending_question: impl Into<String>, candidate_entity_ids: Vec<String>) -> Self {
        Self {
            pending_question: pending_question.into(),
            candidate_entity_ids,
        }
    }
}

/// Where an entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryOrigin {
    /// Pre-seeded, never evicted
    Anchor,
    /// Learned from real usage, evictable
    Learned,
}

/// A successfully executed command offered to the cache by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub intent: IntentDescriptor,
    #[serde(default)]
    pub entity_ids: Vec<String>,
    #[serde(default)]
    pub disambiguation_context: Option<DisambiguationContext>,
    /// Set by the pipeline when the utterance answered a clarification question
    #[serde(default)]
    pub is_disambiguation_reply: bool,
}

impl Resolution {
    pub fn new(intent: IntentDescriptor, entity_ids: Vec<String>) -> Self {
        Self {
            intent,
            entity_ids,
            disambiguation_context: None,
            is_disambiguation_reply: false,
        }
    }

    pub fn with_disambiguation_context(mut self, context: DisambiguationContext) -> Self {
        self.disambiguation_context = Some(context);
        self
    }

    pub fn as_disambiguation_reply(mut self) -> Self {
        self.is_disambiguation_reply = true;
        self
    }
}

/// One validated command in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    id: String,
    query_text: String,
    embedding: Vec<f32>,
    intent: IntentDescriptor,
    entity_ids: Vec<String>,
    #[serde(default)]
    disambiguation_context: Option<DisambiguationContext>,
    origin: EntryOrigin,
    created_at: DateTime<Utc>,
    last_used_at: DateTime<Utc>,
    #[serde(default)]
    use_count: u64,
}

impl CacheEntry {
    /// Create a learned entry from a resolution
    pub fn learned(
        id: impl Into<String>,
        query_text: impl Into<String>,
        embedding: Vec<f32>,
        resolution: &Resolution,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            query_text: query_text.into(),
            embedding,
            intent: resolution.intent.clone(),
            entity_ids: resolution.entity_ids.clone(),
            disambiguation_context: resolution.disambiguation_context.clone(),
            origin: EntryOrigin::Learned,
            created_at: now,
            last_used_at: now,
            use_count: 0,
        }
    }

    /// Create a permanent anchor entry
    pub fn anchor(
        id: impl Into<String>,
        query_text: impl Into<String>,
        embedding: Vec<f32>,
        intent: IntentDescriptor,
        entity_ids: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            query_text: query_text.into(),
            embedding,
            intent,
            entity_ids,
            disambiguation_context: None,
            origin: EntryOrigin::Anchor,
            created_at: now,
            last_used_at: now,
            use_count: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn intent(&self) -> &IntentDescriptor {
        &self.intent
    }

    pub fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    pub fn disambiguation_context(&self) -> Option<&DisambiguationContext> {
        self.disambiguation_context.as_ref()
    }

    pub fn origin(&self) -> EntryOrigin {
        self.origin
    }

    pub fn is_anchor(&self) -> bool {
        self.origin == EntryOrigin::Anchor
    }

    pub fn is_learned(&self) -> bool {
        self.origin == EntryOrigin::Learned
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_used_at(&self) -> DateTime<Utc> {
        self.last_used_at
    }

    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    /// Device domain of the target, used for per-domain rerank thresholds.
    ///
    /// Taken from the first entity id (`light.kueche` → `light`), falling
    /// back to the intent's domain.
    pub fn device_domain(&self) -> Option<&str> {
        self.entity_ids
            .first()
            .and_then(|id| id.split_once('.'))
            .map(|(domain, _)| domain)
            .or_else(|| Some(self.intent.domain.as_str()).filter(|d| !d.is_empty()))
    }

    /// Only recency fields ever change after creation
    pub fn record_hit(&mut self, now: DateTime<Utc>) {
        self.last_used_at = now;
        self.use_count += 1;
    }

    /// Refresh recency without counting a hit
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_used_at = now;
    }

    /// Whether replaying this entry yields the given resolution's intent and
    /// targets
    pub fn resolves_to(&self, resolution: &Resolution) -> bool {
        self.intent == resolution.intent && self.entity_ids == resolution.entity_ids
    }
}

/// What a lookup hands back to the pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHit {
    pub entry_id: String,
    pub origin: EntryOrigin,
    /// Stored text that matched
    pub matched_text: String,
    pub intent: IntentDescriptor,
    pub entity_ids: Vec<String>,
    pub disambiguation_context: Option<DisambiguationContext>,
    /// Embedding similarity of the accepted candidate
    pub similarity: f32,
    /// Reranker score, absent when the embedding match was accepted alone
    pub rerank_score: Option<f32>,
}

impl CacheHit {
    pub fn from_entry(entry: &CacheEntry, similarity: f32, rerank_score: Option<f32>) -> Self {
        Self {
            entry_id: entry.id().to_string(),
            origin: entry.origin(),
            matched_text: entry.query_text().to_string(),
            intent: entry.intent().clone(),
            entity_ids: entry.entity_ids().to_vec(),
            disambiguation_context: entry.disambiguation_context().cloned(),
            similarity,
            rerank_score,
        }
    }

    pub fn was_reranked(&self) -> bool {
        self.rerank_score.is_some()
    }

    /// Clarification question to re-issue, if the cached state was one
    pub fn pending_question(&self) -> Option<&str> {
        self.disambiguation_context
            .as_ref()
            .map(|c| c.pending_question.as_str())
    }
}
