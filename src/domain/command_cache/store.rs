//! In-memory entry collection with capacity-bounded LRU eviction
//!
//! The store is plain synchronous data; the service wraps it in a lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::CacheEntry;
use crate::domain::vector::{cosine_similarity, validate_dimensions};
use crate::domain::DomainError;

/// Entry counts reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSummary {
    pub anchor_count: usize,
    pub learned_count: usize,
    /// Maximum number of learned entries
    pub capacity: usize,
}

/// A search result; carries no embedding so scans stay cheap to return
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub id: String,
    pub query_text: String,
    pub similarity: f32,
    pub device_domain: Option<String>,
}

/// What `load` kept and dropped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub learned: usize,
    pub anchors: usize,
    /// Anchors skipped because their id was already taken
    pub shadowed_anchors: usize,
    /// Learned entries skipped because an earlier one had the same id
    pub duplicate_learned: usize,
    /// Learned entries evicted to fit the configured capacity
    pub evicted: usize,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    // Insertion order, which breaks recency ties during eviction
    entries: Vec<CacheEntry>,
    max_entries: usize,
    dimension: Option<usize>,
}

impl CacheStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
            dimension: None,
        }
    }

    /// Replace the contents with persisted learned entries plus anchors.
    ///
    /// The first learned entry with a given id wins. Anchors are merged by
    /// id and never replace a learned entry with the same id. All embeddings must share one dimension.
    pub fn load(
        &mut self,
        learned: Vec<CacheEntry>,
        anchors: Vec<CacheEntry>,
    ) -> Result<LoadReport, DomainError> {
        let mut entries: Vec<CacheEntry> = Vec::with_capacity(learned.len());
        let mut report = LoadReport::default();

        for entry in learned.into_iter().filter(|e| e.is_learned()) {
            if entries.iter().any(|e| e.id() == entry.id()) {
                report.duplicate_learned += 1;
                continue;
            }
            entries.push(entry);
        }

        report.learned = entries.len();

        for anchor in anchors.into_iter().filter(|e| e.is_anchor()) {
            if entries.iter().any(|e| e.id() == anchor.id()) {
                report.shadowed_anchors += 1;
                continue;
            }
            entries.push(anchor);
            report.anchors += 1;
        }

        let dimension = validate_dimensions(entries.iter().map(|e| e.embedding()))?;

        self.entries = entries;
        self.dimension = dimension;

        while self.learned_count() > self.max_entries {
            if self.evict_one().is_none() {
                break;
            }
            report.evicted += 1;
        }

        report.learned -= report.evicted;

        Ok(report)
    }

    /// Embedding dimension shared by all entries, once known
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn learned_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_learned()).count()
    }

    pub fn anchor_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_anchor()).count()
    }

    pub fn summary(&self) -> CacheSummary {
        CacheSummary {
            anchor_count: self.anchor_count(),
            learned_count: self.learned_count(),
            capacity: self.max_entries,
        }
    }

    pub fn get(&self, id: &str) -> Option<&CacheEntry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    /// Copies of the learned entries, for snapshots
    pub fn learned_entries(&self) -> Vec<CacheEntry> {
        self.entries
            .iter()
            .filter(|e| e.is_learned())
            .cloned()
            .collect()
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), DomainError> {
        match self.dimension {
            Some(expected) if expected != vector.len() => {
                Err(DomainError::dimension_mismatch(expected, vector.len()))
            }
            _ => Ok(()),
        }
    }

    /// Candidates with similarity ≥ `min_similarity`, best first, at most `limit`
    pub fn search(
        &self,
        query: &[f32],
        min_similarity: f32,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>, DomainError> {
        self.check_dimension(query)?;

        let mut scored = Vec::new();

        for entry in &self.entries {
            let similarity = cosine_similarity(query, entry.embedding())?;

            if similarity >= min_similarity {
                scored.push(ScoredCandidate {
                    id: entry.id().to_string(),
                    query_text: entry.query_text().to_string(),
                    similarity,
                    device_domain: entry.device_domain().map(str::to_string),
                });
            }
        }

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }

    /// Most similar learned entry among those `accept` admits, used to
    /// detect near-duplicate stores
    pub fn nearest_learned<F>(
        &self,
        query: &[f32],
        accept: F,
    ) -> Result<Option<(String, f32)>, DomainError>
    where
        F: Fn(&CacheEntry) -> bool,
    {
        self.check_dimension(query)?;

        let mut best: Option<(String, f32)> = None;

        for entry in self.entries.iter().filter(|e| e.is_learned() && accept(e)) {
            let similarity = cosine_similarity(query, entry.embedding())?;

            if best.as_ref().is_none_or(|(_, s)| similarity > *s) {
                best = Some((entry.id().to_string(), similarity));
            }
        }

        Ok(best)
    }

    /// Insert a learned entry, evicting the least recently used learned
    /// entry first when at capacity. Returns the evicted entry.
    pub fn insert_learned(&mut self, entry: CacheEntry) -> Result<Option<CacheEntry>, DomainError> {
        if !entry.is_learned() {
            return Err(DomainError::validation("Only learned entries can be inserted"));
        }

        if entry.embedding().is_empty() {
            return Err(DomainError::validation("Entry embedding must not be empty"));
        }

        if self.max_entries == 0 {
            return Err(DomainError::validation("Cache capacity is zero"));
        }

        self.check_dimension(entry.embedding())?;

        if self.get(entry.id()).is_some() {
            return Err(DomainError::validation(format!(
                "Entry '{}' already exists",
                entry.id()
            )));
        }

        let evicted = if self.learned_count() >= self.max_entries {
            self.evict_one()
        } else {
            None
        };

        self.dimension.get_or_insert(entry.embedding().len());
        self.entries.push(entry);

        Ok(evicted)
    }

    /// Remove the learned entry with the oldest `last_used_at`; ties go to
    /// the older `created_at`, then to insertion order.
    pub fn evict_one(&mut self) -> Option<CacheEntry> {
        let victim = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_learned())
            .min_by_key(|(_, e)| (e.last_used_at(), e.created_at()))
            .map(|(index, _)| index)?;

        Some(self.entries.remove(victim))
    }

    /// Mark an entry as used and return a copy of it
    pub fn record_hit(&mut self, id: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let entry = self.entries.iter_mut().find(|e| e.id() == id)?;
        entry.record_hit(now);
        Some(entry.clone())
    }

    /// Refresh an entry's recency without counting a hit
    pub fn touch(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        match self.entries.iter_mut().find(|e| e.id() == id) {
            Some(entry) => {
                entry.touch(now);
                true
            }
            None => false,
        }
    }

    /// Drop every learned entry, keeping anchors. Returns how many went.
    pub fn invalidate(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.is_anchor());

        if self.entries.is_empty() {
            self.dimension = None;
        }

        before - self.entries.len()
    }
}
