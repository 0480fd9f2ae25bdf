//! Semantic command caching service
//!
//! Answers repeated smart-home commands from previously resolved intents,
//! matching by embedding similarity and gating matches with a reranker.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::command_cache::{
    classify, inject_numeric_slots, is_bypass, normalize_query, Admission, AnchorSource,
    CacheEntry, CacheHit, CacheSnapshot, CacheSnapshotRepository, CacheStats, CacheStore,
    CacheSummary, CommandCacheConfig, Resolution, SkipReason,
};
use crate::domain::embedding::{EmbeddingProvider, EmbeddingRequest};
use crate::domain::rerank::{RerankStage, RerankVerdict, Reranker};
use crate::domain::DomainError;
use crate::infrastructure::metrics::{self, LookupOutcome};
use crate::infrastructure::persistence::InMemorySnapshotRepository;

/// What happened to a store request
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    /// New learned entry inserted
    Stored { id: String, evicted: Option<String> },
    /// Near-duplicate of an entry with the same resolution, whose recency
    /// was refreshed without counting a hit
    Refreshed { id: String, similarity: f32 },
    /// Rejected by the admission rules
    Skipped(SkipReason),
    /// Embedding provider failed or timed out
    Unavailable,
    /// Cache switched off
    Disabled,
}

impl StoreOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, StoreOutcome::Stored { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOutcome::Stored { .. } => "stored",
            StoreOutcome::Refreshed { .. } => "refreshed",
            StoreOutcome::Skipped(reason) => reason.as_str(),
            StoreOutcome::Unavailable => "unavailable",
            StoreOutcome::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Default)]
struct StatsCounters {
    total_lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    reranker_blocks: AtomicU64,
    evictions: AtomicU64,
}

impl StatsCounters {
    fn restore(&self, stats: CacheStats) {
        self.total_lookups.store(stats.total_lookups, Ordering::Relaxed);
        self.hits.store(stats.hits, Ordering::Relaxed);
        self.misses.store(stats.misses, Ordering::Relaxed);
        self.reranker_blocks.store(stats.reranker_blocks, Ordering::Relaxed);
        self.evictions.store(stats.evictions, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            total_lookups: self.total_lookups.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            reranker_blocks: self.reranker_blocks.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Semantic cache for resolved smart-home commands.
///
/// Built with [`CommandCacheService::builder`]; callers share it behind an
/// `Arc`.
pub struct CommandCacheService {
    store: RwLock<CacheStore>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    rerank: RerankStage,
    snapshots: Arc<dyn CacheSnapshotRepository>,
    config: CommandCacheConfig,
    stats: StatsCounters,
    // Serializes snapshot writes so the file follows mutation order
    persist_lock: Mutex<()>,
}

impl fmt::Debug for CommandCacheService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandCacheService")
            .field("embedding_provider", &self.embedding_provider)
            .field("rerank", &self.rerank)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Collects the collaborators for [`CommandCacheService`]
pub struct CommandCacheServiceBuilder {
    config: CommandCacheConfig,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    rerank: RerankStage,
    snapshots: Option<Arc<dyn CacheSnapshotRepository>>,
    anchors: Option<Arc<dyn AnchorSource>>,
    expected_dimensions: Option<usize>,
}

impl CommandCacheServiceBuilder {
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.rerank = RerankStage::enabled(reranker);
        self
    }

    pub fn rerank_stage(mut self, stage: RerankStage) -> Self {
        self.rerank = stage;
        self
    }

    /// Where learned entries are persisted; in memory when unset
    pub fn snapshot_repository(mut self, repository: Arc<dyn CacheSnapshotRepository>) -> Self {
        self.snapshots = Some(repository);
        self
    }

    pub fn anchor_source(mut self, source: Arc<dyn AnchorSource>) -> Self {
        self.anchors = Some(source);
        self
    }

    /// Embedding dimension every entry must have; defaults to what the
    /// provider reports for the configured model
    pub fn expected_dimensions(mut self, dimensions: usize) -> Self {
        self.expected_dimensions = Some(dimensions);
        self
    }

    /// Load persisted state and anchors, then validate dimensions.
    ///
    /// Missing or unreadable state only produces warnings; inconsistent
    /// embedding dimensions are an error.
    pub async fn init(self) -> Result<CommandCacheService, DomainError> {
        self.config.validate()?;

        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| DomainError::configuration("An embedding provider is required"))?;

        let snapshots = self
            .snapshots
            .unwrap_or_else(|| Arc::new(InMemorySnapshotRepository::new()));

        let rerank = if self.config.rerank_enabled {
            self.rerank
        } else {
            RerankStage::Disabled
        };

        if !rerank.is_enabled() {
            info!("Reranker disabled, embedding matches are accepted alone");
        }

        let service = CommandCacheService {
            store: RwLock::new(CacheStore::new(self.config.max_entries)),
            embedding_provider,
            rerank,
            snapshots,
            config: self.config,
            stats: StatsCounters::default(),
            persist_lock: Mutex::new(()),
        };

        let (learned, stats) = service.load_snapshot().await;

        let anchors = match self.anchors {
            Some(source) => service.load_anchors(source.as_ref()).await,
            None => Vec::new(),
        };

        let expected_dimensions = self.expected_dimensions.or_else(|| {
            service
                .embedding_provider
                .dimensions(&service.config.embedding_model)
        });

        let (report, dimension) = {
            let mut store = service.write_store()?;
            let report = store.load(learned, anchors)?;
            (report, store.dimension())
        };

        if let (Some(expected), Some(actual)) = (expected_dimensions, dimension) {
            if expected != actual {
                error!(
                    "Cached embeddings have dimension {} but model '{}' produces {}",
                    actual, service.config.embedding_model, expected
                );
                return Err(DomainError::dimension_mismatch(expected, actual));
            }
        }

        service.stats.restore(stats);

        if report.duplicate_learned > 0 {
            warn!(
                "{} snapshot entries repeat an earlier id and were skipped",
                report.duplicate_learned
            );
        }

        if report.shadowed_anchors > 0 {
            warn!(
                "{} anchors share an id with a learned entry and were skipped",
                report.shadowed_anchors
            );
        }

        info!(
            "Command cache ready: {} anchors, {} learned entries (capacity {}, model '{}')",
            report.anchors, report.learned, service.config.max_entries, service.config.embedding_model
        );

        service.publish_entry_counts();

        Ok(service)
    }
}

impl CommandCacheService {
    /// Start building a service
    pub fn builder(config: CommandCacheConfig) -> CommandCacheServiceBuilder {
        CommandCacheServiceBuilder {
            config,
            embedding_provider: None,
            rerank: RerankStage::Disabled,
            snapshots: None,
            anchors: None,
            expected_dimensions: None,
        }
    }

    /// Check if the cache is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Get the configuration
    pub fn config(&self) -> &CommandCacheConfig {
        &self.config
    }

    fn read_store(&self) -> Result<RwLockReadGuard<'_, CacheStore>, DomainError> {
        self.store
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write_store(&self) -> Result<RwLockWriteGuard<'_, CacheStore>, DomainError> {
        self.store
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))
    }

    /// Generate an embedding, bounded by the provider timeout
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let request = EmbeddingRequest::new(&self.config.embedding_model, text);
        let timeout = self.config.provider_timeout();

        let vector = match tokio::time::timeout(timeout, self.embedding_provider.embed(request)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(DomainError::timeout(
                    self.embedding_provider.provider_name(),
                    self.config.provider_timeout_ms,
                ));
            }
        };

        if vector.is_empty() {
            return Err(DomainError::provider(
                self.embedding_provider.provider_name(),
                "Empty embedding returned",
            ));
        }

        Ok(vector)
    }

    async fn load_snapshot(&self) -> (Vec<CacheEntry>, CacheStats) {
        match self.snapshots.load().await {
            Ok(Some(snapshot)) if snapshot.is_compatible_with(&self.config.embedding_model) => {
                debug!("Loaded {} learned entries from snapshot", snapshot.entries.len());
                (snapshot.entries, snapshot.stats)
            }
            Ok(Some(snapshot)) => {
                warn!(
                    "Discarding cache snapshot built with embedding model '{}' (configured '{}')",
                    snapshot.embedding_model, self.config.embedding_model
                );
                (Vec::new(), CacheStats::default())
            }
            Ok(None) => {
                debug!("No cache snapshot found, starting empty");
                (Vec::new(), CacheStats::default())
            }
            Err(e) => {
                warn!("Failed to load cache snapshot, starting empty: {}", e);
                (Vec::new(), CacheStats::default())
            }
        }
    }

    async fn load_anchors(&self, source: &dyn AnchorSource) -> Vec<CacheEntry> {
        let set = match source.load_anchors().await {
            Ok(set) => set,
            Err(e) => {
                warn!("Failed to load anchors, continuing without: {}", e);
                return Vec::new();
            }
        };

        let precomputed_usable = set.embeddings_usable_with(&self.config.embedding_model);
        let now = Utc::now();
        let mut anchors = Vec::with_capacity(set.anchors.len());

        for definition in set.anchors {
            let text = normalize_query(&definition.text).text;

            let embedding = match definition.embedding {
                Some(embedding) if precomputed_usable && !embedding.is_empty() => embedding,
                _ => match self.embed(&text).await {
                    Ok(embedding) => embedding,
                    Err(e) => {
                        warn!("Skipping anchor '{}': {}", definition.id, e);
                        continue;
                    }
                },
            };

            anchors.push(CacheEntry::anchor(
                definition.id,
                text,
                embedding,
                definition.intent,
                definition.entity_ids,
                now,
            ));
        }

        anchors
    }

    /// Look up a cached resolution for an utterance.
    ///
    /// Provider failures degrade to a miss; only inconsistent embedding
    /// dimensions are reported as an error.
    pub async fn lookup(&self, query: &str) -> Result<Option<CacheHit>, DomainError> {
        let started = Instant::now();

        if !self.config.enabled {
            return Ok(None);
        }

        let normalized = normalize_query(query);

        if normalized.is_empty() {
            return Ok(None);
        }

        if is_bypass(&normalized.text) {
            debug!("Bypassing cache for '{}'", normalized.text);
            metrics::record_lookup(LookupOutcome::Bypass, started.elapsed());
            return Ok(None);
        }

        self.stats.total_lookups.fetch_add(1, Ordering::Relaxed);

        let embedding = match self.embed(&normalized.text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Failed to generate embedding for cache lookup: {}", e);
                return Ok(self.miss(LookupOutcome::Unavailable, started));
            }
        };

        let search = {
            let store = self.read_store()?;
            store.search(&embedding, self.config.similarity_threshold, self.config.top_k)
        };

        let candidates = match search {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("Cache lookup failed: {}", e);
                self.miss(LookupOutcome::Miss, started);
                return Err(e);
            }
        };

        if candidates.is_empty() {
            debug!("Command cache miss for '{}'", normalized.text);
            return Ok(self.miss(LookupOutcome::Miss, started));
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.query_text.clone()).collect();

        let verdict = self
            .rerank
            .judge(
                &normalized.text,
                &texts,
                self.config.provider_timeout(),
                |index| {
                    self.config
                        .rerank_threshold_for(candidates[index].device_domain.as_deref())
                },
            )
            .await;

        let (chosen, rerank_score) = match verdict {
            RerankVerdict::Accepted { index, score } => (index, Some(score)),
            RerankVerdict::Rejected {
                index,
                score,
                threshold,
            } => {
                self.stats.reranker_blocks.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Reranker blocked '{}' -> '{}' (score {:.3} < {:.2}, similarity {:.3})",
                    normalized.text,
                    candidates[index].query_text,
                    score,
                    threshold,
                    candidates[index].similarity
                );
                return Ok(self.miss(LookupOutcome::Blocked, started));
            }
            RerankVerdict::Fallback(reason) => {
                debug!("Accepting top embedding match without reranker ({:?})", reason);
                (0, None)
            }
        };

        let candidate = &candidates[chosen];

        let entry = {
            let mut store = self.write_store()?;
            store.record_hit(&candidate.id, Utc::now())
        };

        let Some(entry) = entry else {
            debug!("Entry {} was evicted before the hit was recorded", candidate.id);
            return Ok(self.miss(LookupOutcome::Miss, started));
        };

        let mut hit = CacheHit::from_entry(&entry, candidate.similarity, rerank_score);
        inject_numeric_slots(&mut hit.intent.slots, &normalized.values);

        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        metrics::record_lookup(LookupOutcome::Hit, started.elapsed());

        info!(
            "Command cache hit: '{}' -> '{}' (similarity {:.3}, rerank {:?}, intent {})",
            normalized.text, hit.matched_text, hit.similarity, hit.rerank_score, hit.intent.intent_name
        );

        Ok(Some(hit))
    }

    fn miss(&self, outcome: LookupOutcome, started: Instant) -> Option<CacheHit> {
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_lookup(outcome, started.elapsed());
        None
    }

    /// Offer a successfully executed command to the cache.
    ///
    /// Returns true when a new entry was learned.
    pub async fn store(&self, query: &str, resolution: &Resolution) -> Result<bool, DomainError> {
        Ok(self.store_with_outcome(query, resolution).await?.is_stored())
    }

    /// Like [`store`](Self::store), reporting why nothing was stored
    pub async fn store_with_outcome(
        &self,
        query: &str,
        resolution: &Resolution,
    ) -> Result<StoreOutcome, DomainError> {
        if !self.config.enabled {
            return Ok(StoreOutcome::Disabled);
        }

        if let Admission::Skip(reason) = classify(query, resolution) {
            info!("Not caching '{}': {}", query.trim(), reason);
            metrics::record_store(reason.as_str());
            return Ok(StoreOutcome::Skipped(reason));
        }

        let normalized = normalize_query(query);

        let embedding = match self.embed(&normalized.text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Failed to generate embedding, not caching '{}': {}", normalized.text, e);
                metrics::record_store(StoreOutcome::Unavailable.as_str());
                return Ok(StoreOutcome::Unavailable);
            }
        };

        let outcome = {
            let mut store = self.write_store()?;
            let now = Utc::now();

            // Only an entry replaying the same resolution counts as a duplicate;
            // "an" and "aus" embed almost identically
            let duplicate =
                store.nearest_learned(&embedding, |entry| entry.resolves_to(resolution))?;

            match duplicate {
                Some((id, similarity)) if similarity >= self.config.duplicate_threshold => {
                    store.touch(&id, now);
                    StoreOutcome::Refreshed { id, similarity }
                }
                _ => {
                    let entry = CacheEntry::learned(
                        format!("learned:{}", Uuid::new_v4()),
                        normalized.text.clone(),
                        embedding,
                        resolution,
                        now,
                    );
                    let id = entry.id().to_string();
                    let evicted = store.insert_learned(entry)?;

                    StoreOutcome::Stored {
                        id,
                        evicted: evicted.map(|e| e.id().to_string()),
                    }
                }
            }
        };

        match &outcome {
            StoreOutcome::Stored { id, evicted } => {
                if let Some(evicted) = evicted {
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                    metrics::record_eviction();
                    debug!("Evicted least recently used entry {}", evicted);
                }
                info!(
                    "Cached '{}' -> {} as {}",
                    normalized.text, resolution.intent.intent_name, id
                );
            }
            StoreOutcome::Refreshed { id, similarity } => {
                debug!(
                    "'{}' duplicates {} (similarity {:.3}), refreshed instead of stored",
                    normalized.text, id, similarity
                );
            }
            _ => {}
        }

        metrics::record_store(outcome.as_str());
        self.persist().await;
        self.publish_entry_counts();

        Ok(outcome)
    }

    /// Drop all learned entries, keeping anchors
    pub async fn invalidate(&self) -> Result<(), DomainError> {
        let removed = {
            let mut store = self.write_store()?;
            store.invalidate()
        };

        info!("Command cache invalidated, {} learned entries removed", removed);

        self.persist().await;
        self.publish_entry_counts();

        Ok(())
    }

    /// Entry counts
    pub fn summary(&self) -> Result<CacheSummary, DomainError> {
        Ok(self.read_store()?.summary())
    }

    /// Counters since the snapshot history began
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Write the final snapshot, capturing recency updates from hits
    pub async fn shutdown(&self) {
        self.persist().await;
        info!("Command cache shut down");
    }

    fn snapshot(&self) -> Result<CacheSnapshot, DomainError> {
        let store = self.read_store()?;

        Ok(CacheSnapshot::new(
            &self.config.embedding_model,
            store.learned_entries(),
            self.stats.snapshot(),
        ))
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;

        let snapshot = match self.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to capture cache snapshot: {}", e);
                return;
            }
        };

        if let Err(e) = self.snapshots.save(&snapshot).await {
            warn!("Failed to persist cache snapshot, continuing in memory: {}", e);
        }
    }

    fn publish_entry_counts(&self) {
        if let Ok(summary) = self.summary() {
            metrics::record_entry_counts(&summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::command_cache::{
        AnchorDefinition, AnchorSet, DisambiguationContext, IntentDescriptor,
        MockCacheSnapshotRepository,
    };
    use crate::domain::embedding::MockEmbeddingProvider;
    use crate::domain::rerank::MockReranker;
    use crate::infrastructure::persistence::StaticAnchorSource;
    use serde_json::json;
    use std::time::Duration;

    const STORED: &str = "schalte das licht im büro an";
    const PARAPHRASE: &str = "mach das licht im büro an";
    const UNRELATED: &str = "wie wird das wetter morgen";
    const CLOSE: &str = "licht im büro bitte anmachen";

    fn light_on() -> Resolution {
        Resolution::new(
            IntentDescriptor::new("light", "HassTurnOn").with_slot("area", "Büro"),
            vec!["light.buero".to_string()],
        )
    }

    fn config() -> CommandCacheConfig {
        CommandCacheConfig::default().with_provider_timeout(Duration::from_millis(200))
    }

    fn office_provider() -> MockEmbeddingProvider {
        MockEmbeddingProvider::new("mock", 2)
            .with_vector(STORED, vec![1.0, 0.0])
            .with_vector(PARAPHRASE, vec![0.91, 0.41461])
            .with_vector(UNRELATED, vec![0.4, 0.91652])
            .with_vector(CLOSE, vec![0.9, 0.43589])
    }

    struct Harness {
        service: CommandCacheService,
        provider: Arc<MockEmbeddingProvider>,
        repo: Arc<InMemorySnapshotRepository>,
    }

    async fn harness(
        config: CommandCacheConfig,
        provider: MockEmbeddingProvider,
        reranker: Option<MockReranker>,
    ) -> Harness {
        let provider = Arc::new(provider);
        let repo = Arc::new(InMemorySnapshotRepository::new());

        let mut builder = CommandCacheService::builder(config)
            .embedding_provider(provider.clone())
            .snapshot_repository(repo.clone());

        if let Some(reranker) = reranker {
            builder = builder.reranker(Arc::new(reranker));
        }

        Harness {
            service: builder.init().await.unwrap(),
            provider,
            repo,
        }
    }

    #[tokio::test]
    async fn test_paraphrase_hit_confirmed_by_reranker() {
        let reranker = MockReranker::new().with_score(STORED, 0.88);
        let h = harness(config(), office_provider(), Some(reranker)).await;

        assert!(h.service.store("Schalte das Licht im Büro an", &light_on()).await.unwrap());

        let hit = h.service.lookup("Mach das Licht im Büro an").await.unwrap().unwrap();

        assert_eq!(hit.intent.intent_name, "HassTurnOn");
        assert_eq!(hit.entity_ids, vec!["light.buero".to_string()]);
        assert_eq!(hit.matched_text, STORED);
        assert!((hit.similarity - 0.91).abs() < 1e-3);
        assert_eq!(hit.rerank_score, Some(0.88));

        let stats = h.service.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.total_lookups, 1);
    }

    #[tokio::test]
    async fn test_unrelated_query_misses() {
        let reranker = Arc::new(MockReranker::new());
        let provider = Arc::new(office_provider());
        let service = CommandCacheService::builder(config())
            .embedding_provider(provider.clone())
            .reranker(reranker.clone())
            .init()
            .await
            .unwrap();

        service.store(STORED, &light_on()).await.unwrap();

        assert!(service.lookup(UNRELATED).await.unwrap().is_none());
        assert_eq!(reranker.calls(), 0);
        assert_eq!(service.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_unavailable_reranker_falls_back_to_embedding_match() {
        let reranker = MockReranker::new().with_delay(Duration::from_secs(60));
        let h = harness(config(), office_provider(), Some(reranker)).await;
        h.service.store(STORED, &light_on()).await.unwrap();

        let started = Instant::now();
        let hit = h.service.lookup(CLOSE).await.unwrap().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!((hit.similarity - 0.90).abs() < 1e-3);
        assert_eq!(hit.rerank_score, None);
    }

    #[tokio::test]
    async fn test_failing_reranker_falls_back() {
        let reranker = MockReranker::new().with_error("connection refused");
        let h = harness(config(), office_provider(), Some(reranker)).await;
        h.service.store(STORED, &light_on()).await.unwrap();

        let hit = h.service.lookup(PARAPHRASE).await.unwrap();

        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn test_reranker_blocks_near_miss() {
        let reranker = MockReranker::new().with_score(STORED, 0.30);
        let h = harness(config(), office_provider(), Some(reranker)).await;
        h.service.store(STORED, &light_on()).await.unwrap();

        assert!(h.service.lookup(PARAPHRASE).await.unwrap().is_none());

        let stats = h.service.stats();
        assert_eq!(stats.reranker_blocks, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn test_domain_threshold_applies() {
        // 0.71 clears the global 0.70 but not the light threshold of 0.73
        let reranker = MockReranker::new().with_score(STORED, 0.71);
        let h = harness(config(), office_provider(), Some(reranker)).await;
        h.service.store(STORED, &light_on()).await.unwrap();

        assert!(h.service.lookup(PARAPHRASE).await.unwrap().is_none());
        assert_eq!(h.service.stats().reranker_blocks, 1);
    }

    #[tokio::test]
    async fn test_disabled_reranker_config_ignores_reranker() {
        let reranker = Arc::new(MockReranker::new().with_score(STORED, 0.1));
        let service = CommandCacheService::builder(config().with_rerank_enabled(false))
            .embedding_provider(Arc::new(office_provider()))
            .reranker(reranker.clone())
            .init()
            .await
            .unwrap();
        service.store(STORED, &light_on()).await.unwrap();

        assert!(service.lookup(PARAPHRASE).await.unwrap().is_some());
        assert_eq!(reranker.calls(), 0);
    }

    #[tokio::test]
    async fn test_short_utterance_never_persisted() {
        let h = harness(config(), office_provider(), None).await;

        assert!(!h.service.store("Küche", &light_on()).await.unwrap());

        assert_eq!(h.service.summary().unwrap().learned_count, 0);
        assert_eq!(h.provider.calls(), 0);
        assert_eq!(h.repo.save_count(), 0);
    }

    #[tokio::test]
    async fn test_step_down_never_persisted() {
        let h = harness(config(), office_provider(), None).await;
        let resolution = Resolution::new(
            IntentDescriptor::new("light", "HassLightSet").with_slot("command", "step_down"),
            vec!["light.buero".to_string()],
        );

        let outcome = h
            .service
            .store_with_outcome("Mache das Licht dunkler", &resolution)
            .await
            .unwrap();

        assert_eq!(outcome, StoreOutcome::Skipped(SkipReason::StateDependent));
        assert_eq!(h.service.summary().unwrap().learned_count, 0);
    }

    #[tokio::test]
    async fn test_disambiguation_reply_skipped() {
        let h = harness(config(), office_provider(), None).await;

        let outcome = h
            .service
            .store_with_outcome("die zweite bitte", &light_on())
            .await
            .unwrap();

        assert_eq!(outcome, StoreOutcome::Skipped(SkipReason::DisambiguationResponse));
    }

    #[tokio::test]
    async fn test_near_duplicate_refreshes() {
        let h = harness(config(), office_provider(), None).await;

        assert!(h.service.store(STORED, &light_on()).await.unwrap());
        let outcome = h
            .service
            .store_with_outcome("Schalte das Licht im Büro an", &light_on())
            .await
            .unwrap();

        assert!(matches!(outcome, StoreOutcome::Refreshed { .. }));
        assert_eq!(h.service.summary().unwrap().learned_count, 1);
        assert_eq!(h.repo.save_count(), 2);

        let snapshot = h.repo.current().unwrap().unwrap();
        assert_eq!(snapshot.entries[0].use_count(), 0);
    }

    #[tokio::test]
    async fn test_near_duplicate_with_other_resolution_is_stored() {
        let provider = office_provider().with_vector("schalte das licht im büro aus", vec![0.99, 0.1]);
        let h = harness(config().with_rerank_enabled(false), provider, None).await;
        let light_off = Resolution::new(
            IntentDescriptor::new("light", "HassTurnOff").with_slot("area", "Büro"),
            vec!["light.buero".to_string()],
        );

        assert!(h.service.store("Schalte das Licht im Büro an", &light_on()).await.unwrap());
        let outcome = h
            .service
            .store_with_outcome("Schalte das Licht im Büro aus", &light_off)
            .await
            .unwrap();

        assert!(outcome.is_stored());
        assert_eq!(h.service.summary().unwrap().learned_count, 2);

        let hit = h
            .service
            .lookup("Schalte das Licht im Büro aus")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.intent.intent_name, "HassTurnOff");

        let snapshot = h.repo.current().unwrap().unwrap();
        let turn_on = snapshot
            .entries
            .iter()
            .find(|e| e.intent().intent_name == "HassTurnOn")
            .unwrap();
        assert_eq!(turn_on.use_count(), 0);
    }

    #[tokio::test]
    async fn test_store_persists_snapshot() {
        let h = harness(config(), office_provider(), None).await;

        h.service.store(STORED, &light_on()).await.unwrap();

        let snapshot = h.repo.current().unwrap().unwrap();
        assert_eq!(snapshot.embedding_model, "bge-m3");
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].query_text(), STORED);
        assert!(snapshot.entries[0].id().starts_with("learned:"));
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let h = harness(
            config().with_max_entries(3),
            MockEmbeddingProvider::new("mock", 64),
            None,
        )
        .await;

        let mut ids = Vec::new();
        for text in [
            "schalte das licht in der küche an",
            "öffne die rollläden im wohnzimmer",
            "stelle die heizung im bad höher",
        ] {
            match h.service.store_with_outcome(text, &light_on()).await.unwrap() {
                StoreOutcome::Stored { id, evicted } => {
                    assert!(evicted.is_none());
                    ids.push(id);
                }
                other => panic!("unexpected outcome {:?}", other),
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Touch the oldest entry so the second one becomes least recently used
        assert!(h.service.lookup("schalte das licht in der küche an").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(5)).await;

        let outcome = h
            .service
            .store_with_outcome("schalte den fernseher im wohnzimmer aus", &light_on())
            .await
            .unwrap();

        match outcome {
            StoreOutcome::Stored { evicted, .. } => assert_eq!(evicted, Some(ids[1].clone())),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(h.service.summary().unwrap().learned_count, 3);
        assert_eq!(h.service.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_anchors_survive_eviction_and_invalidation() {
        let anchors = AnchorSet::new(vec![AnchorDefinition::new(
            "anchor:all_covers_up",
            "Öffne alle Rollläden",
            IntentDescriptor::new("cover", "HassTurnOn"),
        )
        .with_entity_ids(vec!["cover.wohnzimmer".to_string()])]);

        let provider = Arc::new(MockEmbeddingProvider::new("mock", 64));
        let service = CommandCacheService::builder(config().with_max_entries(1))
            .embedding_provider(provider.clone())
            .anchor_source(Arc::new(StaticAnchorSource::new(anchors)))
            .init()
            .await
            .unwrap();

        service.store("schalte das licht in der küche an", &light_on()).await.unwrap();
        service.store("schalte das licht im flur an", &light_on()).await.unwrap();

        let summary = service.summary().unwrap();
        assert_eq!(summary.anchor_count, 1);
        assert_eq!(summary.learned_count, 1);

        service.invalidate().await.unwrap();
        service.invalidate().await.unwrap();

        let summary = service.summary().unwrap();
        assert_eq!(summary.anchor_count, 1);
        assert_eq!(summary.learned_count, 0);

        let hit = service.lookup("öffne alle rollläden").await.unwrap().unwrap();
        assert_eq!(hit.entry_id, "anchor:all_covers_up");
        assert!(hit.origin == crate::domain::command_cache::EntryOrigin::Anchor);
    }

    #[tokio::test]
    async fn test_double_invalidate_is_idempotent() {
        let h = harness(config(), office_provider(), None).await;
        h.service.store(STORED, &light_on()).await.unwrap();

        h.service.invalidate().await.unwrap();
        let first = h.service.summary().unwrap();
        h.service.invalidate().await.unwrap();
        let second = h.service.summary().unwrap();

        assert_eq!(first, second);
        assert_eq!(second.learned_count, 0);
        assert!(h.repo.current().unwrap().unwrap().entries.is_empty());
        assert!(h.service.lookup(PARAPHRASE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_precomputed_anchor_embeddings_reused() {
        let anchors = AnchorSet::new(vec![AnchorDefinition::new(
            "anchor:1",
            "schalte alle lichter aus",
            IntentDescriptor::new("light", "HassTurnOff"),
        )
        .with_embedding(vec![0.0, 1.0])])
        .with_embedding_model("bge-m3");

        let provider = Arc::new(MockEmbeddingProvider::new("mock", 2));
        let service = CommandCacheService::builder(config())
            .embedding_provider(provider.clone())
            .anchor_source(Arc::new(StaticAnchorSource::new(anchors)))
            .init()
            .await
            .unwrap();

        assert_eq!(provider.calls(), 0);
        assert_eq!(service.summary().unwrap().anchor_count, 1);
    }

    #[tokio::test]
    async fn test_anchor_embeddings_from_other_model_recomputed() {
        let anchors = AnchorSet::new(vec![AnchorDefinition::new(
            "anchor:1",
            "schalte alle lichter aus",
            IntentDescriptor::new("light", "HassTurnOff"),
        )
        .with_embedding(vec![0.0, 1.0, 0.0])])
        .with_embedding_model("nomic-embed-text");

        let provider = Arc::new(MockEmbeddingProvider::new("mock", 2));
        let service = CommandCacheService::builder(config())
            .embedding_provider(provider.clone())
            .anchor_source(Arc::new(StaticAnchorSource::new(anchors)))
            .init()
            .await
            .unwrap();

        assert_eq!(provider.calls(), 1);
        assert_eq!(service.summary().unwrap().anchor_count, 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_cache_working() {
        let mut repo = MockCacheSnapshotRepository::new();
        repo.expect_load().returning(|| Ok(None));
        repo.expect_save()
            .returning(|_| Err(DomainError::persistence("disk full")));

        let service = CommandCacheService::builder(config())
            .embedding_provider(Arc::new(office_provider()))
            .snapshot_repository(Arc::new(repo))
            .init()
            .await
            .unwrap();

        assert!(service.store(STORED, &light_on()).await.unwrap());
        assert!(service.lookup(PARAPHRASE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_starts_empty() {
        let mut repo = MockCacheSnapshotRepository::new();
        repo.expect_load()
            .returning(|| Err(DomainError::persistence("corrupt")));

        let service = CommandCacheService::builder(config())
            .embedding_provider(Arc::new(office_provider()))
            .snapshot_repository(Arc::new(repo))
            .init()
            .await
            .unwrap();

        assert_eq!(service.summary().unwrap().learned_count, 0);
    }

    fn snapshot_entry(embedding: Vec<f32>) -> CacheEntry {
        CacheEntry::learned("learned:restored", STORED, embedding, &light_on(), Utc::now())
    }

    #[tokio::test]
    async fn test_snapshot_restored() {
        let repo = Arc::new(InMemorySnapshotRepository::with_snapshot(CacheSnapshot::new(
            "bge-m3",
            vec![snapshot_entry(vec![1.0, 0.0])],
            CacheStats {
                total_lookups: 10,
                hits: 7,
                misses: 3,
                ..CacheStats::default()
            },
        )));

        let service = CommandCacheService::builder(config())
            .embedding_provider(Arc::new(office_provider()))
            .snapshot_repository(repo)
            .init()
            .await
            .unwrap();

        let hit = service.lookup(PARAPHRASE).await.unwrap().unwrap();
        assert_eq!(hit.entry_id, "learned:restored");
        assert_eq!(service.stats().hits, 8);
    }

    #[tokio::test]
    async fn test_snapshot_from_other_model_discarded() {
        let repo = Arc::new(InMemorySnapshotRepository::with_snapshot(CacheSnapshot::new(
            "nomic-embed-text",
            vec![snapshot_entry(vec![1.0, 0.0])],
            CacheStats::default(),
        )));

        let service = CommandCacheService::builder(config())
            .embedding_provider(Arc::new(office_provider()))
            .snapshot_repository(repo)
            .init()
            .await
            .unwrap();

        assert_eq!(service.summary().unwrap().learned_count, 0);
    }

    #[tokio::test]
    async fn test_snapshot_dimension_mismatch_fails_init() {
        let repo = Arc::new(InMemorySnapshotRepository::with_snapshot(CacheSnapshot::new(
            "bge-m3",
            vec![snapshot_entry(vec![1.0, 0.0, 0.0])],
            CacheStats::default(),
        )));

        let result = CommandCacheService::builder(config())
            .embedding_provider(Arc::new(office_provider()))
            .snapshot_repository(repo)
            .init()
            .await;

        assert!(result.unwrap_err().is_dimension_error());
    }

    #[tokio::test]
    async fn test_lookup_dimension_mismatch_is_error() {
        let provider = office_provider().with_vector("ganz andere dimension hier", vec![1.0, 0.0, 0.0]);
        let h = harness(config(), provider, None).await;
        h.service.store(STORED, &light_on()).await.unwrap();

        let result = h.service.lookup("ganz andere dimension hier").await;

        assert!(result.unwrap_err().is_dimension_error());
    }

    #[tokio::test]
    async fn test_missing_embedding_provider() {
        let result = CommandCacheService::builder(config()).init().await;

        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_miss() {
        let h = harness(
            config(),
            MockEmbeddingProvider::new("mock", 2).with_error("connection refused"),
            None,
        )
        .await;

        assert!(h.service.lookup(PARAPHRASE).await.unwrap().is_none());
        assert_eq!(
            h.service.store_with_outcome(STORED, &light_on()).await.unwrap(),
            StoreOutcome::Unavailable
        );
        assert_eq!(h.service.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_embedding_timeout_degrades_to_miss() {
        let provider = office_provider().with_delay(Duration::from_secs(60));
        let h = harness(config(), provider, None).await;

        let started = Instant::now();
        assert!(h.service.lookup(PARAPHRASE).await.unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_bypass_skips_embedding() {
        let h = harness(config(), office_provider(), None).await;

        assert!(h
            .service
            .lookup("Schalte das Licht für 10 Minuten an")
            .await
            .unwrap()
            .is_none());
        assert!(h.service.lookup("Es ist zu dunkel hier").await.unwrap().is_none());

        assert_eq!(h.provider.calls(), 0);
        assert_eq!(h.service.stats().total_lookups, 0);
    }

    #[tokio::test]
    async fn test_disabled_cache_does_nothing() {
        let h = harness(config().with_enabled(false), office_provider(), None).await;

        assert!(!h.service.store(STORED, &light_on()).await.unwrap());
        assert!(h.service.lookup(STORED).await.unwrap().is_none());
        assert_eq!(h.provider.calls(), 0);
        assert!(!h.service.is_enabled());
    }

    #[tokio::test]
    async fn test_numeric_value_injected_on_hit() {
        let h = harness(config(), MockEmbeddingProvider::new("mock", 64), None).await;
        let resolution = Resolution::new(
            IntentDescriptor::new("cover", "HassSetPosition")
                .with_slot("area", "Bad")
                .with_slot("position", 75),
            vec!["cover.bad".to_string()],
        );

        h.service
            .store("Stelle das Rollo im Bad auf 75%", &resolution)
            .await
            .unwrap();

        let hit = h
            .service
            .lookup("Stelle das Rollo im Bad auf 30 Prozent")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(hit.matched_text, "stelle das rollo im bad auf 50 prozent");
        assert_eq!(hit.intent.slot("position"), Some(&json!(30)));
    }

    #[tokio::test]
    async fn test_disambiguation_question_replayed() {
        let h = harness(config(), office_provider(), None).await;
        let resolution = light_on().with_disambiguation_context(DisambiguationContext::new(
            "Welches Licht im Büro meinst du: Decke oder Schreibtisch?",
            vec!["light.buero_decke".to_string(), "light.buero_tisch".to_string()],
        ));

        h.service.store(STORED, &resolution).await.unwrap();
        let hit = h.service.lookup(PARAPHRASE).await.unwrap().unwrap();

        assert_eq!(
            hit.pending_question(),
            Some("Welches Licht im Büro meinst du: Decke oder Schreibtisch?")
        );
    }

    #[tokio::test]
    async fn test_shutdown_persists_recency() {
        let h = harness(config(), office_provider(), None).await;
        h.service.store(STORED, &light_on()).await.unwrap();
        h.service.lookup(PARAPHRASE).await.unwrap();

        h.service.shutdown().await;

        let snapshot = h.repo.current().unwrap().unwrap();
        assert_eq!(snapshot.entries[0].use_count(), 1);
        assert_eq!(snapshot.stats.hits, 1);
        assert_eq!(h.repo.save_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_stores_respect_capacity() {
        let service = Arc::new(
            CommandCacheService::builder(config().with_max_entries(5))
                .embedding_provider(Arc::new(MockEmbeddingProvider::new("mock", 64)))
                .init()
                .await
                .unwrap(),
        );

        let handles: Vec<_> = (0..12)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .store(&format!("schalte gerät nummer {} im keller an", i), &light_on())
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let summary = service.summary().unwrap();
        assert_eq!(summary.learned_count, 5);
        assert_eq!(service.stats().evictions, 7);
    }
}
