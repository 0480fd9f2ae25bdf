//! In-memory persistence implementations
//!
//! Useful for testing and for running without a data directory. Data is lost
//! when the process terminates.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::command_cache::{AnchorSet, AnchorSource, CacheSnapshot, CacheSnapshotRepository};
use crate::domain::DomainError;

/// Keeps the last saved snapshot in memory
#[derive(Debug, Default)]
pub struct InMemorySnapshotRepository {
    snapshot: RwLock<Option<CacheSnapshot>>,
    saves: AtomicUsize,
}

impl InMemorySnapshotRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-populated with a snapshot
    pub fn with_snapshot(snapshot: CacheSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The stored snapshot, if any
    pub fn current(&self) -> Result<Option<CacheSnapshot>, DomainError> {
        let snapshot = self.snapshot.read().map_err(|e| {
            DomainError::persistence(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(snapshot.clone())
    }
}

#[async_trait]
impl CacheSnapshotRepository for InMemorySnapshotRepository {
    async fn load(&self) -> Result<Option<CacheSnapshot>, DomainError> {
        self.current()
    }

    async fn save(&self, snapshot: &CacheSnapshot) -> Result<(), DomainError> {
        let mut stored = self.snapshot.write().map_err(|e| {
            DomainError::persistence(format!("Failed to acquire write lock: {}", e))
        })?;

        *stored = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

/// Fixed set of anchors supplied in code
#[derive(Debug, Clone, Default)]
pub struct StaticAnchorSource {
    anchors: AnchorSet,
}

impl StaticAnchorSource {
    pub fn new(anchors: AnchorSet) -> Self {
        Self { anchors }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnchorSource for StaticAnchorSource {
    async fn load_anchors(&self) -> Result<AnchorSet, DomainError> {
        Ok(self.anchors.clone())
    }
}
