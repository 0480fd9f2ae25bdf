//! JSON file persistence for snapshots and anchor definitions

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::domain::command_cache::{AnchorSet, AnchorSource, CacheSnapshot, CacheSnapshotRepository};
use crate::domain::DomainError;

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, DomainError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "File does not exist yet");
            return Ok(None);
        }
        Err(e) => {
            return Err(DomainError::persistence(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )));
        }
    };

    serde_json::from_slice(&bytes).map(Some).map_err(|e| {
        DomainError::persistence(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// Snapshots stored as a single JSON document, replaced atomically
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotRepository {
    path: PathBuf,
}

impl JsonFileSnapshotRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CacheSnapshotRepository for JsonFileSnapshotRepository {
    async fn load(&self) -> Result<Option<CacheSnapshot>, DomainError> {
        read_json(&self.path).await
    }

    async fn save(&self, snapshot: &CacheSnapshot) -> Result<(), DomainError> {
        let persistence_error = |action: &str, e: std::io::Error| {
            DomainError::persistence(format!("Failed to {} {}: {}", action, self.path.display(), e))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| persistence_error("create directory for", e))?;
        }

        let content = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| DomainError::persistence(format!("Failed to serialize snapshot: {}", e)))?;

        // Write to a temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");

        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(|e| persistence_error("write", e))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| persistence_error("replace", e))?;

        info!(
            path = %self.path.display(),
            entries = snapshot.entries.len(),
            "Cache snapshot saved"
        );

        Ok(())
    }
}

/// Anchor definitions read from a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileAnchorSource {
    path: PathBuf,
}

impl JsonFileAnchorSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AnchorSource for JsonFileAnchorSource {
    async fn load_anchors(&self) -> Result<AnchorSet, DomainError> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }
}
