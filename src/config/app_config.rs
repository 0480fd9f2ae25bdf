use serde::Deserialize;

use crate::domain::CommandCacheConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub cache: CommandCacheConfig,
    pub embedding: EmbeddingSettings,
    pub reranker: RerankerSettings,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Ollama connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: String,
    /// Overrides the dimension table for models it does not know
    pub dimensions: Option<usize>,
}

/// Reranker sidecar connection; used only when `cache.rerank_enabled`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RerankerSettings {
    pub base_url: String,
}

/// Where learned entries and anchors live. Without a cache file learned
/// entries are kept in memory only.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub cache_file: Option<String>,
    pub anchors_file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            dimensions: None,
        }
    }
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8765".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_file: Some("data/command_cache.json".to_string()),
            anchors_file: None,
        }
    }
}

impl AppConfig {
    /// Layer `config/default`, `config/local` and `COMMAND_CACHE__*`
    /// environment variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("COMMAND_CACHE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
