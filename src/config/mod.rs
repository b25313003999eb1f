//! Configuration management
//!
//! Corpus identifiers, intent label sets, thresholds, and index tuning are
//! configuration supplied at construction, never hardcoded in the
//! pipeline. Loaded from TOML with env-var overrides and validated before
//! use.

use crate::error::{QuarryError, Result};
use crate::index::{DistanceMetric, IndexParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub classifier: ClassifierConfig,
    pub retrieval: RetrievalConfig,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub model: String,
    /// Embedding dimension; must match the model and the index
    pub dimension: usize,
    /// Batch size for ingestion
    pub batch_size: usize,
    /// Upper bound on one provider call, in seconds
    pub timeout_secs: u64,
    /// Retries after a provider outage before surfacing the failure
    pub max_retries: u32,
    /// Initial backoff between retries, in milliseconds (doubles each try)
    pub retry_backoff_ms: u64,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Distance metric: "cosine" or "euclidean"
    pub metric: DistanceMetric,
    /// HNSW M parameter (connections per layer)
    pub hnsw_m: usize,
    /// HNSW construction breadth
    pub hnsw_ef_construction: usize,
    /// Default search breadth (recall/latency knob)
    pub ef_search: usize,
    /// Capacity hint for graph sizing
    pub capacity: usize,
    /// Where to persist the index snapshot, if anywhere
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

/// Intent classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Closed set of intent labels
    pub labels: Vec<String>,
    /// JSON weights file; absent means the uniform fallback classifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights_file: Option<PathBuf>,
}

/// Retrieval policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default number of chunks to retrieve when the request has no override
    pub default_k: usize,
    /// Minimum top-intent confidence before the fallback flag is set
    pub intent_threshold: f32,
    /// Minimum top-hit similarity before the fallback flag is set
    pub similarity_threshold: f32,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(QuarryError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| QuarryError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| QuarryError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: QUARRY_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("QUARRY_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        let parse_err = |message: String| QuarryError::InvalidConfigValue {
            path: path.to_string(),
            message,
        };
        match path {
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "EMBEDDING__TIMEOUT_SECS" => {
                self.embedding.timeout_secs = value
                    .parse()
                    .map_err(|_| parse_err(format!("Cannot parse '{}' as seconds", value)))?;
            }
            "RETRIEVAL__DEFAULT_K" => {
                self.retrieval.default_k = value
                    .parse()
                    .map_err(|_| parse_err(format!("Cannot parse '{}' as usize", value)))?;
            }
            "RETRIEVAL__INTENT_THRESHOLD" => {
                self.retrieval.intent_threshold = value
                    .parse()
                    .map_err(|_| parse_err(format!("Cannot parse '{}' as float", value)))?;
            }
            "RETRIEVAL__SIMILARITY_THRESHOLD" => {
                self.retrieval.similarity_threshold = value
                    .parse()
                    .map_err(|_| parse_err(format!("Cannot parse '{}' as float", value)))?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Index tuning parameters derived from the embedding and index sections
    pub fn index_params(&self) -> IndexParams {
        IndexParams {
            dimension: self.embedding.dimension,
            metric: self.index.metric,
            hnsw_m: self.index.hnsw_m,
            hnsw_ef_construction: self.index.hnsw_ef_construction,
            ef_search: self.index.ef_search,
            capacity: self.index.capacity,
        }
    }

    /// Timeout for one embedding provider call
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_secs)
    }

    /// Initial retry backoff
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.embedding.retry_backoff_ms)
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| QuarryError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("quarry").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| QuarryError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".quarry"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                dimension: 384,
                batch_size: 32,
                timeout_secs: 10,
                max_retries: 2,
                retry_backoff_ms: 250,
            },
            index: IndexConfig {
                metric: DistanceMetric::Cosine,
                hnsw_m: 16,
                hnsw_ef_construction: 200,
                ef_search: 64,
                capacity: 16_384,
                snapshot_path: None,
            },
            classifier: ClassifierConfig {
                labels: vec![
                    "leave_request".to_string(),
                    "clock_in".to_string(),
                    "status_inquiry".to_string(),
                    "unknown".to_string(),
                ],
                weights_file: None,
            },
            retrieval: RetrievalConfig {
                default_k: 5,
                intent_threshold: 0.5,
                similarity_threshold: 0.35,
            },
        }
    }
}
