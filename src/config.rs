//! Configuration module for the retrieval index.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`semcode.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SEMCODE_` and use double
//! underscores to separate nested levels:
//! - `SEMCODE_SEARCH__SIMILARITY_THRESHOLD=0.8` sets `search.similarity_threshold`
//! - `SEMCODE_EMBEDDING__MODEL=AllMiniLML6V2Q` sets `embedding.model`
//! - `SEMCODE_INDEX_PATH=/var/lib/semcode` sets `index_path`

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "semcode.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path to the index directory
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Embedding provider settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Similarity search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Upsert/indexing settings
    #[serde(default)]
    pub indexing: IndexingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// Which provider generates embeddings
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Model identifier for the fastembed provider
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding dimension; must match the model's output
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Directory where model files are cached; defaults to the user cache
    /// directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

/// Embedding provider selection.
///
/// `Hashing` is deterministic and offline; useful for smoke runs and CI
/// where downloading a model is not an option. Vectors from different
/// providers are never comparable.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Fastembed,
    Hashing,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Candidates below this cosine similarity are considered unrelated
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Default number of neighbours returned when the caller omits a limit
    #[serde(default = "default_max_neighbours")]
    pub max_neighbours: usize,

    /// Over-fetch multiplier applied to the store query so that
    /// post-filtering can still fill the result set
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Number of mutexes in the per-id upsert lock array
    #[serde(default = "default_lock_shards")]
    pub lock_shards: usize,
}

fn default_version() -> u32 {
    1
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".semcode/index")
}

fn default_model() -> String {
    "AllMiniLML6V2".to_string()
}

fn default_dimension() -> usize {
    crate::vector::VECTOR_DIMENSION_384
}

fn default_similarity_threshold() -> f32 {
    crate::search::DEFAULT_SIMILARITY_THRESHOLD
}

fn default_max_neighbours() -> usize {
    crate::search::DEFAULT_MAX_NEIGHBOURS
}

fn default_overfetch_factor() -> usize {
    crate::search::OVERFETCH_FACTOR
}

fn default_lock_shards() -> usize {
    16
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            indexing: IndexingConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_model(),
            dimension: default_dimension(),
            cache_dir: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_neighbours: default_max_neighbours(),
            overfetch_factor: default_overfetch_factor(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            lock_shards: default_lock_shards(),
        }
    }
}

impl Settings {
    /// Load settings with the default layering: defaults, then
    /// `semcode.toml`, then `SEMCODE_` environment variables.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(Path::new(CONFIG_FILE_NAME))
    }

    /// Load settings from a specific TOML file plus environment overrides.
    pub fn load_from(config_path: &Path) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("SEMCODE_").split("__"))
            .extract()
    }

    /// Write the settings as pretty TOML to `config_path`.
    pub fn save(&self, config_path: &Path) -> std::io::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, toml)
    }

    /// Directory where embedding model files are cached.
    #[must_use]
    pub fn model_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.embedding.cache_dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .map(|dir| dir.join("semcode").join("models"))
            .unwrap_or_else(|| PathBuf::from(".semcode/models"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert_eq!(settings.version, 1);
        assert_eq!(settings.index_path, PathBuf::from(".semcode/index"));
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Fastembed);
        assert_eq!(settings.embedding.model, "AllMiniLML6V2");
        assert_eq!(settings.embedding.dimension, 384);
        assert_eq!(settings.search.similarity_threshold, 0.75);
        assert_eq!(settings.search.max_neighbours, 8);
        assert_eq!(settings.search.overfetch_factor, 4);
        assert_eq!(settings.indexing.lock_shards, 16);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(
            &config_path,
            r#"
index_path = "custom/index"

[search]
max_neighbours = 12
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&config_path).expect("settings should load");

        assert_eq!(settings.index_path, PathBuf::from("custom/index"));
        assert_eq!(settings.search.max_neighbours, 12);
        // Untouched sections keep their defaults
        assert_eq!(settings.search.similarity_threshold, 0.75);
        assert_eq!(settings.embedding.model, "AllMiniLML6V2");
    }

    #[test]
    fn test_provider_parsing() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(
            &config_path,
            r#"
[embedding]
provider = "hashing"
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&config_path).expect("settings should load");
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Hashing);
    }

    #[test]
    fn test_save_round_trip() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        let mut settings = Settings::default();
        settings.search.similarity_threshold = 0.6;
        settings.embedding.provider = EmbeddingProvider::Hashing;
        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).expect("settings should load");
        assert_eq!(loaded.search.similarity_threshold, 0.6);
        assert_eq!(loaded.embedding.provider, EmbeddingProvider::Hashing);
    }
}
