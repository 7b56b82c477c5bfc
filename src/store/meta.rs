//! Index metadata tracking for the persistent store.
//!
//! Records which embedding model produced the collection, its dimension,
//! and counts/timestamps, so that opening an index can detect model or
//! format drift. Vectors from different models are not comparable, which
//! makes the model name part of the index identity.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::store::{StoreError, StoreResult};

/// File name of the metadata descriptor inside an index directory.
const METADATA_FILE_NAME: &str = "metadata.json";

/// Returns the current UTC timestamp in seconds.
#[must_use]
pub fn utc_timestamp() -> u64 {
    Utc::now().timestamp() as u64
}

/// Descriptor persisted next to the vector file and the unit records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Name of the embedding model used
    pub model_name: String,

    /// Dimension of embeddings
    pub dimension: usize,

    /// Number of units stored
    pub unit_count: usize,

    /// Unix timestamp when created
    pub created_at: u64,

    /// Unix timestamp when last updated
    pub updated_at: u64,

    /// Version of the metadata format
    pub version: u32,
}

impl IndexMetadata {
    /// Current metadata version
    const CURRENT_VERSION: u32 = 1;

    /// Create new metadata with current timestamp
    #[must_use]
    pub fn new(model_name: String, dimension: usize, unit_count: usize) -> Self {
        let now = utc_timestamp();
        Self {
            model_name,
            dimension,
            unit_count,
            created_at: now,
            updated_at: now,
            version: Self::CURRENT_VERSION,
        }
    }

    /// Update the metadata with a new unit count and timestamp
    pub fn update(&mut self, unit_count: usize) {
        self.unit_count = unit_count;
        self.updated_at = utc_timestamp();
    }

    /// Save metadata to a JSON file under `path`
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let metadata_path = path.join(METADATA_FILE_NAME);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&metadata_path, json)?;
        Ok(())
    }

    /// Load metadata from a JSON file under `path`
    pub fn load(path: &Path) -> StoreResult<Self> {
        let metadata_path = path.join(METADATA_FILE_NAME);
        let json = std::fs::read_to_string(&metadata_path)?;
        let metadata: Self = serde_json::from_str(&json)?;

        // Check version compatibility
        if metadata.version > Self::CURRENT_VERSION {
            return Err(StoreError::Corrupted {
                reason: format!(
                    "Metadata version {} is newer than supported version {}",
                    metadata.version,
                    Self::CURRENT_VERSION
                ),
            });
        }

        Ok(metadata)
    }

    /// Check if the metadata file exists under `path`
    #[must_use]
    pub fn exists(path: &Path) -> bool {
        path.join(METADATA_FILE_NAME).exists()
    }
}
