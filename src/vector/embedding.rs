//! Embedding generation for code units.
//!
//! Provides the trait and implementations for turning source text into
//! fixed-length vectors. The production implementation uses fastembed with
//! the AllMiniLML6V2 model; a deterministic hashing implementation exists
//! for tests and offline runs where downloading a model is not an option.
//!
//! Generators are injected by reference into the indexer and searcher at
//! construction. There is no process-wide model singleton: callers build
//! one generator and share it behind an `Arc`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::vector::{VectorDimension, VectorError};

/// Trait for generating embeddings from text.
///
/// Implementations must be thread-safe and should handle batch input
/// efficiently. Identical input text must produce identical vectors; no
/// comparability is guaranteed across different models, so changing the
/// model invalidates an existing collection.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts.
    ///
    /// # Arguments
    /// * `texts` - Slice of text strings to generate embeddings for
    ///
    /// # Returns
    /// A vector of embeddings, one for each input text, or an error
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;

    /// Generate an embedding for a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        let mut embeddings = self.generate_embeddings(&[text])?;
        embeddings.pop().ok_or_else(|| {
            VectorError::EmbeddingFailed("Generator returned no embedding for input".to_string())
        })
    }
}

/// FastEmbed implementation using the AllMiniLML6V2 model.
///
/// Produces 384-dimensional embeddings optimized for semantic similarity
/// of code snippets.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
}

impl FastEmbedGenerator {
    /// Create a new FastEmbed generator.
    ///
    /// # Arguments
    /// * `model_name` - Model identifier as stored in the index metadata
    /// * `cache_dir` - Directory where model files are cached
    ///
    /// # Errors
    /// Returns an error if the model name is unknown or the model fails to
    /// initialize or download.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, VectorError> {
        Self::with_progress(model_name, cache_dir, false)
    }

    /// Create a new generator, optionally showing download progress.
    ///
    /// # Errors
    /// Returns an error if the model fails to initialize or download.
    pub fn with_progress(
        model_name: &str,
        cache_dir: PathBuf,
        show_progress: bool,
    ) -> Result<Self, VectorError> {
        let model_kind = Self::resolve_model(model_name)?;

        let model = TextEmbedding::try_new(
            InitOptions::new(model_kind)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(show_progress),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        Ok(Self {
            model: Mutex::new(model),
            dimension: VectorDimension::dimension_384(),
        })
    }

    fn resolve_model(model_name: &str) -> Result<EmbeddingModel, VectorError> {
        match model_name {
            "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "AllMiniLML6V2Q" => Ok(EmbeddingModel::AllMiniLML6V2Q),
            other => Err(VectorError::EmbeddingFailed(format!(
                "Unknown embedding model '{other}'. Supported models: AllMiniLML6V2, AllMiniLML6V2Q"
            ))),
        }
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // fastembed expects Vec<String> for the embed method
        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                VectorError::EmbeddingFailed(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(text_strings, None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        // Validate dimensions
        for embedding in embeddings.iter() {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Deterministic hashing-based generator.
///
/// Builds a normalized bag-of-words vector: each whitespace token is hashed
/// into a bucket and the result normalized to unit length. Identical texts
/// map to identical vectors and token overlap translates directly into
/// cosine similarity, which makes retrieval behavior predictable without a
/// model download. Used by the test suite and available as the `hashing`
/// provider for offline smoke runs.
pub struct HashingEmbeddingGenerator {
    dimension: VectorDimension,
}

impl HashingEmbeddingGenerator {
    /// Create a generator with the standard 384-bucket dimension.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dimension: VectorDimension::dimension_384(),
        }
    }

    /// Create a generator with a custom bucket count.
    #[must_use]
    pub fn with_dimension(dimension: VectorDimension) -> Self {
        Self { dimension }
    }

    fn bucket(token: &str, dim: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() % dim as u64) as usize
    }
}

impl Default for HashingEmbeddingGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingGenerator for HashingEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        let dim = self.dimension.get();
        let mut embeddings = Vec::with_capacity(texts.len());

        for text in texts {
            let mut embedding = vec![0.0f32; dim];
            for token in text.split_whitespace() {
                embedding[Self::bucket(token, dim)] += 1.0;
            }

            // Normalize to unit length (like real embeddings)
            let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            if magnitude > 0.0 {
                for val in &mut embedding {
                    *val /= magnitude;
                }
            }

            embeddings.push(embedding);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}
