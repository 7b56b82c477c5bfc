//! Vector primitives: typed wrappers, similarity math, embedding
//! generation, and the memory-mapped vector file.
//!
//! Everything above this module works with whole indexed units; this module
//! only knows about `f32` vectors and their ids.

pub mod embedding;
pub mod storage;
pub mod types;

pub use embedding::{EmbeddingGenerator, FastEmbedGenerator, HashingEmbeddingGenerator};
pub use storage::{MmapVectorStorage, VectorStorageError};
pub use types::{VECTOR_DIMENSION_384, VectorDimension, VectorError, VectorId};

/// Calculate cosine similarity between two vectors.
///
/// Returns a value in [-1.0, 1.0]. Zero-magnitude inputs yield 0.0 rather
/// than NaN so degenerate vectors never poison a ranking.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Squared Euclidean distance between two vectors.
///
/// This is the store's native candidate-ordering metric. Callers that need
/// cosine similarity recompute it themselves from the stored vectors.
#[must_use]
pub fn squared_euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        // Identical vectors
        let v1 = vec![1.0, 0.0, 0.0];
        let v2 = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&v1, &v2) - 1.0).abs() < 0.001);

        // Orthogonal vectors
        let v3 = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&v1, &v3) - 0.0).abs() < 0.001);

        // Opposite vectors
        let v4 = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&v1, &v4) - (-1.0)).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_zero_magnitude() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
    }

    #[test]
    fn test_squared_euclidean_distance() {
        let v1 = vec![0.0, 0.0];
        let v2 = vec![3.0, 4.0];
        assert!((squared_euclidean_distance(&v1, &v2) - 25.0).abs() < 0.001);

        // Distance to self is zero
        assert_eq!(squared_euclidean_distance(&v2, &v2), 0.0);
    }
}
