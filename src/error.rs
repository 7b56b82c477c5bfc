//! Error types for the retrieval index.
//!
//! Structured error enums using thiserror, one per request family, with
//! stable status codes for programmatic handling. Responses always carry
//! either a success payload or a single error with one of these kinds;
//! nothing beyond the human-readable message is part of the contract.

use thiserror::Error;

use crate::store::StoreError;
use crate::vector::VectorError;

/// Errors produced by save/upsert and aggregation requests.
#[derive(Error, Debug)]
pub enum IndexError {
    /// A required request field was missing or empty. Rejected before any
    /// store or embedding call is made.
    #[error("Missing required field '{field}'")]
    Validation { field: &'static str },

    /// The embedding provider failed to produce a vector. Fatal for the
    /// current request; never retried internally.
    #[error("Embedding failed: {0}")]
    Embedding(#[source] VectorError),

    /// The underlying store was unavailable or rejected the operation.
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),
}

impl IndexError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::Store(_) => "STORE_ERROR",
        }
    }
}

/// Errors produced by similarity search requests.
#[derive(Error, Debug)]
pub enum SearchError {
    /// A required request field was missing or empty.
    #[error("Missing required field '{field}'")]
    Validation { field: &'static str },

    /// No stored unit qualified after filtering. A normal outcome of a
    /// sparse corpus, distinct from a store-access failure.
    #[error("No stored unit matched the query above the similarity threshold")]
    NoMatch,

    /// The embedding provider failed to produce a query vector.
    #[error("Embedding failed: {0}")]
    Embedding(#[source] VectorError),

    /// The underlying store was unavailable or rejected the query.
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),
}

impl SearchError {
    /// Get a stable status code for this error type.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NoMatch => "NO_MATCH",
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::Store(_) => "STORE_ERROR",
        }
    }
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Result type alias for search operations
pub type SearchResult<T> = Result<T, SearchError>;
