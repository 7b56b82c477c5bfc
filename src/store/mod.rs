//! Vector store adapter: the contract the index and search layers consume.
//!
//! The trait deliberately mirrors what any embedding collection offers
//! (insert, fetch-by-id, filtered get, metadata update, nearest-neighbor
//! query) so the policy layers above never depend on one engine. Candidate
//! order from `query_nearest` follows the store's native distance metric;
//! callers recompute cosine similarity from the returned vectors instead
//! of trusting the store's scores.

pub mod memory;
pub mod meta;
pub mod persistent;

use thiserror::Error;

use crate::unit::{UnitId, UnitMetadata};
use crate::vector::{VectorError, VectorStorageError};

pub use memory::MemoryUnitStore;
pub use meta::IndexMetadata;
pub use persistent::PersistentUnitStore;

/// A stored unit: id, embedding vector, and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitRecord {
    pub id: UnitId,
    pub vector: Vec<f32>,
    pub metadata: UnitMetadata,
}

/// Simple equality/membership predicate evaluated against unit metadata.
///
/// This is the only filtering language the store contract exposes; richer
/// queries belong in the layers above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataFilter {
    /// Units whose dependent-class set contains the given class name.
    DependentClass(String),

    /// The constructor unit(s) of the given class.
    Constructor { class_name: String },
}

impl MetadataFilter {
    /// Evaluates the predicate against a unit's metadata.
    #[must_use]
    pub fn matches(&self, metadata: &UnitMetadata) -> bool {
        match self {
            Self::DependentClass(name) => metadata.dependent_classes.contains(name),
            Self::Constructor { class_name } => {
                metadata.is_constructor && metadata.class_name == *class_name
            }
        }
    }
}

/// Errors surfaced by store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(
        "Unit '{id}' already exists\nSuggestion: Save the unit again through the indexer to merge its dependent classes"
    )]
    DuplicateId { id: UnitId },

    #[error("Unit '{id}' not found")]
    NotFound { id: UnitId },

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    #[error("Vector storage error: {0}")]
    VectorStorage(#[from] VectorStorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store is corrupted: {reason}\nSuggestion: Rebuild the index from the source corpus")]
    Corrupted { reason: String },
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Abstract contract over a persistent embedding collection.
///
/// All operations are single-record atomic; no cross-record transaction is
/// assumed. Implementations must be safe to share across request threads.
pub trait UnitStore: Send + Sync {
    /// Inserts a new record. Fails with [`StoreError::DuplicateId`] if the
    /// id already exists; callers are expected to check first.
    fn insert(&self, record: UnitRecord) -> StoreResult<()>;

    /// Fetches a record by id, or `None` if absent.
    fn get(&self, id: &UnitId) -> StoreResult<Option<UnitRecord>>;

    /// Returns all records whose metadata satisfies the predicate.
    fn get_where(&self, filter: &MetadataFilter) -> StoreResult<Vec<UnitRecord>>;

    /// Replaces a record's metadata in place. The vector is untouched.
    fn update(&self, id: &UnitId, metadata: UnitMetadata) -> StoreResult<()>;

    /// Returns up to `k` candidates nearest to `query` by the store's
    /// native metric, optionally restricted to records matching `filter`.
    /// Each candidate carries its stored vector.
    fn query_nearest(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> StoreResult<Vec<UnitRecord>>;

    /// Number of stored records, optionally restricted by `filter`.
    fn count(&self, filter: Option<&MetadataFilter>) -> StoreResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::DependentClasses;

    fn metadata(class: &str, method: &str, deps: &str) -> UnitMetadata {
        UnitMetadata {
            class_name: class.to_string(),
            method_name: method.to_string(),
            signature: format!("{method}()"),
            code: format!("public void {method}() {{}}"),
            comment: String::new(),
            annotations: String::new(),
            dependent_methods: Vec::new(),
            dependent_classes: DependentClasses::from_joined(deps),
            is_constructor: class == method,
        }
    }

    #[test]
    fn test_dependent_class_filter() {
        let filter = MetadataFilter::DependentClass("A".to_string());

        assert!(filter.matches(&metadata("Foo", "bar", "A,B")));
        assert!(!filter.matches(&metadata("Foo", "bar", "B")));
        // Membership, not substring: "AB" does not contain "A"
        assert!(!filter.matches(&metadata("Foo", "bar", "AB")));
    }

    #[test]
    fn test_duplicate_id_suggestion_targets_the_caller() {
        let err = StoreError::DuplicateId {
            id: UnitId::new("Foo", "bar()"),
        };
        let message = err.to_string();
        assert!(message.contains("Unit 'Foo-bar()' already exists"));
        // The remedy is an end-user action, not a store-internal one
        assert!(message.contains("Suggestion: Save the unit again through the indexer"));
    }

    #[test]
    fn test_constructor_filter() {
        let filter = MetadataFilter::Constructor {
            class_name: "Foo".to_string(),
        };

        assert!(filter.matches(&metadata("Foo", "Foo", "")));
        assert!(!filter.matches(&metadata("Foo", "bar", "")));
        assert!(!filter.matches(&metadata("Baz", "Baz", "")));
    }
}
