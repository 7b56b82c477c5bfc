/// The main library module for semcode
pub mod config;
pub mod error;
pub mod indexing;
pub mod search;
pub mod store;
pub mod unit;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use error::{IndexError, IndexResult, SearchError, SearchResult};
pub use indexing::{
    BulkSaveReport, BulkSaveRequest, MethodPayload, SaveOutcome, SaveRequest, UnitIndexer,
};
pub use search::{ClassGroup, SearchQuery, SimilarUnit, SimilaritySearcher};
pub use store::{
    MemoryUnitStore, MetadataFilter, PersistentUnitStore, StoreError, StoreResult, UnitRecord,
    UnitStore,
};
pub use unit::{DependentClasses, UnitId, UnitMetadata};
pub use vector::{
    EmbeddingGenerator, FastEmbedGenerator, HashingEmbeddingGenerator, VectorDimension, VectorId,
};
