//! Identity and upsert management for indexed units.
//!
//! The indexer owns the write path: it derives the deterministic unit id,
//! decides between insert and merge, and keeps re-indexing idempotent.
//! Embeddings are generated exactly once per unit; a later save of the
//! same unit only ever grows its dependent-class set.
//!
//! Check-then-act on the store is raced by concurrent saves of the same
//! unit, so each save takes a shard lock keyed by the id hash before the
//! existence check.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::IndexingConfig;
use crate::error::{IndexError, IndexResult};
use crate::store::{MetadataFilter, StoreError, UnitRecord, UnitStore};
use crate::unit::{
    DependentClasses, JavaMethodExtractor, UNKNOWN_METHOD_NAME, UnitId, UnitMetadata,
    UnitNameExtractor, normalize_method_name,
};
use crate::vector::EmbeddingGenerator;

/// Request to save one code unit.
///
/// `dependent_class` names the single class on whose behalf this save is
/// made; it seeds or extends the unit's accumulated dependent set.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveRequest {
    pub class_name: String,
    #[serde(default)]
    pub method_name: String,
    #[serde(default)]
    pub signature: String,
    pub code: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub annotations: String,
    #[serde(default)]
    pub dependent_methods: Vec<String>,
    /// Accepted as `dependent_classes` on the wire as well; either way it
    /// carries a single class name per save.
    #[serde(default, alias = "dependent_classes")]
    pub dependent_class: String,
}

/// Request to save every method of one class in a single batch.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkSaveRequest {
    pub class_name: String,
    #[serde(default)]
    pub methods: Vec<MethodPayload>,
}

/// One method inside a [`BulkSaveRequest`]; the class name comes from the
/// enclosing request.
#[derive(Debug, Clone, Deserialize)]
pub struct MethodPayload {
    #[serde(default)]
    pub method_name: String,
    #[serde(default)]
    pub signature: String,
    pub code: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub annotations: String,
    #[serde(default)]
    pub dependent_methods: Vec<String>,
}

impl MethodPayload {
    fn into_request(self, class_name: &str) -> SaveRequest {
        SaveRequest {
            class_name: class_name.to_string(),
            method_name: self.method_name,
            signature: self.signature,
            code: self.code,
            comment: self.comment,
            annotations: self.annotations,
            dependent_methods: self.dependent_methods,
            dependent_class: String::new(),
        }
    }
}

/// What a save did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    /// The unit was new; a record with a fresh embedding was inserted.
    Created,
    /// The unit existed and its dependent-class set grew.
    Merged,
    /// The unit existed and nothing changed.
    AlreadyPresent,
}

/// Summary of a bulk save: how many units were inserted and which ids
/// were skipped because they already existed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkSaveReport {
    pub saved: usize,
    pub skipped_existing: Vec<UnitId>,
}

/// Write-path coordinator: derives unit identity and applies the
/// insert-or-merge policy against the store.
pub struct UnitIndexer<S: UnitStore> {
    store: Arc<S>,
    embeddings: Arc<dyn EmbeddingGenerator>,
    extractor: Box<dyn UnitNameExtractor>,
    upsert_locks: Vec<Mutex<()>>,
}

impl<S: UnitStore> UnitIndexer<S> {
    /// Creates an indexer with the Java method-name extractor and the
    /// default lock shard count.
    pub fn new(store: Arc<S>, embeddings: Arc<dyn EmbeddingGenerator>) -> Self {
        Self::with_config(
            store,
            embeddings,
            Box::new(JavaMethodExtractor::new()),
            &IndexingConfig::default(),
        )
    }

    /// Creates an indexer with an explicit extractor and configuration.
    pub fn with_config(
        store: Arc<S>,
        embeddings: Arc<dyn EmbeddingGenerator>,
        extractor: Box<dyn UnitNameExtractor>,
        config: &IndexingConfig,
    ) -> Self {
        let shards = config.lock_shards.max(1);
        Self {
            store,
            embeddings,
            extractor,
            upsert_locks: (0..shards).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Saves one unit: inserts it with a fresh embedding when new, merges
    /// the dependent class into the existing record otherwise.
    pub fn save_unit(&self, request: SaveRequest) -> IndexResult<SaveOutcome> {
        if request.class_name.trim().is_empty() {
            return Err(IndexError::Validation {
                field: "class_name",
            });
        }
        if request.code.trim().is_empty() {
            return Err(IndexError::Validation { field: "code" });
        }

        let method_name = self.resolve_method_name(&request);
        let id = UnitId::for_unit(&request.class_name, &request.signature, &method_name);

        // Serialize concurrent saves of the same id; different ids mostly
        // land on different shards and proceed in parallel.
        let _guard = self.lock_for(&id).lock();

        let existing = match self.store.get(&id) {
            Ok(existing) => existing,
            Err(e) => {
                // Fall back to an optimistic insert; the store's duplicate
                // rejection is authoritative if the unit does exist.
                warn!("Existence check for '{id}' failed: {e}; attempting insert");
                None
            }
        };

        match existing {
            Some(record) => self.merge_dependent_class(record, &request.dependent_class),
            None => {
                let vector = self
                    .embeddings
                    .embed_one(&request.code)
                    .map_err(IndexError::Embedding)?;
                let metadata = build_metadata(request, method_name);
                self.store.insert(UnitRecord {
                    id: id.clone(),
                    vector,
                    metadata,
                })?;
                debug!("Indexed new unit '{id}'");
                Ok(SaveOutcome::Created)
            }
        }
    }

    /// Saves every method of one class, skipping units that already exist.
    ///
    /// The bulk path never merges dependent classes into existing records;
    /// callers that need the merge use [`Self::save_unit`] per method.
    pub fn save_units(&self, request: BulkSaveRequest) -> IndexResult<BulkSaveReport> {
        if request.class_name.trim().is_empty() {
            return Err(IndexError::Validation {
                field: "class_name",
            });
        }

        let mut pending: Vec<(UnitId, UnitMetadata)> = Vec::new();
        let mut skipped_existing: Vec<UnitId> = Vec::new();

        for method in request.methods {
            if method.code.trim().is_empty() {
                return Err(IndexError::Validation { field: "code" });
            }
            let unit = method.into_request(&request.class_name);
            let method_name = self.resolve_method_name(&unit);
            let id = UnitId::for_unit(&unit.class_name, &unit.signature, &method_name);

            let duplicate_in_batch = pending.iter().any(|(pending_id, _)| *pending_id == id);
            if duplicate_in_batch || self.store.get(&id)?.is_some() {
                skipped_existing.push(id);
                continue;
            }
            pending.push((id, build_metadata(unit, method_name)));
        }

        if pending.is_empty() {
            return Ok(BulkSaveReport {
                saved: 0,
                skipped_existing,
            });
        }

        let codes: Vec<&str> = pending
            .iter()
            .map(|(_, metadata)| metadata.code.as_str())
            .collect();
        let vectors = self
            .embeddings
            .generate_embeddings(&codes)
            .map_err(IndexError::Embedding)?;

        let mut saved = 0usize;
        for ((id, metadata), vector) in pending.into_iter().zip(vectors) {
            match self.store.insert(UnitRecord {
                id,
                vector,
                metadata,
            }) {
                Ok(()) => saved += 1,
                // A concurrent save won the race; treat it like any other
                // already-present unit.
                Err(StoreError::DuplicateId { id }) => {
                    debug!("Unit '{id}' was inserted concurrently, skipping");
                    skipped_existing.push(id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(BulkSaveReport {
            saved,
            skipped_existing,
        })
    }

    /// Number of indexed units, optionally restricted to those depending
    /// on a given class.
    pub fn count_units(&self, dependent_class: Option<&str>) -> IndexResult<usize> {
        let filter = dependent_class
            .map(|name| MetadataFilter::DependentClass(name.trim().to_string()));
        Ok(self.store.count(filter.as_ref())?)
    }

    fn merge_dependent_class(
        &self,
        mut record: UnitRecord,
        dependent_class: &str,
    ) -> IndexResult<SaveOutcome> {
        if record.metadata.dependent_classes.insert(dependent_class) {
            let id = record.id.clone();
            self.store.update(&id, record.metadata)?;
            debug!("Merged dependent class '{dependent_class}' into '{id}'");
            Ok(SaveOutcome::Merged)
        } else {
            Ok(SaveOutcome::AlreadyPresent)
        }
    }

    fn resolve_method_name(&self, request: &SaveRequest) -> String {
        let name = normalize_method_name(&request.method_name);
        if !name.is_empty() {
            return name;
        }
        self.extractor
            .extract(&request.code)
            .map(|extracted| normalize_method_name(&extracted))
            .filter(|extracted| !extracted.is_empty())
            .unwrap_or_else(|| UNKNOWN_METHOD_NAME.to_string())
    }

    fn lock_for(&self, id: &UnitId) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        id.as_str().hash(&mut hasher);
        let shard = (hasher.finish() as usize) % self.upsert_locks.len();
        &self.upsert_locks[shard]
    }
}

fn build_metadata(request: SaveRequest, method_name: String) -> UnitMetadata {
    let is_constructor = method_name == request.class_name;
    let dependent_classes = if request.dependent_class.trim().is_empty() {
        DependentClasses::new()
    } else {
        DependentClasses::single(&request.dependent_class)
    };
    UnitMetadata {
        class_name: request.class_name,
        method_name,
        signature: request.signature.trim().to_string(),
        code: request.code,
        comment: request.comment,
        annotations: request.annotations,
        dependent_methods: request.dependent_methods,
        dependent_classes,
        is_constructor,
    }
}
