//! Persistent unit store backed by an index directory.
//!
//! Layout of an index directory:
//! - `vectors.vec` — append-only memory-mapped vector file
//! - `units.json`  — unit records (id, vector id, metadata)
//! - `metadata.json` — [`IndexMetadata`] descriptor
//!
//! Every mutation is written through to disk before it returns: vectors
//! are appended to the vector file and the unit records rewritten. Each
//! operation is single-record atomic; there is no cross-record transaction,
//! matching the store contract.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::memory::nearest_k;
use crate::store::{
    IndexMetadata, MetadataFilter, StoreError, StoreResult, UnitRecord, UnitStore,
};
use crate::unit::{UnitId, UnitMetadata};
use crate::vector::{MmapVectorStorage, VectorDimension, VectorId, squared_euclidean_distance};

/// File name of the unit records inside an index directory.
const UNITS_FILE_NAME: &str = "units.json";

/// On-disk form of one unit record. The vector itself lives in the vector
/// file, referenced by `vector_id`.
#[derive(Debug, Serialize, Deserialize)]
struct DiskUnit {
    id: UnitId,
    vector_id: u32,
    metadata: UnitMetadata,
}

struct Inner {
    records: HashMap<UnitId, UnitRecord>,
    vector_ids: HashMap<UnitId, VectorId>,
    next_vector_id: u32,
    vectors: MmapVectorStorage,
    metadata: IndexMetadata,
}

/// Disk-backed unit store with an in-memory working set.
pub struct PersistentUnitStore {
    path: PathBuf,
    dimension: VectorDimension,
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for PersistentUnitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("PersistentUnitStore")
            .field("path", &self.path)
            .field("dimension", &self.dimension)
            .field("unit_count", &inner.records.len())
            .field("model_name", &inner.metadata.model_name)
            .finish()
    }
}

impl PersistentUnitStore {
    /// Opens an index directory, creating and initializing it when absent.
    pub fn open_or_create(
        path: impl AsRef<Path>,
        dimension: VectorDimension,
        model_name: &str,
    ) -> StoreResult<Self> {
        let path = path.as_ref();
        if IndexMetadata::exists(path) {
            Self::open(path)
        } else {
            std::fs::create_dir_all(path)?;

            let vectors = MmapVectorStorage::open_or_create(path, dimension)?;
            let metadata = IndexMetadata::new(model_name.to_string(), dimension.get(), 0);
            metadata.save(path)?;

            let store = Self {
                path: path.to_path_buf(),
                dimension,
                inner: RwLock::new(Inner {
                    records: HashMap::new(),
                    vector_ids: HashMap::new(),
                    next_vector_id: 1,
                    vectors,
                    metadata,
                }),
            };
            store.persist_units(&store.inner.read())?;
            Ok(store)
        }
    }

    /// Opens an existing index directory.
    ///
    /// Fails if the directory was never initialized or its files disagree
    /// with each other.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        let metadata = IndexMetadata::load(path)?;
        let dimension = VectorDimension::new(metadata.dimension)?;

        let mut vectors = MmapVectorStorage::open(path)?;
        if vectors.dimension() != dimension {
            return Err(StoreError::Corrupted {
                reason: format!(
                    "Vector file dimension {} disagrees with metadata dimension {}",
                    vectors.dimension().get(),
                    metadata.dimension
                ),
            });
        }

        let mut by_vector_id: HashMap<u32, Vec<f32>> = vectors
            .read_all_vectors()?
            .into_iter()
            .map(|(id, vec)| (id.get(), vec))
            .collect();

        let disk_units: Vec<DiskUnit> = {
            let json = std::fs::read_to_string(path.join(UNITS_FILE_NAME))?;
            serde_json::from_str(&json)?
        };

        let mut records = HashMap::with_capacity(disk_units.len());
        let mut vector_ids = HashMap::with_capacity(disk_units.len());
        let mut next_vector_id = 1u32;

        for disk_unit in disk_units {
            let vector = by_vector_id.remove(&disk_unit.vector_id).ok_or_else(|| {
                StoreError::Corrupted {
                    reason: format!(
                        "Unit '{}' references missing vector id {}",
                        disk_unit.id, disk_unit.vector_id
                    ),
                }
            })?;

            let vector_id = VectorId::new(disk_unit.vector_id).ok_or_else(|| {
                StoreError::Corrupted {
                    reason: format!("Unit '{}' has a zero vector id", disk_unit.id),
                }
            })?;

            next_vector_id = next_vector_id.max(disk_unit.vector_id + 1);
            vector_ids.insert(disk_unit.id.clone(), vector_id);
            records.insert(
                disk_unit.id.clone(),
                UnitRecord {
                    id: disk_unit.id,
                    vector,
                    metadata: disk_unit.metadata,
                },
            );
        }

        info!(
            "Opened index at {} with {} units (model '{}')",
            path.display(),
            records.len(),
            metadata.model_name
        );

        Ok(Self {
            path: path.to_path_buf(),
            dimension,
            inner: RwLock::new(Inner {
                records,
                vector_ids,
                next_vector_id,
                vectors,
                metadata,
            }),
        })
    }

    /// Returns the embedding model name recorded in the index metadata.
    #[must_use]
    pub fn model_name(&self) -> String {
        self.inner.read().metadata.model_name.clone()
    }

    /// Returns the vector dimension this store accepts.
    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn persist_units(&self, inner: &Inner) -> StoreResult<()> {
        let mut disk_units: Vec<DiskUnit> = inner
            .records
            .values()
            .map(|record| DiskUnit {
                id: record.id.clone(),
                vector_id: inner.vector_ids[&record.id].get(),
                metadata: record.metadata.clone(),
            })
            .collect();
        // Stable file content across rewrites
        disk_units.sort_by_key(|unit| unit.vector_id);

        let json = serde_json::to_string_pretty(&disk_units)?;
        std::fs::write(self.path.join(UNITS_FILE_NAME), json)?;
        Ok(())
    }

    fn persist_metadata(&self, inner: &mut Inner) -> StoreResult<()> {
        let count = inner.records.len();
        inner.metadata.update(count);
        inner.metadata.save(&self.path)?;
        Ok(())
    }
}

impl UnitStore for PersistentUnitStore {
    fn insert(&self, record: UnitRecord) -> StoreResult<()> {
        self.dimension.validate_vector(&record.vector)?;

        let mut inner = self.inner.write();
        if inner.records.contains_key(&record.id) {
            return Err(StoreError::DuplicateId {
                id: record.id.clone(),
            });
        }

        let vector_id = VectorId::new(inner.next_vector_id).ok_or_else(|| {
            StoreError::Corrupted {
                reason: "Vector id counter overflowed".to_string(),
            }
        })?;
        inner.vectors.append(vector_id, &record.vector)?;
        inner.next_vector_id += 1;

        inner.vector_ids.insert(record.id.clone(), vector_id);
        inner.records.insert(record.id.clone(), record);

        self.persist_units(&inner)?;
        self.persist_metadata(&mut inner)?;
        Ok(())
    }

    fn get(&self, id: &UnitId) -> StoreResult<Option<UnitRecord>> {
        Ok(self.inner.read().records.get(id).cloned())
    }

    fn get_where(&self, filter: &MetadataFilter) -> StoreResult<Vec<UnitRecord>> {
        Ok(self
            .inner
            .read()
            .records
            .values()
            .filter(|record| filter.matches(&record.metadata))
            .cloned()
            .collect())
    }

    fn update(&self, id: &UnitId, metadata: UnitMetadata) -> StoreResult<()> {
        let mut inner = self.inner.write();
        match inner.records.get_mut(id) {
            Some(record) => {
                record.metadata = metadata;
            }
            None => return Err(StoreError::NotFound { id: id.clone() }),
        }

        self.persist_units(&inner)?;
        self.persist_metadata(&mut inner)?;
        Ok(())
    }

    fn query_nearest(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> StoreResult<Vec<UnitRecord>> {
        self.dimension.validate_vector(query)?;

        let candidates: Vec<(f32, UnitRecord)> = self
            .inner
            .read()
            .records
            .values()
            .filter(|record| filter.is_none_or(|f| f.matches(&record.metadata)))
            .map(|record| (squared_euclidean_distance(query, &record.vector), record.clone()))
            .collect();

        Ok(nearest_k(candidates, k))
    }

    fn count(&self, filter: Option<&MetadataFilter>) -> StoreResult<usize> {
        let inner = self.inner.read();
        match filter {
            Some(f) => Ok(inner
                .records
                .values()
                .filter(|record| f.matches(&record.metadata))
                .count()),
            None => Ok(inner.records.len()),
        }
    }
}
