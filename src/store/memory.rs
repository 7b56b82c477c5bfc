//! In-memory unit store.
//!
//! Backs the test suite and embedded use where persistence is not needed.
//! The persistent store reuses the same read path by keeping its working
//! set in the same shape.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::store::{MetadataFilter, StoreError, StoreResult, UnitRecord, UnitStore};
use crate::unit::{UnitId, UnitMetadata};
use crate::vector::{VectorDimension, squared_euclidean_distance};

/// Thread-safe in-memory store keyed by unit id.
#[derive(Debug)]
pub struct MemoryUnitStore {
    records: RwLock<HashMap<UnitId, UnitRecord>>,
    dimension: VectorDimension,
}

impl MemoryUnitStore {
    /// Creates an empty store for vectors of the given dimension.
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            dimension,
        }
    }

    /// Returns the vector dimension this store accepts.
    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Ranks records by the store's native metric (squared Euclidean distance)
/// and keeps the nearest `k`.
pub(crate) fn nearest_k(
    mut candidates: Vec<(f32, UnitRecord)>,
    k: usize,
) -> Vec<UnitRecord> {
    candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(k);
    candidates.into_iter().map(|(_, record)| record).collect()
}

impl UnitStore for MemoryUnitStore {
    fn insert(&self, record: UnitRecord) -> StoreResult<()> {
        self.dimension.validate_vector(&record.vector)?;

        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(StoreError::DuplicateId {
                id: record.id.clone(),
            });
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    fn get(&self, id: &UnitId) -> StoreResult<Option<UnitRecord>> {
        Ok(self.records.read().get(id).cloned())
    }

    fn get_where(&self, filter: &MetadataFilter) -> StoreResult<Vec<UnitRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|record| filter.matches(&record.metadata))
            .cloned()
            .collect())
    }

    fn update(&self, id: &UnitId, metadata: UnitMetadata) -> StoreResult<()> {
        let mut records = self.records.write();
        match records.get_mut(id) {
            Some(record) => {
                record.metadata = metadata;
                Ok(())
            }
            None => Err(StoreError::NotFound { id: id.clone() }),
        }
    }

    fn query_nearest(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> StoreResult<Vec<UnitRecord>> {
        self.dimension.validate_vector(query)?;

        let candidates: Vec<(f32, UnitRecord)> = self
            .records
            .read()
            .values()
            .filter(|record| filter.is_none_or(|f| f.matches(&record.metadata)))
            .map(|record| (squared_euclidean_distance(query, &record.vector), record.clone()))
            .collect();

        Ok(nearest_k(candidates, k))
    }

    fn count(&self, filter: Option<&MetadataFilter>) -> StoreResult<usize> {
        let records = self.records.read();
        match filter {
            Some(f) => Ok(records
                .values()
                .filter(|record| f.matches(&record.metadata))
                .count()),
            None => Ok(records.len()),
        }
    }
}
