//! Memory-mapped vector file for the persistent store.
//!
//! Embedding vectors are kept in a single append-only binary file, memory
//! mapped for reads. Unit metadata lives elsewhere; this file only pairs a
//! numeric vector id with its f32 payload.
//!
//! # Storage Format
//!
//! - Header (16 bytes): magic, version, dimension, vector count
//! - Records: vector id (u32) followed by the f32 values, little-endian

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use thiserror::Error;

use crate::vector::types::{VectorDimension, VectorError, VectorId};

/// Current storage format version.
const STORAGE_VERSION: u32 = 1;

/// Size of the storage header in bytes.
const HEADER_SIZE: usize = 16;

/// Magic bytes to identify vector storage files.
const MAGIC_BYTES: &[u8; 4] = b"SVEC";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Number of bytes per vector id (u32).
const BYTES_PER_ID: usize = 4;

/// File name of the vector file inside an index directory.
const VECTOR_FILE_NAME: &str = "vectors.vec";

/// Errors specific to vector storage operations.
#[derive(Error, Debug)]
pub enum VectorStorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid storage format: {0}")]
    InvalidFormat(String),

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),
}

/// Memory-mapped vector file.
///
/// Writes append to the file and take effect immediately; the mmap is
/// invalidated after each write and lazily re-established on the next read.
#[derive(Debug)]
pub struct MmapVectorStorage {
    /// Path to the storage file.
    path: PathBuf,

    /// Memory-mapped file for reading.
    mmap: Option<Mmap>,

    /// Vector dimension (all vectors must have same dimension).
    dimension: VectorDimension,

    /// Number of vectors currently stored.
    vector_count: usize,
}

impl MmapVectorStorage {
    /// Creates a new, uninitialized vector file under `base_path`.
    pub fn new(
        base_path: impl AsRef<Path>,
        dimension: VectorDimension,
    ) -> Result<Self, VectorStorageError> {
        let path = base_path.as_ref().join(VECTOR_FILE_NAME);

        Ok(Self {
            path,
            mmap: None,
            dimension,
            vector_count: 0,
        })
    }

    /// Opens an existing vector file from disk.
    ///
    /// Returns an error if the file doesn't exist or has invalid format.
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self, VectorStorageError> {
        let path = base_path.as_ref().join(VECTOR_FILE_NAME);

        if !path.exists() {
            return Err(VectorStorageError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Vector storage file not found: {path:?}"),
            )));
        }

        let file = File::open(&path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        // Read and validate header
        let (version, dimension, vector_count) = Self::read_header(&mmap)?;

        if version != STORAGE_VERSION {
            return Err(VectorError::VersionMismatch {
                expected: STORAGE_VERSION,
                actual: version,
            }
            .into());
        }

        Ok(Self {
            path,
            mmap: Some(mmap),
            dimension,
            vector_count,
        })
    }

    /// Creates or opens the vector file, initializing if necessary.
    pub fn open_or_create(
        base_path: impl AsRef<Path>,
        dimension: VectorDimension,
    ) -> Result<Self, VectorStorageError> {
        let path = base_path.as_ref().join(VECTOR_FILE_NAME);

        if path.exists() {
            Self::open(base_path)
        } else {
            let mut storage = Self::new(base_path, dimension)?;
            storage.initialize()?;
            Ok(storage)
        }
    }

    /// Appends a single vector to the file.
    ///
    /// Upserts persist one record per call, so the single-record append is
    /// the hot path here rather than the batch.
    pub fn append(&mut self, id: VectorId, vector: &[f32]) -> Result<(), VectorStorageError> {
        self.append_batch(&[(id, vector)])
    }

    /// Appends a batch of vectors to the file.
    pub fn append_batch(
        &mut self,
        vectors: &[(VectorId, &[f32])],
    ) -> Result<(), VectorStorageError> {
        for (_, vec) in vectors {
            self.dimension.validate_vector(vec)?;
        }
        self.ensure_storage_ready()?;
        self.append_records(vectors)?;
        self.vector_count += vectors.len();
        self.update_header_count()?;
        // Force re-mapping on next read
        self.mmap = None;
        Ok(())
    }

    /// Ensures the storage directory exists and is ready for writing.
    fn ensure_storage_ready(&self) -> Result<(), VectorStorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn append_records(&self, vectors: &[(VectorId, &[f32])]) -> Result<(), VectorStorageError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        // Write header if this is a new file
        if file.metadata()?.len() == 0 {
            self.write_header(&mut file)?;
        }

        for (id, vector) in vectors {
            file.write_all(&id.to_bytes())?;
            for &value in *vector {
                file.write_all(&value.to_le_bytes())?;
            }
        }

        file.flush()?;
        Ok(())
    }

    /// Reads all vectors from storage.
    ///
    /// Used to rebuild the in-memory working set when an index is opened.
    pub fn read_all_vectors(&mut self) -> Result<Vec<(VectorId, Vec<f32>)>, VectorStorageError> {
        self.ensure_mapped()?;
        let mmap = self
            .mmap
            .as_ref()
            .expect("mmap is established by ensure_mapped");

        let dimension = self.dimension.get();
        let record_size = BYTES_PER_ID + dimension * BYTES_PER_F32;
        let mut vectors = Vec::with_capacity(self.vector_count);

        let mut offset = HEADER_SIZE;
        while offset + record_size <= mmap.len() {
            let id_bytes = [
                mmap[offset],
                mmap[offset + 1],
                mmap[offset + 2],
                mmap[offset + 3],
            ];
            let id = VectorId::from_bytes(id_bytes).ok_or_else(|| {
                VectorStorageError::InvalidFormat("Invalid vector id".to_string())
            })?;

            vectors.push((id, Self::read_values(mmap, offset + BYTES_PER_ID, dimension)));
            offset += record_size;
        }

        Ok(vectors)
    }

    fn read_values(mmap: &Mmap, data_offset: usize, dimension: usize) -> Vec<f32> {
        let mut vector = Vec::with_capacity(dimension);
        for i in 0..dimension {
            let bytes_offset = data_offset + i * BYTES_PER_F32;
            let value = f32::from_le_bytes([
                mmap[bytes_offset],
                mmap[bytes_offset + 1],
                mmap[bytes_offset + 2],
                mmap[bytes_offset + 3],
            ]);
            vector.push(value);
        }
        vector
    }

    /// Returns the vector dimension.
    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    // Private helper methods

    fn initialize(&mut self) -> Result<(), VectorStorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = File::create(&self.path)?;
        self.write_header(&mut file)?;
        file.flush()?;

        Ok(())
    }

    fn write_header(&self, file: &mut File) -> Result<(), io::Error> {
        file.write_all(MAGIC_BYTES)?;
        file.write_all(&STORAGE_VERSION.to_le_bytes())?;
        file.write_all(&(self.dimension.get() as u32).to_le_bytes())?;
        // Vector count (initially 0)
        file.write_all(&0u32.to_le_bytes())?;
        Ok(())
    }

    fn read_header(mmap: &Mmap) -> Result<(u32, VectorDimension, usize), VectorStorageError> {
        if mmap.len() < HEADER_SIZE {
            return Err(VectorStorageError::InvalidFormat(
                "File too small to contain header".to_string(),
            ));
        }

        if &mmap[0..4] != MAGIC_BYTES {
            return Err(VectorStorageError::InvalidFormat(
                "Invalid magic bytes".to_string(),
            ));
        }

        let version = u32::from_le_bytes([mmap[4], mmap[5], mmap[6], mmap[7]]);

        let dim_value = u32::from_le_bytes([mmap[8], mmap[9], mmap[10], mmap[11]]);
        let dimension = VectorDimension::new(dim_value as usize)?;

        let vector_count = u32::from_le_bytes([mmap[12], mmap[13], mmap[14], mmap[15]]) as usize;

        Ok((version, dimension, vector_count))
    }

    fn ensure_mapped(&mut self) -> Result<(), VectorStorageError> {
        if self.mmap.is_none() {
            let file = File::open(&self.path)?;
            let mmap = unsafe { MmapOptions::new().map(&file)? };

            // Update vector count from file
            let (_, _, count) = Self::read_header(&mmap)?;
            self.vector_count = count;
            self.mmap = Some(mmap);
        }
        Ok(())
    }

    fn update_header_count(&self) -> Result<(), VectorStorageError> {
        use std::io::{Seek, SeekFrom};

        let mut file = OpenOptions::new().write(true).open(&self.path)?;

        // Vector count lives at byte 12 of the header
        file.seek(SeekFrom::Start(12))?;
        file.write_all(&(self.vector_count as u32).to_le_bytes())?;
        file.flush()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_storage_create_and_open() {
        let temp_dir = TempDir::new().unwrap();
        let dimension = VectorDimension::dimension_384();

        // Create new storage
        let storage = MmapVectorStorage::new(&temp_dir, dimension).unwrap();
        assert_eq!(storage.dimension(), dimension);

        // Open existing storage should fail (not initialized)
        assert!(MmapVectorStorage::open(&temp_dir).is_err());
    }

    #[test]
    fn test_append_and_read_vectors() {
        let temp_dir = TempDir::new().unwrap();
        let dimension = VectorDimension::new(4).unwrap(); // Small dimension for testing

        let mut storage = MmapVectorStorage::open_or_create(&temp_dir, dimension).unwrap();

        let test_data = vec![
            (VectorId::new(1).unwrap(), vec![1.0, 2.0, 3.0, 4.0]),
            (VectorId::new(2).unwrap(), vec![5.0, 6.0, 7.0, 8.0]),
            (VectorId::new(3).unwrap(), vec![9.0, 10.0, 11.0, 12.0]),
        ];

        // Append one by one, the upsert path's access pattern
        for (id, vec) in &test_data {
            storage.append(*id, vec).unwrap();
        }

        // Reads preserve append order and pair each id with its payload
        let all_vectors = storage.read_all_vectors().unwrap();
        assert_eq!(all_vectors, test_data);
    }

    #[test]
    fn test_read_all_vectors() {
        let temp_dir = TempDir::new().unwrap();
        let dimension = VectorDimension::new(3).unwrap();

        let mut storage = MmapVectorStorage::open_or_create(&temp_dir, dimension).unwrap();

        let test_data = vec![
            (VectorId::new(10).unwrap(), vec![1.0, 2.0, 3.0]),
            (VectorId::new(20).unwrap(), vec![4.0, 5.0, 6.0]),
        ];
        let vectors: Vec<(VectorId, &[f32])> = test_data
            .iter()
            .map(|(id, vec)| (*id, vec.as_slice()))
            .collect();

        storage.append_batch(&vectors).unwrap();

        let all_vectors = storage.read_all_vectors().unwrap();
        assert_eq!(all_vectors.len(), 2);
        assert_eq!(all_vectors, test_data);
    }

    #[test]
    fn test_dimension_validation() {
        let temp_dir = TempDir::new().unwrap();
        let dimension = VectorDimension::new(3).unwrap();

        let mut storage = MmapVectorStorage::open_or_create(&temp_dir, dimension).unwrap();

        // Wrong dimension should fail
        let result = storage.append(VectorId::new(1).unwrap(), &[1.0, 2.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let dimension = VectorDimension::new(2).unwrap();

        // Write vectors with first instance
        {
            let mut storage = MmapVectorStorage::open_or_create(&temp_dir, dimension).unwrap();
            storage.append(VectorId::new(1).unwrap(), &[1.0, 2.0]).unwrap();
            storage.append(VectorId::new(2).unwrap(), &[3.0, 4.0]).unwrap();
        }

        // Read vectors with second instance
        {
            let mut storage = MmapVectorStorage::open(&temp_dir).unwrap();
            assert_eq!(storage.dimension(), dimension);

            let all_vectors = storage.read_all_vectors().unwrap();
            assert_eq!(
                all_vectors,
                vec![
                    (VectorId::new(1).unwrap(), vec![1.0, 2.0]),
                    (VectorId::new(2).unwrap(), vec![3.0, 4.0]),
                ]
            );
        }
    }
}
