//! Durable vector store: the in-memory index plus its on-disk image.
//!
//! This is the only shared mutable state the embedding pipeline touches.
//! Writes are whole-entry overwrites keyed by file id, so concurrent
//! invocations for the same file are safe (last write wins).

use std::path::PathBuf;
use std::sync::RwLock;

use crate::semantic::index::{IndexError, ScoredId, VectorIndex};
use crate::semantic::storage::{VectorStorage, VectorStorageError};

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),
}

pub struct VectorStore {
    index: RwLock<VectorIndex>,
    storage: VectorStorage,
    model_id: [u8; 32],
}

impl VectorStore {
    /// Open the store, loading `vectors.bin` when present.
    ///
    /// A file written under a different embedding model or format version
    /// starts a fresh index (old vectors are unusable with the new
    /// model); real corruption or I/O failure is an error.
    pub fn open(
        path: PathBuf,
        dimensions: usize,
        model_id: [u8; 32],
    ) -> Result<Self, VectorStoreError> {
        let storage = VectorStorage::new(path);

        let index = if storage.exists() {
            match storage.load(&model_id, dimensions) {
                Ok(index) => {
                    log::info!("Loaded {} vectors from storage", index.len());
                    index
                }
                Err(VectorStorageError::ModelMismatch) => {
                    log::warn!("Embedding model changed, creating fresh index");
                    VectorIndex::new(dimensions)
                }
                Err(VectorStorageError::VersionMismatch(file_ver, _)) => {
                    log::warn!(
                        "Vector storage version {} unsupported, creating fresh index",
                        file_ver
                    );
                    VectorIndex::new(dimensions)
                }
                Err(e) => {
                    log::error!("Failed to load vectors: {}", e);
                    return Err(e.into());
                }
            }
        } else {
            log::info!("No existing vector index, starting fresh");
            VectorIndex::new(dimensions)
        };

        Ok(Self {
            index: RwLock::new(index),
            storage,
            model_id,
        })
    }

    pub fn len(&self) -> usize {
        self.index.read().unwrap().len()
    }

    /// Whether `id` currently has a persisted vector. Absence means the
    /// record is unprocessed (or its last attempt failed).
    pub fn contains(&self, id: u64) -> bool {
        self.index.read().unwrap().contains(id)
    }

    /// Persist a vector for `id`, overwriting any prior one, and flush
    /// the index to disk.
    pub fn persist(
        &self,
        id: u64,
        org_id: &str,
        embedding: Vec<f32>,
    ) -> Result<(), VectorStoreError> {
        {
            let mut index = self.index.write().unwrap();
            index.insert(id, org_id.to_string(), embedding)?;
        }
        self.save()?;
        Ok(())
    }

    /// Drop the vector for `id` if present.
    pub fn remove(&self, id: u64) -> Result<bool, VectorStoreError> {
        let removed = self.index.write().unwrap().remove(id).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn search(
        &self,
        query: &[f32],
        org_id: &str,
        floor: f32,
        limit: usize,
    ) -> Result<Vec<ScoredId>, IndexError> {
        self.index.read().unwrap().search(query, org_id, floor, limit)
    }

    pub fn save(&self) -> Result<(), VectorStorageError> {
        let index = self.index.read().unwrap();
        self.storage.save(&index, &self.model_id)
    }
}
