//! Vector storage capability
//!
//! Two capability sets:
//!
//! - [`VectorStore`]: save / get / scan / close, the minimum the engine needs
//! - [`RecordStore`]: adds metadata, precomputed norms and store-local search
//!
//! Every vector crossing the boundary is copied in and copied out.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::format::{FormatError, Metadata, Record};
use crate::search::{Scorer, SearchResult, TopK};
use crate::simd::{self, Kernel};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Vector id must not be empty")]
    EmptyId,

    #[error("Vector {id} is empty")]
    EmptyVector { id: String },

    #[error("Dimension mismatch for {id}: expected {expected}, got {actual}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Vector not found: {0}")]
    NotFound(String),

    #[error("Encode error: {0}")]
    Encode(#[from] FormatError),

    #[error("Failed to decode record {id}: {source}")]
    Decode {
        id: String,
        #[source]
        source: FormatError,
    },

    #[error("Backend error during {operation}: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Store is closed")]
    Closed,

    #[error("Failed to import vector {id}: {source}")]
    Import {
        id: String,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    pub fn backend(
        operation: &'static str,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        StoreError::Backend {
            operation,
            source: source.into(),
        }
    }
}

/// Minimal storage capability consumed by the engine
pub trait VectorStore: Send + Sync {
    fn save_vector(&self, id: &str, vector: &[f32]) -> Result<(), StoreError>;

    fn get_vector(&self, id: &str) -> Result<Vec<f32>, StoreError>;

    fn get_all_vectors(&self) -> Result<HashMap<String, Vec<f32>>, StoreError>;

    fn close(&self) -> Result<(), StoreError>;

    /// Save every entry, stopping at the first failure
    ///
    /// Entries saved before the failure stay saved.
    fn import_vectors(&self, vectors: &HashMap<String, Vec<f32>>) -> Result<(), StoreError> {
        for (id, vector) in vectors {
            self.save_vector(id, vector)
                .map_err(|source| StoreError::Import {
                    id: id.clone(),
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }

    fn export_vectors(&self) -> Result<HashMap<String, Vec<f32>>, StoreError> {
        self.get_all_vectors()
    }
}

/// Storage with metadata, precomputed norms and local search
pub trait RecordStore: VectorStore {
    /// Store a record, returning the norm computed for it
    fn add(&self, id: &str, vector: &[f32], metadata: Option<Metadata>)
        -> Result<f32, StoreError>;

    fn get(&self, id: &str) -> Result<Record, StoreError>;

    /// Top-k by cosine, with the same skip and ordering rules as the engine
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, StoreError>;
}

impl<S: VectorStore + ?Sized> VectorStore for Arc<S> {
    fn save_vector(&self, id: &str, vector: &[f32]) -> Result<(), StoreError> {
        (**self).save_vector(id, vector)
    }

    fn get_vector(&self, id: &str) -> Result<Vec<f32>, StoreError> {
        (**self).get_vector(id)
    }

    fn get_all_vectors(&self) -> Result<HashMap<String, Vec<f32>>, StoreError> {
        (**self).get_all_vectors()
    }

    fn close(&self) -> Result<(), StoreError> {
        (**self).close()
    }

    fn import_vectors(&self, vectors: &HashMap<String, Vec<f32>>) -> Result<(), StoreError> {
        (**self).import_vectors(vectors)
    }

    fn export_vectors(&self) -> Result<HashMap<String, Vec<f32>>, StoreError> {
        (**self).export_vectors()
    }
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn add(
        &self,
        id: &str,
        vector: &[f32],
        metadata: Option<Metadata>,
    ) -> Result<f32, StoreError> {
        (**self).add(id, vector, metadata)
    }

    fn get(&self, id: &str) -> Result<Record, StoreError> {
        (**self).get(id)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, StoreError> {
        (**self).search(query, k)
    }
}

/// Reject empty ids and empty vectors
pub fn validate_entry(id: &str, vector: &[f32]) -> Result<(), StoreError> {
    if id.is_empty() {
        return Err(StoreError::EmptyId);
    }
    if vector.is_empty() {
        return Err(StoreError::EmptyVector { id: id.to_string() });
    }
    Ok(())
}

/// Streaming top-k over stored records
///
/// Records are scored as they are offered; only the ones the collector keeps
/// are turned into results, so memory stays bounded by `k`.
pub struct RecordRanker<'q> {
    scorer: Scorer<'q>,
    top: TopK,
    offered: usize,
}

impl<'q> RecordRanker<'q> {
    pub fn new(kernel: Kernel, query: &'q [f32], k: usize) -> Self {
        Self {
            scorer: Scorer::new(query, kernel),
            top: TopK::new(k),
            offered: 0,
        }
    }

    fn admit(&mut self, record: &Record) -> Option<f32> {
        self.offered += 1;
        let score = self.scorer.score_with_norm(&record.vector, record.norm)?;
        self.top.accepts(score).then_some(score)
    }

    /// Offer a borrowed record; it is cloned only if kept
    pub fn offer(&mut self, id: &str, record: &Record) {
        if let Some(score) = self.admit(record) {
            self.top.push(
                SearchResult::new(id, score)
                    .with_vector(record.vector.clone())
                    .with_metadata(record.metadata.clone()),
            );
        }
    }

    pub fn offer_owned(&mut self, id: String, record: Record) {
        if let Some(score) = self.admit(&record) {
            self.top.push(
                SearchResult::new(id, score)
                    .with_vector(record.vector)
                    .with_metadata(record.metadata),
            );
        }
    }

    /// Number of records offered so far
    pub fn offered(&self) -> usize {
        self.offered
    }

    pub fn finish(self) -> Vec<SearchResult> {
        self.top.into_sorted_vec()
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory store behind a readers-writer lock
#[derive(Debug)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Record>>,
    dim: Option<usize>,
    kernel: Kernel,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store accepting vectors of any dimension
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            dim: None,
            kernel: *simd::kernel(),
        }
    }

    /// Store enforcing one dimension on every write
    pub fn with_dim(dim: usize) -> Self {
        Self {
            dim: Some(dim),
            ..Self::new()
        }
    }

    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn check(&self, id: &str, vector: &[f32]) -> Result<(), StoreError> {
        validate_entry(id, vector)?;
        match self.dim {
            Some(expected) if expected != vector.len() => Err(StoreError::DimensionMismatch {
                id: id.to_string(),
                expected,
                actual: vector.len(),
            }),
            _ => Ok(()),
        }
    }

    fn insert(&self, id: &str, record: Record) {
        self.records.write().insert(id.to_string(), record);
    }
}

impl VectorStore for MemoryStore {
    fn save_vector(&self, id: &str, vector: &[f32]) -> Result<(), StoreError> {
        self.check(id, vector)?;
        self.insert(id, Record::new(vector.to_vec(), None));
        Ok(())
    }

    fn get_vector(&self, id: &str) -> Result<Vec<f32>, StoreError> {
        self.records
            .read()
            .get(id)
            .map(|record| record.vector.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn get_all_vectors(&self) -> Result<HashMap<String, Vec<f32>>, StoreError> {
        Ok(self
            .records
            .read()
            .iter()
            .map(|(id, record)| (id.clone(), record.vector.clone()))
            .collect())
    }

    fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn add(
        &self,
        id: &str,
        vector: &[f32],
        metadata: Option<Metadata>,
    ) -> Result<f32, StoreError> {
        self.check(id, vector)?;
        let record = Record::new(vector.to_vec(), metadata);
        let norm = record.norm;
        self.insert(id, record);
        Ok(norm)
    }

    fn get(&self, id: &str) -> Result<Record, StoreError> {
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, StoreError> {
        let mut ranker = RecordRanker::new(self.kernel, query, k);
        for (id, record) in self.records.read().iter() {
            ranker.offer(id, record);
        }
        Ok(ranker.finish())
    }
}
