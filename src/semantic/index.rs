//! In-memory vector index with cosine similarity search.
//!
//! Stores job embeddings together with the job fields needed to build a
//! match result, so retrieval never has to touch durable storage.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::jobs::JobPosting;

/// An entry in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub job_id: String,
    /// Hash of the text that was embedded
    pub content_hash: String,
    pub fields: JobPosting,
    pub embedding: Vec<f32>,
}

/// A ranked query result.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub job_id: String,
    pub fields: JobPosting,
    /// `1 - cosine_similarity`; lower is more similar
    pub distance: f32,
}

/// Nearest-neighbour retrieval over job embeddings.
///
/// Implementations must tolerate concurrent queries and upserts. Callers
/// never assume two queries observe the same snapshot.
pub trait JobIndex: Send + Sync {
    /// Insert or replace the record for `job_id`.
    fn upsert(
        &self,
        job_id: &str,
        embedding: Vec<f32>,
        fields: JobPosting,
        content_hash: &str,
    ) -> Result<(), IndexError>;

    /// Up to `k` candidates ascending by distance, ties in insertion order.
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Candidate>, IndexError>;

    /// Content hash stored for `job_id`, if indexed.
    fn content_hash(&self, job_id: &str) -> Result<Option<String>, IndexError>;

    /// Replace the stored fields of `job_id`, keeping its vector and hash.
    /// Returns `false` when the job is not indexed.
    fn update_fields(&self, job_id: &str, fields: JobPosting) -> Result<bool, IndexError>;
}

#[derive(Debug, Default)]
struct IndexState {
    /// Insertion order
    entries: Vec<VectorEntry>,
    /// Job ID -> position in `entries`
    positions: HashMap<String, usize>,
}

/// In-memory vector index for job retrieval.
///
/// Exhaustive scan; replaced records keep their original insertion slot.
pub struct VectorIndex {
    state: RwLock<IndexState>,
    dimensions: usize,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimensions` length.
    pub fn new(dimensions: usize) -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            dimensions,
        }
    }

    /// Create an empty index with room for `capacity` entries.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            state: RwLock::new(IndexState {
                entries: Vec::with_capacity(capacity),
                positions: HashMap::with_capacity(capacity),
            }),
            dimensions,
        }
    }

    /// Get the embedding dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Get the number of entries in the index.
    pub fn len(&self) -> usize {
        self.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the entry for a job ID.
    pub fn get(&self, job_id: &str) -> Result<Option<VectorEntry>, IndexError> {
        let state = self.read()?;
        Ok(state
            .positions
            .get(job_id)
            .map(|&pos| state.entries[pos].clone()))
    }

    /// Remove an entry, shifting later entries down one slot.
    pub fn remove(&self, job_id: &str) -> Result<Option<VectorEntry>, IndexError> {
        let mut state = self.write()?;
        let Some(pos) = state.positions.remove(job_id) else {
            return Ok(None);
        };

        let removed = state.entries.remove(pos);
        for entry_pos in state.positions.values_mut() {
            if *entry_pos > pos {
                *entry_pos -= 1;
            }
        }

        Ok(Some(removed))
    }

    /// All indexed job IDs in insertion order.
    pub fn job_ids(&self) -> Result<Vec<String>, IndexError> {
        Ok(self
            .read()?
            .entries
            .iter()
            .map(|entry| entry.job_id.clone())
            .collect())
    }

    /// Snapshot of every entry in insertion order.
    pub fn entries(&self) -> Result<Vec<VectorEntry>, IndexError> {
        Ok(self.read()?.entries.clone())
    }

    /// Bulk load entries into the index.
    /// Used when loading from storage. Entries that cannot be inserted are
    /// logged and skipped; returns the number loaded.
    pub fn bulk_load(&self, entries: Vec<VectorEntry>) -> usize {
        let mut loaded = 0;
        for entry in entries {
            match self.upsert(&entry.job_id, entry.embedding, entry.fields, &entry.content_hash) {
                Ok(()) => loaded += 1,
                Err(e) => log::warn!("Skipping stored vector for job {}: {}", entry.job_id, e),
            }
        }
        loaded
    }

    /// Reject vectors of the wrong length.
    fn check_dimensions(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        Ok(())
    }

    /// Acquire the read lock, mapping poisoning to [`IndexError::Poisoned`].
    fn read(&self) -> Result<RwLockReadGuard<'_, IndexState>, IndexError> {
        self.state
            .read()
            .map_err(|e| IndexError::Poisoned(e.to_string()))
    }

    /// Acquire the write lock, mapping poisoning to [`IndexError::Poisoned`].
    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexState>, IndexError> {
        self.state
            .write()
            .map_err(|e| IndexError::Poisoned(e.to_string()))
    }

    /// Compute the L2 norm of a vector.
    fn l2_norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Cosine similarity with a precomputed query norm. Zero-norm operands score 0.
    fn cosine_similarity(query: &[f32], target: &[f32], query_norm: f32) -> f32 {
        let target_norm = Self::l2_norm(target);
        if query_norm < f32::EPSILON || target_norm < f32::EPSILON {
            return 0.0;
        }

        let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
        dot_product / (query_norm * target_norm)
    }
}

impl JobIndex for VectorIndex {
    fn upsert(
        &self,
        job_id: &str,
        embedding: Vec<f32>,
        fields: JobPosting,
        content_hash: &str,
    ) -> Result<(), IndexError> {
        self.check_dimensions(&embedding)?;

        if Self::l2_norm(&embedding) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        let entry = VectorEntry {
            job_id: job_id.to_string(),
            content_hash: content_hash.to_string(),
            fields,
            embedding,
        };

        let mut state = self.write()?;
        match state.positions.get(job_id).copied() {
            Some(pos) => state.entries[pos] = entry,
            None => {
                let pos = state.entries.len();
                state.entries.push(entry);
                state.positions.insert(job_id.to_string(), pos);
            }
        }

        Ok(())
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Candidate>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }
        self.check_dimensions(vector)?;

        let query_norm = Self::l2_norm(vector);
        let state = self.read()?;

        let mut scored: Vec<(f32, &VectorEntry)> = state
            .entries
            .iter()
            .map(|entry| {
                let similarity = Self::cosine_similarity(vector, &entry.embedding, query_norm);
                (1.0 - similarity, entry)
            })
            .collect();

        // sort_by is stable, so equal distances keep insertion order
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, entry)| Candidate {
                job_id: entry.job_id.clone(),
                fields: entry.fields.clone(),
                distance,
            })
            .collect())
    }

    fn content_hash(&self, job_id: &str) -> Result<Option<String>, IndexError> {
        let state = self.read()?;
        Ok(state
            .positions
            .get(job_id)
            .map(|&pos| state.entries[pos].content_hash.clone()))
    }

    fn update_fields(&self, job_id: &str, fields: JobPosting) -> Result<bool, IndexError> {
        let mut state = self.write()?;
        let Some(pos) = state.positions.get(job_id).copied() else {
            return Ok(false);
        };
        state.entries[pos].fields = fields;
        Ok(true)
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store a zero-norm vector")]
    ZeroNormVector,

    #[error("k must be a positive integer")]
    InvalidK,

    #[error("Index lock poisoned: {0}")]
    Poisoned(String),
}
