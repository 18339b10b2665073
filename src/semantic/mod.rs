//! Vector retrieval for job matching.
//!
//! # Architecture
//!
//! - `embeddings`: text to vector, via fastembed or feature hashing
//! - `index`: in-memory vector index with cosine distance search
//! - `storage`: binary file I/O for vectors.bin persistence
//! - `indexer`: keeps the index in step with the job postings

pub mod embeddings;
mod index;
mod indexer;
mod storage;

pub use embeddings::{run_with_timeout, Embedder, EmbeddingError, EmbeddingModel, HashEmbedder};
pub use index::{Candidate, IndexError, JobIndex, VectorEntry, VectorIndex};
pub use indexer::{IndexReport, JobIndexer};
pub use storage::{VectorStorage, VectorStorageError};

/// Default embedding model name
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Dimensions of [`DEFAULT_MODEL`], also the default for the hashing embedder
pub const DEFAULT_DIMENSIONS: usize = 384;
