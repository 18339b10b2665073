//! Binary storage for the job vector index.
//!
//! File format: vectors.bin
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated, insertion order):
//! - job_id: u32 length + UTF-8 bytes
//! - content_hash: u32 length + UTF-8 bytes
//! - fields: u32 length + JSON-encoded job posting
//! - embedding: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::semantic::index::{IndexError, VectorEntry, VectorIndex};

const FORMAT_VERSION: u8 = 1;

/// version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Upper bound for a single length-prefixed field, guards against reading
/// garbage lengths from a truncated file.
const MAX_FIELD_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid job fields: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// Storage manager for the vector index file.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    /// Create a storage manager for the given file path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Get the storage file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the storage file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the vector index, checking it was built by the expected model.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<VectorIndex, VectorStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = Self::read_header(&mut reader)?;
        Self::validate_header(&header, expected_model_id, expected_dimensions)?;

        let mut entries = Vec::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            entries.push(Self::read_entry(&mut reader, header.dimensions as usize)?);
        }

        let index = VectorIndex::with_capacity(header.dimensions as usize, entries.len());
        let loaded = index.bulk_load(entries);
        if loaded as u64 != header.entry_count {
            log::warn!(
                "Loaded {} of {} stored vectors",
                loaded,
                header.entry_count
            );
        }

        Ok(index)
    }

    /// Save the vector index.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(
        &self,
        index: &VectorIndex,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let temp_path = self.path.with_extension("tmp");

        let result = Self::write_to_file(&temp_path, index, model_id);

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Load the stored index, or start an empty one when there is nothing
    /// usable on disk. A different model or format version means the vectors
    /// are stale, so those start fresh too. Corruption is reported.
    pub fn load_or_create(
        &self,
        model_id: &[u8; 32],
        dimensions: usize,
    ) -> Result<VectorIndex, VectorStorageError> {
        if !self.exists() {
            log::info!("No existing index, starting fresh");
            return Ok(VectorIndex::new(dimensions));
        }

        match self.load(model_id, dimensions) {
            Ok(index) => {
                log::info!("Loaded {} vectors from storage", index.len());
                Ok(index)
            }
            Err(VectorStorageError::ModelMismatch) => {
                log::warn!("Model changed, creating fresh index");
                Ok(VectorIndex::new(dimensions))
            }
            Err(VectorStorageError::DimensionMismatch { got, .. }) => {
                log::warn!("Stored vectors have {} dimensions, creating fresh index", got);
                Ok(VectorIndex::new(dimensions))
            }
            Err(VectorStorageError::VersionMismatch(file_ver, _)) => {
                log::warn!(
                    "Storage version {} unsupported, creating fresh index",
                    file_ver
                );
                Ok(VectorIndex::new(dimensions))
            }
            Err(e) => {
                log::error!("Failed to load vectors: {}", e);
                Err(e)
            }
        }
    }

    /// Write the header and every entry to `path`, then fsync.
    fn write_to_file(
        path: &Path,
        index: &VectorIndex,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let dimensions = u16::try_from(index.dimensions()).map_err(|_| {
            VectorStorageError::InvalidFormat(format!(
                "{} dimensions do not fit the header",
                index.dimensions()
            ))
        })?;
        let entries = index.entries()?;

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            version: FORMAT_VERSION,
            model_id: *model_id,
            dimensions,
            entry_count: entries.len() as u64,
        };
        Self::write_header(&mut writer, &header)?;

        for entry in &entries {
            Self::write_entry(&mut writer, entry)?;
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;

        Ok(())
    }

    /// Read and verify the header. The checksum is checked before any field
    /// is trusted.
    fn read_header(reader: &mut impl Read) -> Result<Header, VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;

        let version = header_bytes[0];
        if version > FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let stored_checksum = u32::from_le_bytes([
            header_bytes[43],
            header_bytes[44],
            header_bytes[45],
            header_bytes[46],
        ]);
        if stored_checksum != crc32fast::hash(&header_bytes[0..43]) {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        let mut model_id = [0u8; 32];
        model_id.copy_from_slice(&header_bytes[1..33]);

        let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);

        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&header_bytes[35..43]);
        let entry_count = u64::from_le_bytes(count_bytes);

        Ok(Header {
            version,
            model_id,
            dimensions,
            entry_count,
        })
    }

    /// Check the header against the current model and dimensions.
    fn validate_header(
        header: &Header,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<(), VectorStorageError> {
        if header.model_id != *expected_model_id {
            return Err(VectorStorageError::ModelMismatch);
        }

        if header.dimensions as usize != expected_dimensions {
            return Err(VectorStorageError::DimensionMismatch {
                expected: expected_dimensions,
                got: header.dimensions as usize,
            });
        }

        Ok(())
    }

    /// Write the header with its CRC32 checksum.
    fn write_header(writer: &mut impl Write, header: &Header) -> Result<(), VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0] = header.version;
        header_bytes[1..33].copy_from_slice(&header.model_id);
        header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
        header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

        let checksum = crc32fast::hash(&header_bytes[0..43]);
        header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    /// Read a u32 length-prefixed byte field.
    fn read_bytes(reader: &mut impl Read) -> Result<Vec<u8>, VectorStorageError> {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes);
        if len > MAX_FIELD_LEN {
            return Err(VectorStorageError::InvalidFormat(format!(
                "field length {len} exceeds limit"
            )));
        }

        let mut bytes = vec![0u8; len as usize];
        reader.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    /// Read a length-prefixed UTF-8 string.
    fn read_string(reader: &mut impl Read) -> Result<String, VectorStorageError> {
        String::from_utf8(Self::read_bytes(reader)?)
            .map_err(|e| VectorStorageError::InvalidFormat(e.to_string()))
    }

    /// Write a u32 length-prefixed byte field.
    fn write_bytes(writer: &mut impl Write, bytes: &[u8]) -> Result<(), VectorStorageError> {
        let len = u32::try_from(bytes.len())
            .ok()
            .filter(|len| *len <= MAX_FIELD_LEN)
            .ok_or_else(|| {
                VectorStorageError::InvalidFormat(format!(
                    "field length {} exceeds limit",
                    bytes.len()
                ))
            })?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(bytes)?;
        Ok(())
    }

    /// Read a single entry.
    fn read_entry(
        reader: &mut impl Read,
        dimensions: usize,
    ) -> Result<VectorEntry, VectorStorageError> {
        let job_id = Self::read_string(reader)?;
        let content_hash = Self::read_string(reader)?;
        let fields = serde_json::from_slice(&Self::read_bytes(reader)?)?;

        let mut embedding = Vec::with_capacity(dimensions);
        for _ in 0..dimensions {
            let mut float_bytes = [0u8; 4];
            reader.read_exact(&mut float_bytes)?;
            embedding.push(f32::from_le_bytes(float_bytes));
        }

        Ok(VectorEntry {
            job_id,
            content_hash,
            fields,
            embedding,
        })
    }

    /// Write a single entry.
    fn write_entry(writer: &mut impl Write, entry: &VectorEntry) -> Result<(), VectorStorageError> {
        Self::write_bytes(writer, entry.job_id.as_bytes())?;
        Self::write_bytes(writer, entry.content_hash.as_bytes())?;
        Self::write_bytes(writer, &serde_json::to_vec(&entry.fields)?)?;

        for &value in &entry.embedding {
            writer.write_all(&value.to_le_bytes())?;
        }

        Ok(())
    }
}

/// File header.
#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobPosting;
    use crate::semantic::index::JobIndex;

    fn test_model_id() -> [u8; 32] {
        let mut id = [0u8; 32];
        id[0] = 0xAB;
        id[31] = 0xCD;
        id
    }

    fn fields(id: &str) -> JobPosting {
        JobPosting {
            id: id.to_string(),
            title: "Data Engineer".to_string(),
            company: "Initech".to_string(),
            tags: vec!["Spark".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_save_and_load_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().join("vectors.bin"));

        storage.save(&VectorIndex::new(384), &test_model_id()).unwrap();
        assert!(storage.exists());

        let loaded = storage.load(&test_model_id(), 384).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dimensions(), 384);
    }

    #[test]
    fn test_save_and_load_preserves_entries_and_order() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().join("vectors.bin"));

        let index = VectorIndex::new(3);
        index.upsert("job-2", vec![0.0, 1.0, 0.0], fields("job-2"), "h2").unwrap();
        index.upsert("job-1", vec![1.0, 0.0, 0.0], fields("job-1"), "h1").unwrap();
        storage.save(&index, &test_model_id()).unwrap();

        let loaded = storage.load(&test_model_id(), 3).unwrap();
        assert_eq!(loaded.entries().unwrap(), index.entries().unwrap());

        let entry = loaded.get("job-1").unwrap().unwrap();
        assert_eq!(entry.content_hash, "h1");
        assert_eq!(entry.fields.tags, vec!["Spark".to_string()]);
    }

    #[test]
    fn test_model_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().join("vectors.bin"));
        storage.save(&VectorIndex::new(3), &test_model_id()).unwrap();

        let mut wrong_model_id = [0u8; 32];
        wrong_model_id[0] = 0xFF;

        let result = storage.load(&wrong_model_id, 3);
        assert!(matches!(result, Err(VectorStorageError::ModelMismatch)));
    }

    #[test]
    fn test_dimension_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().join("vectors.bin"));
        storage.save(&VectorIndex::new(3), &test_model_id()).unwrap();

        let result = storage.load(&test_model_id(), 384);
        assert!(matches!(result, Err(VectorStorageError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_atomic_write_cleans_up_on_error() {
        let path = PathBuf::from("/nonexistent/directory/vectors.bin");
        let storage = VectorStorage::new(path.clone());

        let result = storage.save(&VectorIndex::new(3), &test_model_id());

        assert!(result.is_err());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_load_or_create_starts_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().join("vectors.bin"));

        // nothing on disk
        assert!(storage.load_or_create(&test_model_id(), 3).unwrap().is_empty());

        let index = VectorIndex::new(3);
        index.upsert("1", vec![1.0, 0.0, 0.0], fields("1"), "h").unwrap();
        storage.save(&index, &test_model_id()).unwrap();

        assert_eq!(storage.load_or_create(&test_model_id(), 3).unwrap().len(), 1);
        // another model's vectors are discarded
        assert!(storage.load_or_create(&[7u8; 32], 3).unwrap().is_empty());
        assert!(storage.load_or_create(&test_model_id(), 8).unwrap().is_empty());
    }

    #[test]
    fn test_load_or_create_reports_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vectors.bin");
        std::fs::write(&path, [FORMAT_VERSION; HEADER_SIZE]).unwrap();

        let storage = VectorStorage::new(path);
        assert!(matches!(
            storage.load_or_create(&test_model_id(), 3),
            Err(VectorStorageError::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_checksum_detects_corruption() {
        use std::io::{Seek, SeekFrom};

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vectors.bin");
        let storage = VectorStorage::new(path.clone());

        let index = VectorIndex::new(3);
        index.upsert("1", vec![1.0, 0.0, 0.0], fields("1"), "h").unwrap();
        storage.save(&index, &test_model_id()).unwrap();

        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(10)).unwrap();
        file.write_all(&[0xFF]).unwrap();

        let result = storage.load(&test_model_id(), 3);
        assert!(matches!(result, Err(VectorStorageError::ChecksumMismatch)));
    }

    #[test]
    fn test_truncated_file_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vectors.bin");
        let storage = VectorStorage::new(path.clone());

        let index = VectorIndex::new(3);
        index.upsert("1", vec![1.0, 0.0, 0.0], fields("1"), "h").unwrap();
        storage.save(&index, &test_model_id()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 6]).unwrap();

        assert!(matches!(
            storage.load(&test_model_id(), 3),
            Err(VectorStorageError::Io(_))
        ));
    }
}
