//! Durable retrieval index for hydrorag
//!
//! A flat vector index and a positionally aligned mapping store, both
//! persisted as Parquet files under one index directory.

pub mod index;
pub mod mapping;
pub mod vectors;

pub use index::{IndexStats, RagIndex, SearchHit};
pub use mapping::MappingStore;
pub use vectors::{FlatIndex, Neighbor};

use crate::embeddings::EmbeddingError;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index file not found: {0}")]
    NotFound(PathBuf),

    #[error("Index is corrupt: {0}")]
    Corrupt(String),

    #[error("No chunks to index")]
    EmptyCorpus,

    #[error("Vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Parquet error: {0}")]
    Parquet(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Locations of the index artifacts
#[derive(Debug, Clone)]
pub struct IndexPaths {
    /// Directory holding both artifacts
    pub dir: PathBuf,
}

impl IndexPaths {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the vector index file
    pub fn index_path(&self) -> PathBuf {
        self.dir.join("index.parquet")
    }

    /// Path of the chunk mapping file
    pub fn mapping_path(&self) -> PathBuf {
        self.dir.join("mapping.parquet")
    }

    /// Whether both artifacts are present
    pub fn exists(&self) -> bool {
        self.index_path().exists() && self.mapping_path().exists()
    }
}

/// Schema metadata key shared by both artifacts of one build
pub(crate) const BUILD_ID_KEY: &str = "hydrorag.build_id";

/// Fresh identifier stamped into both artifacts of a build
pub(crate) fn new_build_id() -> String {
    format!(
        "{}-{:016x}",
        chrono::Utc::now().format("%Y%m%dT%H%M%S%.f"),
        rand::random::<u64>()
    )
}

/// Build id recorded in a parquet file's schema metadata, if any
pub(crate) fn read_build_id(path: &Path) -> Result<Option<String>> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| IndexError::Parquet(e.to_string()))?;
    Ok(builder.schema().metadata().get(BUILD_ID_KEY).cloned())
}

/// A fully written temporary file waiting to be renamed over its target.
///
/// Dropping it without [`StagedFile::commit`] deletes the temporary file and
/// leaves the target untouched.
#[derive(Debug)]
pub(crate) struct StagedFile {
    tmp_path: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Write `path`'s temporary sibling, leaving `path` itself untouched
    pub(crate) fn write<F>(path: &Path, write: F) -> Result<Self>
    where
        F: FnOnce(File) -> Result<()>,
    {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let staged = Self {
            tmp_path: path.with_extension("parquet.tmp"),
            target: path.to_path_buf(),
            committed: false,
        };
        let file = File::create(&staged.tmp_path)?;
        write(file)?;
        Ok(staged)
    }

    /// Rename the temporary file into place
    pub(crate) fn commit(mut self) -> Result<()> {
        fs::rename(&self.tmp_path, &self.target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}
