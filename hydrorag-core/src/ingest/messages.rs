//! Inter-stage message types for folder ingestion

use crate::embeddings::{Chunk, Document};
use std::path::PathBuf;

/// Messages passed between ingestion stages.
///
/// `order` is the file's position in the sorted walk, used to restore a
/// deterministic chunk order after parallel processing.
#[derive(Debug, Clone)]
pub enum IngestMessage {
    /// Stage 1 output: a file to read
    FileFound { order: usize, path: PathBuf },

    /// Stage 2 output: file contents with source and category
    FileRead { order: usize, document: Document },

    /// Stage 3 output: chunks of one file
    Chunked { order: usize, chunks: Vec<Chunk> },

    /// A file that could not be processed
    Error {
        path: String,
        stage: &'static str,
        message: String,
    },
}
