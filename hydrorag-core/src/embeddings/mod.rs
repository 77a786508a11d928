//! Embeddings module for semantic retrieval
//!
//! Provides text chunking and the embedding abstraction used by the index.

pub mod chunker;
pub mod model;

pub use chunker::{Chunk, ChunkerConfig, Document, DocumentChunker, DEFAULT_CATEGORY};
pub use model::{Embedder, HashEmbedder};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Cannot embed empty text")]
    EmptyInput,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Embedding service returned {returned} vectors for {requested} inputs")]
    CountMismatch { requested: usize, returned: usize },

    #[error("Expected embedding dimension {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Reject inputs with no semantic content before they reach a provider
pub(crate) fn ensure_not_empty(texts: &[&str]) -> Result<()> {
    if texts.iter().any(|t| t.trim().is_empty()) {
        return Err(EmbeddingError::EmptyInput);
    }
    Ok(())
}
