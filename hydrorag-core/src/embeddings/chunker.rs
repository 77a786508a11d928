//! Document chunking for embedding generation
//!
//! Splits extracted document text into fixed-size character windows.

use serde::{Deserialize, Serialize};

/// Category assigned when a document does not carry one
pub const DEFAULT_CATEGORY: &str = "general";

/// Configuration for the document chunker
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Number of characters (Unicode scalar values) per window
    pub chunk_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { chunk_chars: 1000 }
    }
}

/// A unit of extracted text handed to the indexer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    /// Opaque locator: file path, page/table reference, image path
    pub source: String,
    pub category: String,
}

impl Document {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            category: DEFAULT_CATEGORY.to_string(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

/// A bounded span of source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// The text content of this chunk
    pub text: String,
    /// Locator of the document the chunk came from
    pub source: String,
    /// Category label, "general" when unknown
    pub category: String,
}

/// Chunker for splitting documents into fixed windows
pub struct DocumentChunker {
    config: ChunkerConfig,
}

impl DocumentChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn with_chunk_chars(chunk_chars: usize) -> Self {
        Self::new(ChunkerConfig { chunk_chars })
    }

    /// Chunk a single text string.
    ///
    /// Windows are not overlapping and not trimmed, so the kept windows
    /// concatenate back to the input minus the whitespace-only ones.
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let size = self.config.chunk_chars.max(1);
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut count = 0;

        for (idx, _) in text.char_indices() {
            if count == size {
                Self::push_window(&mut chunks, &text[start..idx]);
                start = idx;
                count = 0;
            }
            count += 1;
        }

        if start < text.len() {
            Self::push_window(&mut chunks, &text[start..]);
        }

        chunks
    }

    fn push_window(chunks: &mut Vec<String>, window: &str) {
        if !window.trim().is_empty() {
            chunks.push(window.to_string());
        }
    }

    /// Chunk a document, tagging every piece with its source and category
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.chunk_text(&document.text)
            .into_iter()
            .map(|text| Chunk {
                text,
                source: document.source.clone(),
                category: document.category.clone(),
            })
            .collect()
    }

    /// Chunk multiple documents, preserving document order
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|d| self.chunk_document(d))
            .collect()
    }
}
