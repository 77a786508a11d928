//! Embedding model abstraction
//!
//! Remote providers implement [`Embedder`]; [`HashEmbedder`] is an
//! offline deterministic stand-in used by tests and `--offline` runs.

use super::{ensure_not_empty, EmbeddingError, Result};
use async_trait::async_trait;

/// Trait for embedding models (allows mocking)
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Name of the model producing the vectors, recorded with the index
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn embedding_dim(&self) -> usize;

    /// Generate embeddings for a batch of texts, in input order
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text]).await?;
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            returned => Err(EmbeddingError::CountMismatch {
                requested: 1,
                returned,
            }),
        }
    }
}

/// Deterministic embedding model (returns hash-derived embeddings)
#[derive(Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub const MODEL_NAME: &'static str = "hash-embedder";

    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    /// Generate a deterministic embedding based on text hash
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let hash = text.bytes().fold(0u64, |acc, b| {
            acc.wrapping_mul(31).wrapping_add(b as u64)
        });

        let mut embedding: Vec<f32> = (0..self.dim)
            .map(|i| {
                let mixed = hash
                    .wrapping_mul(i as u64 * 2 + 1)
                    .rotate_left((i % 64) as u32);
                (mixed % 1000) as f32 / 1000.0 - 0.5
            })
            .collect();

        // L2 normalize
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        }

        embedding
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }

    fn embedding_dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        ensure_not_empty(texts)?;
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
