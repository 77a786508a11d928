//! Token-budgeted context assembly
//!
//! Embeds a query, retrieves the nearest chunks and lays them out under
//! numbered relevance headers until the token budget runs out.

pub mod tokens;

pub use tokens::{HfTokenCounter, TokenCounter, WordTokenCounter};

use crate::embeddings::Embedder;
use crate::storage::{IndexError, RagIndex};
use rand::Rng;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Returned when retrieval yields nothing usable
pub const NO_DOCUMENTS_MARKER: &str = "No relevant documents found.";

pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_TOKEN_BUDGET: usize = 6700;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}

pub type Result<T> = std::result::Result<T, ContextError>;

/// Tokens consumed so far and the formatted parts, for one build
#[derive(Debug, Default)]
struct BudgetState {
    used: usize,
    parts: Vec<String>,
}

/// Builds grounding context for a query from a loaded index
#[derive(Clone)]
pub struct ContextBuilder {
    index: Arc<RagIndex>,
    embedder: Arc<dyn Embedder>,
    counter: Arc<dyn TokenCounter>,
}

impl ContextBuilder {
    pub fn new(
        index: Arc<RagIndex>,
        embedder: Arc<dyn Embedder>,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            index,
            embedder,
            counter,
        }
    }

    /// Assemble at most `token_budget` tokens of context for `query`.
    ///
    /// Never returns an empty string: when no chunk is retrieved, or none
    /// fits, the result is [`NO_DOCUMENTS_MARKER`].
    pub async fn build_context(&self, query: &str, k: usize, token_budget: usize) -> Result<String> {
        let query_vector = self.query_vector(query).await;
        let hits = self.index.search(&query_vector, k)?;

        if hits.is_empty() {
            return Ok(NO_DOCUMENTS_MARKER.to_string());
        }

        let mut state = BudgetState::default();

        for (n, hit) in hits.iter().enumerate() {
            let header = format!(
                "[Document {} | category: {} | relevance: {:.2}]",
                n + 1,
                hit.chunk.category,
                hit.relevance()
            );
            let header_tokens = self.counter.count(&header)?;
            if state.used + header_tokens > token_budget {
                break;
            }

            let remaining = token_budget - state.used - header_tokens;
            if remaining == 0 {
                continue;
            }

            let (body, body_tokens) = self.counter.truncate(&hit.chunk.text, remaining)?;
            if body_tokens == 0 || body.trim().is_empty() {
                continue;
            }

            state.used += header_tokens + body_tokens;
            state.parts.push(format!("{}\n{}", header, body));
        }

        debug!(
            retrieved = hits.len(),
            included = state.parts.len(),
            tokens = state.used,
            token_budget,
            "context assembled"
        );

        if state.parts.is_empty() {
            return Ok(NO_DOCUMENTS_MARKER.to_string());
        }
        Ok(state.parts.join("\n\n"))
    }

    /// Embed the query, degrading to a random vector when the
    /// embedder fails so retrieval still returns something
    async fn query_vector(&self, query: &str) -> Vec<f32> {
        let dim = self.index.dim();

        match self.embedder.embed(query).await {
            Ok(vector) if vector.len() == dim => vector,
            Ok(vector) => {
                warn!(
                    expected = dim,
                    actual = vector.len(),
                    "query embedding has wrong dimension, using random fallback vector"
                );
                random_vector(dim)
            }
            Err(e) => {
                warn!(error = %e, "query embedding failed, using random fallback vector");
                random_vector(dim)
            }
        }
    }
}

fn random_vector(dim: usize) -> Vec<f32> {
    let mut rng = rand::rng();
    (0..dim).map(|_| rng.random_range(-1.0f32..1.0)).collect()
}
