//! Retrieval-augmented question answering

use crate::embeddings::Embedder;
use crate::providers::{ChatModel, ChatRequest, Result};
use crate::storage::{self, RagIndex, SearchHit};
use std::sync::Arc;
use tracing::debug;

pub const ANSWER_SYSTEM_PROMPT: &str = "You are a water treatment expert specializing in \
reverse osmosis systems. Answer questions based only on the provided context.";

pub const DEFAULT_ANSWER_TEMPERATURE: f32 = 0.3;

/// User prompt carrying the question and its grounding context
pub fn answer_prompt(query: &str, context: &str) -> String {
    format!(
        "Based on the following information from water treatment documentation, \
please answer the question.\n\n\
Question: {}\n\n\
Relevant Information:\n{}\n\n\
Answer the question using only the information provided above. If the information \
is not sufficient to answer, say so explicitly.",
        query, context
    )
}

/// Answers questions from assembled context with a chat model
#[derive(Clone)]
pub struct Generator {
    chat: Arc<dyn ChatModel>,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl Generator {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self {
            chat,
            temperature: DEFAULT_ANSWER_TEMPERATURE,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Raw completion for `query` grounded in `context`. Not retried.
    pub async fn generate_answer(&self, query: &str, context: &str) -> Result<String> {
        let mut request = ChatRequest::new(ANSWER_SYSTEM_PROMPT, answer_prompt(query, context))
            .temperature(self.temperature);
        request.max_tokens = self.max_tokens;

        debug!(context_chars = context.len(), "generating answer");
        self.chat.complete(request).await
    }
}

/// Embed `query` and return its `k` nearest chunks
pub async fn query_index(
    index: &RagIndex,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
) -> storage::Result<Vec<SearchHit>> {
    let vector = embedder.embed(query).await?;
    index.search(&vector, k)
}
