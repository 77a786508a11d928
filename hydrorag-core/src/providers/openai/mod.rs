//! OpenAI-compatible embedding and chat clients

mod types;

use crate::embeddings::{self, ensure_not_empty, Embedder, EmbeddingError};
use crate::providers::{self as generation, ChatModel, ChatRequest, GenerationError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

pub use types::*;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_MAX_RETRIES: usize = 4;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

fn build_client() -> std::result::Result<Client, reqwest::Error> {
    Client::builder().timeout(REQUEST_TIMEOUT).build()
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// Embedding client for `/embeddings`
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    dim: usize,
    max_retries: usize,
    retry_delay: Duration,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
        dim: usize,
    ) -> embeddings::Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_key: api_key.into(),
            endpoint: endpoint(base_url, "embeddings"),
            model: model.into(),
            dim,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Override the retry policy; `max_retries` counts extra attempts
    pub fn with_retry(mut self, max_retries: usize, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn is_retryable_error(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || err.is_request()
    }

    fn retry_backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        self.retry_delay * (1 << capped)
    }

    fn into_vectors(
        &self,
        mut response: EmbeddingResponse,
        requested: usize,
    ) -> embeddings::Result<Vec<Vec<f32>>> {
        response.data.sort_by_key(|entry| entry.index);

        if response.data.len() != requested {
            return Err(EmbeddingError::CountMismatch {
                requested,
                returned: response.data.len(),
            });
        }
        if let Some(bad) = response.data.iter().find(|e| e.embedding.len() != self.dim) {
            return Err(EmbeddingError::Dimension {
                expected: self.dim,
                actual: bad.embedding.len(),
            });
        }

        Ok(response.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn embedding_dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[&str]) -> embeddings::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        ensure_not_empty(texts)?;

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let mut attempt = 0usize;

        loop {
            let response = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: EmbeddingResponse = resp
                        .json()
                        .await
                        .map_err(|e| EmbeddingError::Parse(e.to_string()))?;
                    debug!(inputs = texts.len(), attempt, "embeddings received");
                    return self.into_vectors(parsed, texts.len());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    if Self::should_retry(status) && attempt < self.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, "embedding request failed, retrying");
                        tokio::time::sleep(self.retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbeddingError::Api(format!("{}: {}", status, error_message(&body))));
                }
                Err(err) => {
                    if Self::is_retryable_error(&err) && attempt < self.max_retries {
                        attempt += 1;
                        warn!(error = %err, attempt, "embedding request failed, retrying");
                        tokio::time::sleep(self.retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

/// Chat client for `/chat/completions`.
///
/// Failures are returned as-is; callers own the recovery policy.
#[derive(Clone)]
pub struct OpenAiChatModel {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
    ) -> generation::Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_key: api_key.into(),
            endpoint: endpoint(base_url, "chat/completions"),
            model: model.into(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, request: ChatRequest) -> generation::Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(
            model = %self.model,
            system_chars = request.system.len(),
            user_chars = request.user.len(),
            "sending chat completion"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api(format!("{}: {}", status, error_message(&text))));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(GenerationError::EmptyResponse)
    }
}
