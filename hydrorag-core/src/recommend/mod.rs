//! Recommendation pipeline
//!
//! Four sequential stages turn a lab record and a customer request into a
//! product recommendation:
//! 1. Search query - condense record and request into a retrieval query
//! 2. Context - token-budgeted excerpts for that query
//! 3. Summary - prose description of the record
//! 4. Recommendation - structured products plus a markdown explanation
//!
//! The first three stages substitute a degraded value on failure. A failed
//! recommendation stage yields the placeholder recommendation, so the
//! pipeline always returns a well-formed result.

pub mod prompts;
pub mod types;

pub use types::*;

use crate::context::{ContextBuilder, DEFAULT_TOKEN_BUDGET, DEFAULT_TOP_K};
use crate::parser::{self, ParseError};
use crate::providers::erp::ProductCatalog;
use crate::providers::{ChatModel, ChatRequest, GenerationError};
use prompts::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Context used when retrieval fails outright
pub const FALLBACK_CONTEXT: &str =
    "No documentation context is available; rely on general water treatment practice.";

/// Characters of the raw record kept when summarization fails
pub const RECORD_FALLBACK_CHARS: usize = 1000;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("Context error: {0}")]
    Context(#[from] crate::context::ContextError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model returned an empty reply")]
    Empty,
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SearchQuery,
    Context,
    Summary,
    Recommendation,
}

/// Tunables for one pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub token_budget: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stage_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            token_budget: DEFAULT_TOKEN_BUDGET,
            temperature: 0.2,
            max_tokens: 2000,
            stage_timeout: Duration::from_secs(60),
        }
    }
}

/// Everything one run produced, including which stages fell back
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub recommendation: Recommendation,
    pub explanation: String,
    pub search_query: String,
    pub degraded: Vec<Stage>,
}

pub struct RecommendationPipeline {
    chat: Arc<dyn ChatModel>,
    context: ContextBuilder,
    catalog: Arc<dyn ProductCatalog>,
    settings: PipelineSettings,
}

impl RecommendationPipeline {
    pub fn new(
        chat: Arc<dyn ChatModel>,
        context: ContextBuilder,
        catalog: Arc<dyn ProductCatalog>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            chat,
            context,
            catalog,
            settings,
        }
    }

    /// Recommendation and explanation for a request. Never fails.
    pub async fn process(&self, user_query: &str, record_json: &str) -> (Recommendation, String) {
        let outcome = self.run(user_query, record_json).await;
        (outcome.recommendation, outcome.explanation)
    }

    /// Run every stage and attach catalog details to each product
    pub async fn process_and_enrich(
        &self,
        record_json: &str,
        user_query: &str,
    ) -> EnrichedRecommendation {
        let outcome = self.run(user_query, record_json).await;

        EnrichedRecommendation {
            cart: self.enrich(&outcome.recommendation).await,
            explanation: outcome.explanation,
        }
    }

    /// Run every stage, recording degraded ones
    pub async fn run(&self, user_query: &str, record_json: &str) -> PipelineOutcome {
        let mut degraded = Vec::new();

        let search_query = match self.generate_search_query(user_query, record_json).await {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, "search query generation failed, using request text");
                degraded.push(Stage::SearchQuery);
                format!("{} water treatment system design", user_query)
            }
        };

        let context = match self.build_context(&search_query).await {
            Ok(context) => context,
            Err(e) => {
                warn!(error = %e, "context retrieval failed, continuing without documents");
                degraded.push(Stage::Context);
                FALLBACK_CONTEXT.to_string()
            }
        };

        let summary = match self.summarize_record(record_json).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "record summary failed, using raw record");
                degraded.push(Stage::Summary);
                record_json.chars().take(RECORD_FALLBACK_CHARS).collect()
            }
        };

        let (recommendation, explanation) =
            match self.get_recommendation(user_query, &summary, &context).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "recommendation failed, returning placeholder");
                    degraded.push(Stage::Recommendation);
                    (
                        Recommendation::placeholder(),
                        format!("An error occurred while generating the recommendation: {}", e),
                    )
                }
            };

        info!(
            products = recommendation.products().count(),
            degraded = ?degraded,
            "recommendation pipeline finished"
        );

        PipelineOutcome {
            recommendation,
            explanation,
            search_query,
            degraded,
        }
    }

    async fn ask(&self, system: &str, user: String) -> Result<String, StageError> {
        let request = ChatRequest::new(system, user)
            .temperature(self.settings.temperature)
            .max_tokens(self.settings.max_tokens);
        let timeout = self.settings.stage_timeout;

        let reply = tokio::time::timeout(timeout, self.chat.complete(request))
            .await
            .map_err(|_| StageError::Timeout(timeout))??;
        Ok(reply)
    }

    async fn generate_search_query(
        &self,
        user_query: &str,
        record_json: &str,
    ) -> Result<String, StageError> {
        let reply = self
            .ask(SEARCH_QUERY_SYSTEM, search_query_prompt(user_query, record_json))
            .await?;
        let query = reply.trim().trim_matches('"').trim();

        if query.is_empty() {
            return Err(StageError::Empty);
        }
        Ok(query.to_string())
    }

    async fn build_context(&self, search_query: &str) -> Result<String, StageError> {
        let timeout = self.settings.stage_timeout;
        let context = tokio::time::timeout(
            timeout,
            self.context
                .build_context(search_query, self.settings.top_k, self.settings.token_budget),
        )
        .await
        .map_err(|_| StageError::Timeout(timeout))??;
        Ok(context)
    }

    async fn summarize_record(&self, record_json: &str) -> Result<String, StageError> {
        let reply = self.ask(SUMMARY_SYSTEM, summary_prompt(record_json)).await?;

        if reply.trim().is_empty() {
            return Err(StageError::Empty);
        }
        Ok(reply.trim().to_string())
    }

    async fn get_recommendation(
        &self,
        user_query: &str,
        summary: &str,
        context: &str,
    ) -> Result<(Recommendation, String), StageError> {
        let reply = self
            .ask(
                RECOMMENDATION_SYSTEM,
                recommendation_prompt(user_query, summary, context),
            )
            .await?;

        Ok(parser::parse_structured::<Recommendation>(&reply)?)
    }

    async fn enrich(&self, recommendation: &Recommendation) -> EnrichedCart {
        EnrichedCart {
            pretreatment: self.enrich_stage(&recommendation.pretreatment).await,
            ro: self.enrich_stage(&recommendation.ro).await,
            postreatment: self.enrich_stage(&recommendation.postreatment).await,
        }
    }

    async fn enrich_stage(&self, products: &[Product]) -> Vec<EnrichedProduct> {
        let mut enriched = Vec::with_capacity(products.len());

        for product in products {
            let mut details = None;
            for key in [&product.model_number, &product.product_name] {
                if key.trim().is_empty() {
                    continue;
                }
                details = self.catalog.get_product_details(key).await;
                if details.is_some() {
                    break;
                }
            }

            enriched.push(EnrichedProduct {
                product: product.clone(),
                details,
            });
        }

        enriched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{WordTokenCounter, NO_DOCUMENTS_MARKER};
    use crate::embeddings::{Chunk, Embedder, HashEmbedder};
    use crate::providers::erp::{EmptyCatalog, ProductDetails};
    use crate::providers::MockChatModel;
    use crate::storage::{FlatIndex, MappingStore, RagIndex};
    use async_trait::async_trait;
    use std::collections::HashMap;

    const RECORD: &str = r#"{"ph": 6.1, "tds": 1850, "iron": 2.4, "hardness": 420}"#;

    const GOOD_REPLY: &str = "```json\n{\"pretreatment\": [{\"product_description\": \"Iron removal filter\", \
\"product_name\": \"Greensand Filter\", \"model_number\": \"GF-1054\"}], \
\"RO\": [{\"product_description\": \"Brackish water RO\", \"product_name\": \"RO Unit\", \"model_number\": \"RO-500\"}], \
\"postreatment\": []}\n```\nIron must be removed before the membranes.";

    fn context_builder() -> ContextBuilder {
        let embedder = HashEmbedder::new(16);
        let chunks = vec![
            Chunk {
                text: "Greensand filters remove iron above 0.3 mg/L".to_string(),
                source: "iron.txt".to_string(),
                category: "pretreatment".to_string(),
            },
            Chunk {
                text: "Brackish RO membranes reject 99% of TDS".to_string(),
                source: "ro.txt".to_string(),
                category: "ro".to_string(),
            },
        ];
        let vectors: Vec<Vec<f32>> = chunks.iter().map(|c| embedder.embed_text(&c.text)).collect();
        let index = RagIndex::from_parts(
            FlatIndex::from_vectors(16, &vectors).unwrap(),
            MappingStore::new(chunks),
            HashEmbedder::MODEL_NAME,
        )
        .unwrap();

        ContextBuilder::new(
            Arc::new(index),
            Arc::new(embedder) as Arc<dyn Embedder>,
            Arc::new(WordTokenCounter::new()),
        )
    }

    fn pipeline(chat: impl ChatModel + 'static, catalog: impl ProductCatalog + 'static) -> RecommendationPipeline {
        RecommendationPipeline::new(
            Arc::new(chat),
            context_builder(),
            Arc::new(catalog),
            PipelineSettings::default(),
        )
    }

    fn happy_chat() -> MockChatModel {
        let mut chat = MockChatModel::new();
        chat.expect_complete()
            .withf(|r| r.system == SEARCH_QUERY_SYSTEM)
            .returning(|_| Ok("\"iron removal before brackish RO\"".to_string()));
        chat.expect_complete()
            .withf(|r| r.system == SUMMARY_SYSTEM)
            .returning(|_| Ok("Iron is 2.4 mg/L, well above the limit.".to_string()));
        chat.expect_complete()
            .withf(|r| r.system == RECOMMENDATION_SYSTEM)
            .returning(|_| Ok(GOOD_REPLY.to_string()));
        chat
    }

    struct FixedCatalog(HashMap<String, ProductDetails>);

    #[async_trait]
    impl ProductCatalog for FixedCatalog {
        async fn get_product_details(&self, no: &str) -> Option<ProductDetails> {
            self.0.get(no).cloned()
        }
    }

    fn details(no: &str, price: f64) -> ProductDetails {
        ProductDetails {
            no: no.to_string(),
            inventory: 3,
            unit_price: price,
            description: format!("{} from ERP", no),
            item_category_code: "WT".to_string(),
            product_model: no.to_string(),
            specifications: String::new(),
            warranty: "12 months".to_string(),
        }
    }

    #[tokio::test]
    async fn test_process_happy_path() {
        let outcome = pipeline(happy_chat(), EmptyCatalog).run("Need drinking water", RECORD).await;

        assert!(outcome.degraded.is_empty());
        assert_eq!(outcome.search_query, "iron removal before brackish RO");
        assert_eq!(outcome.recommendation.pretreatment[0].model_number, "GF-1054");
        assert_eq!(outcome.recommendation.ro[0].product_name, "RO Unit");
        assert!(outcome.recommendation.postreatment.is_empty());
        assert_eq!(outcome.explanation, "Iron must be removed before the membranes.");
    }

    #[tokio::test]
    async fn test_recommendation_prompt_carries_context_and_summary() {
        let mut chat = MockChatModel::new();
        chat.expect_complete()
            .withf(|r| r.system == SEARCH_QUERY_SYSTEM)
            .returning(|_| Ok("Greensand filters remove iron above 0.3 mg/L".to_string()));
        chat.expect_complete()
            .withf(|r| r.system == SUMMARY_SYSTEM)
            .returning(|_| Ok("High iron.".to_string()));
        chat.expect_complete()
            .withf(|r| {
                r.system == RECOMMENDATION_SYSTEM
                    && r.user.contains("Water analysis summary:\nHigh iron.")
                    && r.user.contains("[Document 1 | category: pretreatment | relevance: 1.00]")
                    && r.temperature == 0.2
                    && r.max_tokens == Some(2000)
            })
            .times(1)
            .returning(|_| Ok(GOOD_REPLY.to_string()));

        let outcome = pipeline(chat, EmptyCatalog).run("Need drinking water", RECORD).await;

        assert!(outcome.degraded.is_empty());
    }

    #[tokio::test]
    async fn test_always_failing_model_yields_placeholder() {
        let mut chat = MockChatModel::new();
        chat.expect_complete()
            .returning(|_| Err(GenerationError::Api("503 Service Unavailable".to_string())));

        let (recommendation, explanation) =
            pipeline(chat, EmptyCatalog).process("Need drinking water", RECORD).await;

        assert!(recommendation.products().count() > 0);
        assert!(recommendation.products().all(|p| p.product_name == "Error"));
        assert!(explanation.contains("503 Service Unavailable"));
    }

    #[tokio::test]
    async fn test_stage_fallbacks_are_used() {
        let mut chat = MockChatModel::new();
        chat.expect_complete()
            .withf(|r| r.system == SEARCH_QUERY_SYSTEM)
            .returning(|_| Err(GenerationError::EmptyResponse));
        chat.expect_complete()
            .withf(|r| r.system == SUMMARY_SYSTEM)
            .returning(|_| Err(GenerationError::Api("500".to_string())));
        chat.expect_complete()
            .withf(|r| {
                r.system == RECOMMENDATION_SYSTEM && r.user.contains(&format!("summary:\n{}", RECORD))
            })
            .times(1)
            .returning(|_| Ok(GOOD_REPLY.to_string()));

        let outcome = pipeline(chat, EmptyCatalog).run("Borehole supply", RECORD).await;

        assert_eq!(outcome.search_query, "Borehole supply water treatment system design");
        assert_eq!(outcome.degraded, vec![Stage::SearchQuery, Stage::Summary]);
        assert_eq!(outcome.recommendation.ro[0].model_number, "RO-500");
    }

    #[tokio::test]
    async fn test_summary_fallback_truncates_record() {
        let long_record = format!("{{\"notes\": \"{}\"}}", "x".repeat(3000));
        let mut chat = MockChatModel::new();
        chat.expect_complete()
            .withf(|r| r.system == SEARCH_QUERY_SYSTEM)
            .returning(|_| Ok("query".to_string()));
        chat.expect_complete()
            .withf(|r| r.system == SUMMARY_SYSTEM)
            .returning(|_| Ok("   ".to_string()));
        let expected: String = long_record.chars().take(RECORD_FALLBACK_CHARS).collect();
        chat.expect_complete()
            .withf(move |r| {
                r.system == RECOMMENDATION_SYSTEM
                    && r.user.contains(&format!("summary:\n{}\n\nDocumentation", expected))
            })
            .times(1)
            .returning(|_| Ok(GOOD_REPLY.to_string()));

        let outcome = pipeline(chat, EmptyCatalog).run("q", &long_record).await;

        assert_eq!(outcome.degraded, vec![Stage::Summary]);
    }

    #[tokio::test]
    async fn test_unparseable_recommendation_is_terminal() {
        let mut chat = MockChatModel::new();
        chat.expect_complete()
            .withf(|r| r.system != RECOMMENDATION_SYSTEM)
            .returning(|_| Ok("fine".to_string()));
        chat.expect_complete()
            .withf(|r| r.system == RECOMMENDATION_SYSTEM)
            .returning(|_| Ok("I would suggest a softener and an RO unit.".to_string()));

        let outcome = pipeline(chat, EmptyCatalog).run("q", RECORD).await;

        assert_eq!(outcome.degraded, vec![Stage::Recommendation]);
        assert_eq!(outcome.recommendation, Recommendation::placeholder());
        assert!(outcome.explanation.starts_with("An error occurred"));
    }

    #[tokio::test]
    async fn test_empty_context_marker_is_not_a_failure() {
        let mut chat = MockChatModel::new();
        chat.expect_complete()
            .withf(|r| r.system == RECOMMENDATION_SYSTEM && r.user.contains(NO_DOCUMENTS_MARKER))
            .times(1)
            .returning(|_| Ok(GOOD_REPLY.to_string()));
        chat.expect_complete()
            .returning(|_| Ok("text".to_string()));

        let empty_index = RagIndex::from_parts(FlatIndex::new(16), MappingStore::default(), "none").unwrap();
        let context = ContextBuilder::new(
            Arc::new(empty_index),
            Arc::new(HashEmbedder::new(16)),
            Arc::new(WordTokenCounter::new()),
        );
        let pipeline = RecommendationPipeline::new(
            Arc::new(chat),
            context,
            Arc::new(EmptyCatalog),
            PipelineSettings::default(),
        );

        let outcome = pipeline.run("q", RECORD).await;

        assert!(outcome.degraded.is_empty());
    }

    struct SlowChat;

    #[async_trait]
    impl ChatModel for SlowChat {
        async fn complete(&self, _request: ChatRequest) -> crate::providers::Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(GOOD_REPLY.to_string())
        }
    }

    #[tokio::test]
    async fn test_stage_timeout_triggers_fallbacks() {
        let pipeline = RecommendationPipeline::new(
            Arc::new(SlowChat),
            context_builder(),
            Arc::new(EmptyCatalog),
            PipelineSettings {
                stage_timeout: Duration::from_millis(20),
                ..PipelineSettings::default()
            },
        );

        let outcome = pipeline.run("q", RECORD).await;

        assert_eq!(
            outcome.degraded,
            vec![Stage::SearchQuery, Stage::Summary, Stage::Recommendation]
        );
        assert!(outcome.explanation.contains("Timed out"));
    }

    #[tokio::test]
    async fn test_process_and_enrich() {
        let catalog = FixedCatalog(HashMap::from([
            ("GF-1054".to_string(), details("GF-1054", 980.0)),
            ("RO Unit".to_string(), details("RO-500", 4350.0)),
        ]));

        let result = pipeline(happy_chat(), catalog)
            .process_and_enrich(RECORD, "Need drinking water")
            .await;

        let pre = &result.cart.pretreatment[0];
        assert_eq!(pre.product.model_number, "GF-1054");
        assert_eq!(pre.details.as_ref().unwrap().unit_price, 980.0);

        // Model number unknown, found by product name instead
        let ro = &result.cart.ro[0];
        assert_eq!(ro.product.model_number, "RO-500");
        assert_eq!(ro.details.as_ref().unwrap().no, "RO-500");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["cart"]["RO"][0]["product_name"], "RO Unit");
        assert_eq!(json["cart"]["RO"][0]["unit_price"], 4350.0);
        assert_eq!(json["explanation"], "Iron must be removed before the membranes.");
    }

    #[tokio::test]
    async fn test_enrich_unknown_product_keeps_original_fields() {
        let result = pipeline(happy_chat(), EmptyCatalog)
            .process_and_enrich(RECORD, "Need drinking water")
            .await;

        let pre = &result.cart.pretreatment[0];
        assert!(pre.details.is_none());
        assert_eq!(pre.product.product_name, "Greensand Filter");
    }
}
