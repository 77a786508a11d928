pub mod ask;
pub mod auth;
pub mod build;
pub mod query;
pub mod recommend;
pub mod stats;

use anyhow::Context;
use hydrorag_core::config::RagConfig;
use hydrorag_core::context::{ContextBuilder, HfTokenCounter, TokenCounter, WordTokenCounter};
use hydrorag_core::credentials::{default_store, resolve_secret, CredentialStore, Secret};
use hydrorag_core::embeddings::{Embedder, HashEmbedder};
use hydrorag_core::providers::erp::{BusinessCentralClient, EmptyCatalog, ProductCatalog};
use hydrorag_core::providers::openai::{OpenAiChatModel, OpenAiEmbedder};
use hydrorag_core::providers::ChatModel;
use hydrorag_core::storage::{IndexPaths, RagIndex};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Data directory, loaded config and secret sources shared by commands
pub struct Workspace {
    pub data_dir: PathBuf,
    pub config: RagConfig,
    env: HashMap<String, String>,
    store: Arc<dyn CredentialStore>,
}

impl Workspace {
    pub fn open(data_dir: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;

        let env: HashMap<String, String> = std::env::vars().collect();
        let config = RagConfig::load_with_env(&data_dir, &env)?;

        Ok(Self {
            data_dir,
            config,
            env,
            store: default_store(),
        })
    }

    pub fn credentials(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    pub fn index_paths(&self) -> IndexPaths {
        RagConfig::index_paths(&self.data_dir)
    }

    pub fn load_index(&self) -> anyhow::Result<Arc<RagIndex>> {
        let paths = self.index_paths();
        let index = RagIndex::load(&paths).with_context(|| {
            format!(
                "no usable index in {}; run `hydrorag build <folder>` first",
                paths.dir.display()
            )
        })?;
        Ok(Arc::new(index))
    }

    fn openai_api_key(&self) -> anyhow::Result<String> {
        resolve_secret(Secret::OpenAiApiKey, &self.env, self.store.as_ref()).ok_or_else(|| {
            anyhow::anyhow!("no OpenAI API key; set OPENAI_API_KEY or run `hydrorag auth openai`")
        })
    }

    /// Embedder for building a new index
    pub fn build_embedder(&self, offline: bool) -> anyhow::Result<Arc<dyn Embedder>> {
        if offline {
            return Ok(Arc::new(HashEmbedder::new(self.config.embedding_dim)));
        }

        let embedder = OpenAiEmbedder::new(
            self.openai_api_key()?,
            &self.config.openai_base_url,
            &self.config.embedding_model,
            self.config.embedding_dim,
        )?;
        Ok(Arc::new(embedder))
    }

    /// Embedder matching the model an index was built with
    pub fn query_embedder(&self, index: &RagIndex) -> anyhow::Result<Arc<dyn Embedder>> {
        if index.embedding_model() == HashEmbedder::MODEL_NAME {
            return Ok(Arc::new(HashEmbedder::new(index.dim())));
        }

        if index.embedding_model() != self.config.embedding_model {
            warn!(
                index_model = index.embedding_model(),
                configured = %self.config.embedding_model,
                "index was built with a different embedding model; querying with the index's model"
            );
        }

        let embedder = OpenAiEmbedder::new(
            self.openai_api_key()?,
            &self.config.openai_base_url,
            index.embedding_model(),
            index.dim(),
        )?;
        Ok(Arc::new(embedder))
    }

    pub fn chat_model(&self) -> anyhow::Result<Arc<dyn ChatModel>> {
        let chat = OpenAiChatModel::new(
            self.openai_api_key()?,
            &self.config.openai_base_url,
            &self.config.chat_model,
        )?;
        Ok(Arc::new(chat))
    }

    pub fn token_counter(&self) -> anyhow::Result<Arc<dyn TokenCounter>> {
        match &self.config.tokenizer_path {
            Some(path) => Ok(Arc::new(HfTokenCounter::from_file(path)?)),
            None => Ok(Arc::new(WordTokenCounter::new())),
        }
    }

    pub fn context_builder(&self, index: Arc<RagIndex>) -> anyhow::Result<ContextBuilder> {
        let embedder = self.query_embedder(&index)?;
        Ok(ContextBuilder::new(index, embedder, self.token_counter()?))
    }

    /// Business Central catalog when fully configured, otherwise one that
    /// knows no products
    pub fn catalog(&self) -> anyhow::Result<Arc<dyn ProductCatalog>> {
        let password = resolve_secret(Secret::ErpPassword, &self.env, self.store.as_ref());

        match (&self.config.erp_base_url, &self.config.erp_username, password) {
            (Some(url), Some(user), Some(password)) => {
                Ok(Arc::new(BusinessCentralClient::new(url, user, password)?))
            }
            (Some(_), _, _) => {
                warn!("ERP base URL set without username or password; products will not be enriched");
                Ok(Arc::new(EmptyCatalog))
            }
            _ => {
                info!("no ERP configured; products will not be enriched");
                Ok(Arc::new(EmptyCatalog))
            }
        }
    }
}
