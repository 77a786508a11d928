//! Runtime configuration
//!
//! Defaults, overlaid by `<data_dir>/hydrorag.toml` when present, then by
//! environment variables.

use crate::context::{DEFAULT_TOKEN_BUDGET, DEFAULT_TOP_K};
use crate::generator::DEFAULT_ANSWER_TEMPERATURE;
use crate::ingest::IngestConfig;
use crate::providers::openai::DEFAULT_BASE_URL;
use crate::recommend::PipelineSettings;
use crate::storage::IndexPaths;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE: &str = "hydrorag.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("No data directory available on this platform")]
    NoDataDir,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub chunk_size: usize,
    pub embed_batch_size: usize,
    pub top_k: usize,
    pub token_budget: usize,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub chat_model: String,
    pub answer_temperature: f32,
    pub recommendation_temperature: f32,
    pub max_tokens: u32,
    pub stage_timeout_secs: u64,
    pub openai_base_url: String,
    /// `tokenizer.json` used for context budgets; word counting when unset
    pub tokenizer_path: Option<PathBuf>,
    pub erp_base_url: Option<String>,
    pub erp_username: Option<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            embed_batch_size: 10,
            top_k: DEFAULT_TOP_K,
            token_budget: DEFAULT_TOKEN_BUDGET,
            embedding_model: "text-embedding-ada-002".to_string(),
            embedding_dim: 1536,
            chat_model: "gpt-3.5-turbo".to_string(),
            answer_temperature: DEFAULT_ANSWER_TEMPERATURE,
            recommendation_temperature: 0.2,
            max_tokens: 2000,
            stage_timeout_secs: 60,
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            tokenizer_path: None,
            erp_base_url: None,
            erp_username: None,
        }
    }
}

impl RagConfig {
    /// Load from `data_dir` using the process environment
    pub fn load(data_dir: &Path) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_with_env(data_dir, &env)
    }

    pub fn load_with_env(data_dir: &Path, env: &HashMap<String, String>) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            Self::default()
        };

        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, env: &HashMap<String, String>) {
        let get = |key: &str| env.get(key).filter(|v| !v.trim().is_empty()).cloned();

        if let Some(url) = get("OPENAI_BASE_URL") {
            self.openai_base_url = url;
        }
        if let Some(url) = get("ERP_BASE_URL") {
            self.erp_base_url = Some(url);
        }
        if let Some(user) = get("ERP_USERNAME") {
            self.erp_username = Some(user);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".into()));
        }
        if self.embed_batch_size == 0 {
            return Err(ConfigError::Invalid("embed_batch_size must be positive".into()));
        }
        if self.embedding_dim == 0 {
            return Err(ConfigError::Invalid("embedding_dim must be positive".into()));
        }
        if self.stage_timeout_secs == 0 {
            return Err(ConfigError::Invalid("stage_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig::new(self.chunk_size)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            top_k: self.top_k,
            token_budget: self.token_budget,
            temperature: self.recommendation_temperature,
            max_tokens: self.max_tokens,
            stage_timeout: self.stage_timeout(),
        }
    }

    pub fn index_paths(data_dir: &Path) -> IndexPaths {
        IndexPaths::new(data_dir.join("index"))
    }
}

/// `dirs::data_dir()/hydrorag`
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("hydrorag"))
        .ok_or(ConfigError::NoDataDir)
}
