pub mod config;
pub mod context;
pub mod credentials;
pub mod embeddings;
pub mod generator;
pub mod ingest;
pub mod parser;
pub mod providers;
pub mod recommend;
pub mod storage;

pub use config::RagConfig;
pub use context::ContextBuilder;
pub use credentials::{CredentialStore, KeyringStore, MemoryStore, Secret};
pub use embeddings::{Embedder, HashEmbedder};
pub use generator::{query_index, Generator};
pub use ingest::build_index_from_folder;
pub use providers::erp::ProductCatalog;
pub use providers::ChatModel;
pub use recommend::RecommendationPipeline;
pub use storage::{IndexPaths, RagIndex};
