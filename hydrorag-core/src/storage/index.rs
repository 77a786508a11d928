//! Index handle tying the vector index to its mapping store

use super::{new_build_id, read_build_id, FlatIndex, IndexError, IndexPaths, MappingStore, Result};
use crate::embeddings::{Chunk, Embedder};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// One retrieval result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Squared L2 distance to the query (lower is nearer)
    pub distance: f32,
}

impl SearchHit {
    /// Heuristic relevance, `1 - distance / 2`.
    ///
    /// For unit-length embeddings this equals the cosine similarity; it is
    /// not a probability and goes negative for distances above 2.
    pub fn relevance(&self) -> f32 {
        1.0 - self.distance / 2.0
    }
}

/// Summary of a loaded index
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub chunks: usize,
    pub dimension: usize,
    pub embedding_model: String,
    pub categories: BTreeMap<String, usize>,
}

/// Read-only handle over a built or loaded index.
///
/// Query-time code never mutates it, so one handle can be shared across
/// concurrent requests behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RagIndex {
    vectors: FlatIndex,
    mapping: MappingStore,
    embedding_model: String,
}

impl RagIndex {
    /// Assemble a handle from parts, enforcing positional alignment
    pub fn from_parts(
        vectors: FlatIndex,
        mapping: MappingStore,
        embedding_model: impl Into<String>,
    ) -> Result<Self> {
        if vectors.len() != mapping.len() {
            return Err(IndexError::Corrupt(format!(
                "mapping has {} rows but index has {} vectors",
                mapping.len(),
                vectors.len()
            )));
        }

        Ok(Self {
            vectors,
            mapping,
            embedding_model: embedding_model.into(),
        })
    }

    /// Embed every chunk, build a fresh flat index and persist both
    /// artifacts. Any embedding or write failure aborts the build before
    /// either existing artifact is replaced.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        batch_size: usize,
        paths: &IndexPaths,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }

        let batch_size = batch_size.max(1);
        let total_batches = chunks.len().div_ceil(batch_size);
        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());

        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            debug!(batch = batch_no + 1, total_batches, "embedded batch");
            embeddings.extend(vectors);
        }

        let dim = embeddings
            .first()
            .map(|v| v.len())
            .unwrap_or_else(|| embedder.embedding_dim());
        let vectors = FlatIndex::from_vectors(dim, &embeddings)?;
        let index = Self::from_parts(vectors, MappingStore::new(chunks), embedder.model_name())?;

        let build_id = new_build_id();
        let staged_vectors = index
            .vectors
            .stage(&paths.index_path(), &index.embedding_model, &build_id)?;
        let staged_mapping = index.mapping.stage(&paths.mapping_path(), &build_id)?;
        staged_vectors.commit()?;
        staged_mapping.commit()?;

        info!(
            chunks = index.len(),
            dimension = dim,
            dir = %paths.dir.display(),
            "index built"
        );
        Ok(index)
    }

    /// Reload an index from disk. Artifacts from different builds, or with
    /// different row counts, are rejected as corrupt.
    pub fn load(paths: &IndexPaths) -> Result<Self> {
        for path in [paths.index_path(), paths.mapping_path()] {
            if !path.exists() {
                return Err(IndexError::NotFound(path));
            }
        }

        let index_build = read_build_id(&paths.index_path())?;
        let mapping_build = read_build_id(&paths.mapping_path())?;
        if index_build != mapping_build {
            return Err(IndexError::Corrupt(format!(
                "index build {} does not match mapping build {}",
                index_build.as_deref().unwrap_or("unknown"),
                mapping_build.as_deref().unwrap_or("unknown")
            )));
        }

        let (vectors, model) = FlatIndex::read(&paths.index_path())?;
        let mapping = MappingStore::read(&paths.mapping_path())?;
        let index = Self::from_parts(vectors, mapping, model)?;

        debug!(chunks = index.len(), dimension = index.dim(), "index loaded");
        Ok(index)
    }

    /// Up to `k` chunks nearest to `query`, nearest first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let neighbors = self.vectors.search(query, k)?;

        Ok(neighbors
            .into_iter()
            .filter_map(|n| {
                self.mapping.get(n.position).map(|chunk| SearchHit {
                    chunk: chunk.clone(),
                    distance: n.distance,
                })
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.vectors.dim()
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn vectors(&self) -> &FlatIndex {
        &self.vectors
    }

    pub fn mapping(&self) -> &MappingStore {
        &self.mapping
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            chunks: self.len(),
            dimension: self.dim(),
            embedding_model: self.embedding_model.clone(),
            categories: self.mapping.category_counts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{EmbeddingError, HashEmbedder};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn chunk(text: &str, category: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            source: format!("{}.txt", category),
            category: category.to_string(),
        }
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            chunk("Greensand filters remove iron and manganese", "pretreatment"),
            chunk("Thin-film composite membranes tolerate pH 2 to 11", "ro"),
            chunk("Antiscalant dosing prevents calcium carbonate scaling", "ro"),
            chunk("UV sterilizers disinfect permeate before storage", "posttreatment"),
            chunk("Remineralization cartridges raise permeate hardness", "posttreatment"),
        ]
    }

    /// Counts calls and fails once a budget of batches is spent
    struct FlakyEmbedder {
        inner: HashEmbedder,
        calls: AtomicUsize,
        fail_after: usize,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn model_name(&self) -> &str {
            "flaky"
        }

        fn embedding_dim(&self) -> usize {
            self.inner.embedding_dim()
        }

        async fn embed_batch(&self, texts: &[&str]) -> crate::embeddings::Result<Vec<Vec<f32>>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.fail_after {
                return Err(EmbeddingError::Api("503 Service Unavailable".to_string()));
            }
            self.inner.embed_batch(texts).await
        }
    }

    #[tokio::test]
    async fn test_build_then_search_finds_each_chunk() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let embedder = HashEmbedder::new(64);

        let index = RagIndex::build(corpus(), &embedder, 2, &paths).await.unwrap();

        for original in corpus() {
            let query = embedder.embed(&original.text).await.unwrap();
            let hits = index.search(&query, 1).unwrap();
            assert_eq!(hits[0].chunk, original);
            assert!(hits[0].distance.abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn test_build_keeps_positions_aligned() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let embedder = HashEmbedder::new(32);

        let index = RagIndex::build(corpus(), &embedder, 3, &paths).await.unwrap();

        assert_eq!(index.len(), 5);
        assert_eq!(index.mapping().len(), index.vectors().len());
        for (i, c) in corpus().iter().enumerate() {
            assert_eq!(index.vectors().vector(i).unwrap(), embedder.embed_text(&c.text));
        }
    }

    #[tokio::test]
    async fn test_load_reproduces_search_results() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let embedder = HashEmbedder::new(32);

        let built = RagIndex::build(corpus(), &embedder, 10, &paths).await.unwrap();
        let loaded = RagIndex::load(&paths).unwrap();

        let query = embedder.embed("scaling in RO membranes").await.unwrap();
        assert_eq!(built.search(&query, 5).unwrap(), loaded.search(&query, 5).unwrap());
        assert_eq!(loaded.embedding_model(), HashEmbedder::MODEL_NAME);
    }

    #[tokio::test]
    async fn test_search_k3_of_5() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let embedder = HashEmbedder::new(32);
        let index = RagIndex::build(corpus(), &embedder, 10, &paths).await.unwrap();

        let query = embedder.embed("iron removal").await.unwrap();
        let hits = index.search(&query, 3).unwrap();

        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[tokio::test]
    async fn test_build_empty_corpus() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());

        let result = RagIndex::build(vec![], &HashEmbedder::new(8), 10, &paths).await;

        assert!(matches!(result, Err(IndexError::EmptyCorpus)));
        assert!(!paths.exists());
    }

    #[tokio::test]
    async fn test_build_aborts_on_embedding_failure() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let embedder = FlakyEmbedder {
            inner: HashEmbedder::new(8),
            calls: AtomicUsize::new(0),
            fail_after: 1,
        };

        let result = RagIndex::build(corpus(), &embedder, 2, &paths).await;

        assert!(matches!(result, Err(IndexError::Embedding(_))));
        assert!(!paths.index_path().exists());
        assert!(!paths.mapping_path().exists());
    }

    #[test]
    fn test_load_missing_files() {
        let dir = tempdir().unwrap();

        let result = RagIndex::load(&IndexPaths::new(dir.path()));

        assert!(matches!(result, Err(IndexError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_load_detects_row_count_mismatch() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let embedder = HashEmbedder::new(16);
        RagIndex::build(corpus(), &embedder, 10, &paths).await.unwrap();

        // Overwrite the mapping with one row fewer than the index
        let mut rows = corpus();
        rows.pop();
        MappingStore::new(rows).write(&paths.mapping_path()).unwrap();

        let result = RagIndex::load(&paths);
        assert!(matches!(result, Err(IndexError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_index() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let embedder = HashEmbedder::new(16);
        let first = vec![
            chunk("alpha one", "general"),
            chunk("bravo two", "general"),
            chunk("charlie three", "general"),
        ];
        RagIndex::build(first, &embedder, 10, &paths).await.unwrap();

        // A directory in the way makes the mapping write fail
        std::fs::create_dir(paths.mapping_path().with_extension("parquet.tmp")).unwrap();
        let second = vec![
            chunk("delta four", "general"),
            chunk("echo five", "general"),
            chunk("foxtrot six", "general"),
        ];
        let result = RagIndex::build(second, &embedder, 10, &paths).await;
        assert!(matches!(result, Err(IndexError::Io(_))));
        assert!(!paths.index_path().with_extension("parquet.tmp").exists());

        let loaded = RagIndex::load(&paths).unwrap();
        let query = embedder.embed("alpha one").await.unwrap();
        let hits = loaded.search(&query, 1).unwrap();
        assert_eq!(hits[0].chunk.text, "alpha one");
        assert!(hits[0].distance.abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_load_rejects_artifacts_from_different_builds() {
        let first_dir = tempdir().unwrap();
        let second_dir = tempdir().unwrap();
        let first = IndexPaths::new(first_dir.path());
        let second = IndexPaths::new(second_dir.path());
        let embedder = HashEmbedder::new(16);

        RagIndex::build(corpus(), &embedder, 10, &first).await.unwrap();
        let mut reversed = corpus();
        reversed.reverse();
        RagIndex::build(reversed, &embedder, 10, &second).await.unwrap();

        // Same row count, different build
        std::fs::copy(second.mapping_path(), first.mapping_path()).unwrap();

        let result = RagIndex::load(&first);
        assert!(matches!(result, Err(IndexError::Corrupt(_))));
    }

    #[test]
    fn test_relevance_heuristic() {
        let hit = SearchHit {
            chunk: chunk("x", "general"),
            distance: 0.5,
        };
        assert!((hit.relevance() - 0.75).abs() < 1e-6);

        let far = SearchHit {
            chunk: chunk("x", "general"),
            distance: 3.0,
        };
        assert!(far.relevance() < 0.0);
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let index = RagIndex::build(corpus(), &HashEmbedder::new(16), 10, &paths)
            .await
            .unwrap();

        let stats = index.stats();

        assert_eq!(stats.chunks, 5);
        assert_eq!(stats.dimension, 16);
        assert_eq!(stats.categories.get("ro"), Some(&2));
    }
}
