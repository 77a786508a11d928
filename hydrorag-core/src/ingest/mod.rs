//! Parallel folder ingestion
//!
//! Three-stage pipeline with crossbeam channels:
//! 1. Walk Stage - list supported files in sorted order
//! 2. Read Stage - read files and tag source and category
//! 3. Chunk Stage - split documents into fixed windows
//!
//! Chunks are reassembled in walk order, so the resulting index layout
//! does not depend on worker scheduling.

pub mod config;
pub mod messages;
pub mod stages;

pub use config::{IngestConfig, SUPPORTED_EXTENSIONS};
pub use messages::IngestMessage;

use crate::embeddings::{Chunk, DocumentChunker, Embedder};
use crate::storage::{IndexError, IndexPaths, RagIndex};
use crossbeam_channel::bounded;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Thread join error")]
    ThreadJoin,
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// Result of reading a folder
#[derive(Debug, Default)]
pub struct IngestReport {
    pub files_read: usize,
    pub chunks: Vec<Chunk>,
    pub errors: Vec<String>,
}

/// Reads a folder into chunks using a pool of worker threads
pub struct FolderIngestor {
    config: IngestConfig,
}

impl FolderIngestor {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    /// Supported files under `root`, recursively, sorted by path. Symlinked
    /// directories are not followed.
    pub fn discover(root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(IngestError::NotADirectory(root.to_path_buf()));
        }

        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_symlink() && path.is_dir() {
                    debug!(path = %path.display(), "not following symlinked directory");
                } else if is_supported(&path) {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Read and chunk every supported file under `root`
    pub fn run(&self, root: &Path) -> Result<IngestReport> {
        let files = Self::discover(root)?;
        let mut report = IngestReport::default();

        if files.is_empty() {
            return Ok(report);
        }

        let (walk_tx, walk_rx) = bounded::<IngestMessage>(self.config.channel_capacity);
        let (read_tx, read_rx) = bounded::<IngestMessage>(self.config.channel_capacity);
        let (chunk_tx, chunk_rx) = bounded::<IngestMessage>(self.config.channel_capacity);

        let root: Arc<Path> = Arc::from(root);
        let chunker = Arc::new(DocumentChunker::with_chunk_chars(self.config.chunk_chars));
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        // Stage 1: feed paths, closing the channel when done
        handles.push(thread::spawn(move || {
            for (order, path) in files.into_iter().enumerate() {
                if walk_tx.send(IngestMessage::FileFound { order, path }).is_err() {
                    break;
                }
            }
        }));

        // Stage 2: readers
        for _ in 0..self.config.read_workers {
            let rx = walk_rx.clone();
            let tx = read_tx.clone();
            let root = root.clone();
            handles.push(thread::spawn(move || stages::read_worker(rx, tx, root)));
        }
        drop(walk_rx);
        drop(read_tx);

        // Stage 3: chunkers
        for _ in 0..self.config.chunk_workers {
            let rx = read_rx.clone();
            let tx = chunk_tx.clone();
            let chunker = chunker.clone();
            handles.push(thread::spawn(move || stages::chunk_worker(rx, tx, chunker)));
        }
        drop(read_rx);
        drop(chunk_tx);

        let mut per_file: Vec<(usize, Vec<Chunk>)> = Vec::new();
        for msg in chunk_rx {
            match msg {
                IngestMessage::Chunked { order, chunks } => {
                    report.files_read += 1;
                    per_file.push((order, chunks));
                }
                IngestMessage::Error {
                    path,
                    stage,
                    message,
                } => {
                    warn!(path = %path, stage, error = %message, "skipping file");
                    report.errors.push(format!("{}: {}", path, message));
                }
                _ => {}
            }
        }

        for handle in handles {
            handle.join().map_err(|_| IngestError::ThreadJoin)?;
        }

        per_file.sort_by_key(|(order, _)| *order);
        report.chunks = per_file.into_iter().flat_map(|(_, chunks)| chunks).collect();

        Ok(report)
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Chunk every supported file under `folder`, embed the chunks and write
/// the index artifacts to `paths`
pub async fn build_index_from_folder(
    folder: &Path,
    config: IngestConfig,
    embedder: &dyn Embedder,
    batch_size: usize,
    paths: &IndexPaths,
) -> Result<(RagIndex, IngestReport)> {
    let root = folder.to_path_buf();
    let mut report = tokio::task::spawn_blocking(move || FolderIngestor::new(config).run(&root))
        .await
        .map_err(|_| IngestError::ThreadJoin)??;

    info!(
        files = report.files_read,
        skipped = report.errors.len(),
        chunks = report.chunks.len(),
        "folder read"
    );

    let chunks = std::mem::take(&mut report.chunks);
    let index = RagIndex::build(chunks, embedder, batch_size, paths).await?;

    Ok((index, report))
}
