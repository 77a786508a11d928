//! Ingestion stage worker implementations

use super::messages::IngestMessage;
use crate::embeddings::{Document, DocumentChunker, DEFAULT_CATEGORY};
use crossbeam_channel::{Receiver, Sender};
use std::fs;
use std::path::{Component, Path};
use std::sync::Arc;

/// Path of `path` relative to `root`, with forward slashes
pub fn source_for(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// First directory under `root` containing `path`; top-level files get the
/// default category
pub fn category_for(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut components = relative.components();

    match (components.next(), components.next()) {
        (Some(Component::Normal(dir)), Some(_)) => dir.to_string_lossy().into_owned(),
        _ => DEFAULT_CATEGORY.to_string(),
    }
}

/// Stage 2: File reader worker
///
/// Receives FileFound messages, reads each file as UTF-8 text and forwards
/// FileRead messages tagged with source and category.
pub fn read_worker(rx: Receiver<IngestMessage>, tx: Sender<IngestMessage>, root: Arc<Path>) {
    for msg in rx {
        match msg {
            IngestMessage::FileFound { order, path } => {
                let source = source_for(&root, &path);

                let result = match fs::read_to_string(&path) {
                    Ok(text) => IngestMessage::FileRead {
                        order,
                        document: Document::new(text, source)
                            .with_category(category_for(&root, &path)),
                    },
                    Err(e) => IngestMessage::Error {
                        path: source,
                        stage: "read",
                        message: e.to_string(),
                    },
                };

                if tx.send(result).is_err() {
                    break;
                }
            }
            IngestMessage::Error { .. } => {
                let _ = tx.send(msg);
            }
            _ => {}
        }
    }
}

/// Stage 3: Chunking worker
pub fn chunk_worker(
    rx: Receiver<IngestMessage>,
    tx: Sender<IngestMessage>,
    chunker: Arc<DocumentChunker>,
) {
    for msg in rx {
        match msg {
            IngestMessage::FileRead { order, document } => {
                let chunks = chunker.chunk_document(&document);
                if tx.send(IngestMessage::Chunked { order, chunks }).is_err() {
                    break;
                }
            }
            IngestMessage::Error { .. } => {
                let _ = tx.send(msg);
            }
            _ => {}
        }
    }
}
