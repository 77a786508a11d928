//! Ingestion configuration

/// File extensions read as plain text
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["txt", "md", "csv", "tsv", "json"];

/// Configuration for folder ingestion
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Characters per chunk
    pub chunk_chars: usize,
    /// Number of file reader workers (Stage 2)
    pub read_workers: usize,
    /// Number of chunking workers (Stage 3)
    pub chunk_workers: usize,
    /// Channel buffer capacity
    pub channel_capacity: usize,
}

impl IngestConfig {
    /// Create a config with worker counts based on CPU count
    pub fn new(chunk_chars: usize) -> Self {
        let cpus = num_cpus::get();
        Self {
            chunk_chars,
            read_workers: cpus.max(1),
            chunk_workers: (cpus / 2).max(1),
            channel_capacity: 100,
        }
    }

    /// Create with custom worker counts
    pub fn with_workers(chunk_chars: usize, read: usize, chunk: usize) -> Self {
        Self {
            chunk_chars,
            read_workers: read.max(1),
            chunk_workers: chunk.max(1),
            channel_capacity: 100,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::new(1000)
    }
}
