//! Parquet mapping store
//!
//! Row `i` holds the chunk text, source locator and category of vector `i`
//! in the flat index.

use super::{new_build_id, IndexError, Result, StagedFile, BUILD_ID_KEY};
use crate::embeddings::{Chunk, DEFAULT_CATEGORY};
use arrow::array::{Array, ArrayRef, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Positional record of the chunks behind an index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingStore {
    rows: Vec<Chunk>,
}

impl MappingStore {
    pub fn new(rows: Vec<Chunk>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Chunk at `position`, if the position is mapped
    pub fn get(&self, position: usize) -> Option<&Chunk> {
        self.rows.get(position)
    }

    pub fn rows(&self) -> &[Chunk] {
        &self.rows
    }

    /// Number of chunks per category, sorted by category name
    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.category.clone()).or_insert(0) += 1;
        }
        counts
    }

    fn schema(build_id: &str) -> Arc<Schema> {
        let metadata = HashMap::from([(BUILD_ID_KEY.to_string(), build_id.to_string())]);

        Arc::new(
            Schema::new(vec![
                Field::new("chunk", DataType::Utf8, false),
                Field::new("source", DataType::Utf8, false),
                Field::new("category", DataType::Utf8, true),
            ])
            .with_metadata(metadata),
        )
    }

    /// Write the mapping to a parquet file
    pub fn write(&self, path: &Path) -> Result<()> {
        self.stage(path, &new_build_id())?.commit()
    }

    /// Write the mapping next to `path` without replacing it yet
    pub(crate) fn stage(&self, path: &Path, build_id: &str) -> Result<StagedFile> {
        let schema = Self::schema(build_id);

        let chunks: Vec<&str> = self.rows.iter().map(|r| r.text.as_str()).collect();
        let sources: Vec<&str> = self.rows.iter().map(|r| r.source.as_str()).collect();
        let categories: Vec<&str> = self.rows.iter().map(|r| r.category.as_str()).collect();

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(chunks)) as ArrayRef,
                Arc::new(StringArray::from(sources)) as ArrayRef,
                Arc::new(StringArray::from(categories)) as ArrayRef,
            ],
        )?;

        StagedFile::write(path, |file| {
            let props = WriterProperties::builder()
                .set_compression(Compression::ZSTD(Default::default()))
                .build();

            let mut writer = ArrowWriter::try_new(file, schema, Some(props))
                .map_err(|e| IndexError::Parquet(e.to_string()))?;
            writer
                .write(&batch)
                .map_err(|e| IndexError::Parquet(e.to_string()))?;
            writer
                .close()
                .map_err(|e| IndexError::Parquet(e.to_string()))?;
            Ok(())
        })
    }

    /// Read a mapping file. A missing `category` column (or a null value in
    /// it) reads as the default category.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IndexError::NotFound(path.to_path_buf()));
        }

        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| IndexError::Parquet(e.to_string()))?;
        let reader = builder
            .build()
            .map_err(|e| IndexError::Parquet(e.to_string()))?;

        let mut rows = Vec::new();

        for batch_result in reader {
            let batch = batch_result?;

            let chunks = batch
                .column_by_name("chunk")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| IndexError::Corrupt("mapping has no `chunk` column".to_string()))?;
            let sources = batch
                .column_by_name("source")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| IndexError::Corrupt("mapping has no `source` column".to_string()))?;
            let categories = batch
                .column_by_name("category")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>());

            for i in 0..batch.num_rows() {
                let category = categories
                    .and_then(|a| if a.is_null(i) { None } else { Some(a.value(i)) })
                    .unwrap_or(DEFAULT_CATEGORY);

                rows.push(Chunk {
                    text: chunks.value(i).to_string(),
                    source: if sources.is_null(i) {
                        String::new()
                    } else {
                        sources.value(i).to_string()
                    },
                    category: category.to_string(),
                });
            }
        }

        Ok(Self { rows })
    }
}
