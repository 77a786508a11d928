//! Flat Euclidean vector index with Parquet persistence
//!
//! Brute-force search is exact and fast enough for corpora of a few
//! thousand chunks.

use super::{new_build_id, IndexError, Result, StagedFile, BUILD_ID_KEY};
use arrow::array::{Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use ndarray::{Array2, ArrayView1, Axis};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

const MODEL_KEY: &str = "hydrorag.embedding_model";
const BUILT_AT_KEY: &str = "hydrorag.built_at";

/// One search result: index position and squared L2 distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Exact nearest-neighbor index over fixed-dimension vectors
#[derive(Debug, Clone)]
pub struct FlatIndex {
    vectors: Array2<f32>,
}

impl FlatIndex {
    /// Create an empty index of the given dimension
    pub fn new(dim: usize) -> Self {
        Self {
            vectors: Array2::zeros((0, dim)),
        }
    }

    /// Build an index from vectors that must all share `dim`
    pub fn from_vectors(dim: usize, vectors: &[Vec<f32>]) -> Result<Self> {
        let mut flat = Vec::with_capacity(vectors.len() * dim);
        for vector in vectors {
            if vector.len() != dim {
                return Err(IndexError::DimensionMismatch {
                    expected: dim,
                    actual: vector.len(),
                });
            }
            flat.extend_from_slice(vector);
        }

        let vectors = Array2::from_shape_vec((vectors.len(), dim), flat)
            .map_err(|e| IndexError::Corrupt(e.to_string()))?;
        Ok(Self { vectors })
    }

    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    /// Vector stored at `position`
    pub fn vector(&self, position: usize) -> Option<Vec<f32>> {
        (position < self.len()).then(|| self.vectors.row(position).to_vec())
    }

    /// Up to `k` nearest neighbors by ascending squared L2 distance.
    ///
    /// Positions whose distance is not finite are dropped rather than ranked.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dim() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim(),
                actual: query.len(),
            });
        }

        let query = ArrayView1::from(query);
        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(position, row)| {
                let diff = &row - &query;
                Neighbor {
                    position,
                    distance: diff.dot(&diff),
                }
            })
            .filter(|n| n.distance.is_finite())
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        neighbors.truncate(k);

        Ok(neighbors)
    }

    fn schema(dim: usize, model: &str, build_id: &str) -> Arc<Schema> {
        let mut metadata = HashMap::new();
        metadata.insert(MODEL_KEY.to_string(), model.to_string());
        metadata.insert(BUILD_ID_KEY.to_string(), build_id.to_string());
        metadata.insert(BUILT_AT_KEY.to_string(), chrono::Utc::now().to_rfc3339());

        Arc::new(
            Schema::new(vec![Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    dim as i32,
                ),
                false,
            )])
            .with_metadata(metadata),
        )
    }

    /// Persist the index, recording the embedding model that produced it
    pub fn write(&self, path: &Path, model: &str) -> Result<()> {
        self.stage(path, model, &new_build_id())?.commit()
    }

    /// Write the index next to `path` without replacing it yet
    pub(crate) fn stage(&self, path: &Path, model: &str, build_id: &str) -> Result<StagedFile> {
        let dim = self.dim();
        let schema = Self::schema(dim, model, build_id);

        let values = Float32Array::from_iter_values(self.vectors.iter().copied());
        let embedding_array = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, false)),
            dim as i32,
            Arc::new(values),
            None,
        )?;
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(embedding_array) as ArrayRef],
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

    /// Read an index written by [`FlatIndex::write`]; returns the index and
    /// the recorded embedding model name
    pub fn read(path: &Path) -> Result<(Self, String)> {
        if !path.exists() {
            return Err(IndexError::NotFound(path.to_path_buf()));
        }

        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| IndexError::Parquet(e.to_string()))?;

        let schema = builder.schema().clone();
        let model = schema
            .metadata()
            .get(MODEL_KEY)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        let dim = match schema.field_with_name("embedding").map(|f| f.data_type()) {
            Ok(DataType::FixedSizeList(_, size)) if *size > 0 => *size as usize,
            _ => {
                return Err(IndexError::Corrupt(
                    "missing fixed-size `embedding` column".to_string(),
                ))
            }
        };

        let reader = builder
            .build()
            .map_err(|e| IndexError::Parquet(e.to_string()))?;

        let mut flat: Vec<f32> = Vec::new();
        let mut rows = 0usize;

        for batch_result in reader {
            let batch = batch_result?;
            let list = batch
                .column_by_name("embedding")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
                .ok_or_else(|| IndexError::Corrupt("unreadable embedding column".to_string()))?;

            for i in 0..list.len() {
                if list.is_null(i) {
                    return Err(IndexError::Corrupt(format!("null vector at row {}", rows + i)));
                }
                let row = list.value(i);
                let floats = row
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| IndexError::Corrupt("embedding values are not f32".to_string()))?;
                flat.extend(floats.values().iter().copied());
            }
            rows += list.len();
        }

        let vectors = Array2::from_shape_vec((rows, dim), flat)
            .map_err(|e| IndexError::Corrupt(e.to_string()))?;
        Ok((Self { vectors }, model))
    }
}
