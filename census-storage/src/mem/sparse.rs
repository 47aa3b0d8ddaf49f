use std::sync::Arc;

use arrow::array::{ArrayRef, Float32Array, Int64Array};
use arrow::compute::filter_record_batch;
use arrow::compute::kernels::boolean::and;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use census_result::{Error, Result};

use super::{chunk_stream, int64_column, split_chunks};
use crate::constants::{SOMA_DATA, SOMA_DIM_0, SOMA_DIM_1};
use crate::coords::{CoordsMatcher, MatrixCoords};
use crate::instrumentation::{FaultInjector, ReadStats};
use crate::stream::BatchStream;
use crate::traits::SparseNDArray;

/// Schema of a sparse matrix whose values are `value_type`.
pub fn sparse_schema(value_type: DataType) -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(SOMA_DIM_0, DataType::Int64, false),
        Field::new(SOMA_DIM_1, DataType::Int64, false),
        Field::new(SOMA_DATA, value_type, false),
    ]))
}

/// In-memory sparse matrix of stored `(obs id, var id, value)` cells.
pub struct MemSparseArray {
    name: String,
    shape: (u64, u64),
    schema: SchemaRef,
    chunks: Arc<Vec<RecordBatch>>,
    stats: Arc<ReadStats>,
    faults: FaultInjector,
}

impl MemSparseArray {
    /// Build a `Float32` matrix from cells, stored in the order given.
    pub fn from_triplets(
        name: impl Into<String>,
        shape: (u64, u64),
        cells: &[(i64, i64, f32)],
        chunk_rows: usize,
    ) -> Result<Self> {
        let schema = sparse_schema(DataType::Float32);
        let columns: Vec<ArrayRef> = vec![
            Arc::new(cells.iter().map(|c| c.0).collect::<Int64Array>()),
            Arc::new(cells.iter().map(|c| c.1).collect::<Int64Array>()),
            Arc::new(cells.iter().map(|c| c.2).collect::<Float32Array>()),
        ];
        let batch = RecordBatch::try_new(Arc::clone(&schema), columns)?;
        let chunks = split_chunks(&batch, chunk_rows)?;
        Ok(Self::from_parts(name.into(), shape, schema, chunks))
    }

    /// Build from pre-chunked batches. The first two columns must be the
    /// Int64 `soma_dim_0` and `soma_dim_1` coordinates.
    pub fn try_from_batches(
        name: impl Into<String>,
        shape: (u64, u64),
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<Self> {
        let name = name.into();
        for (idx, dim) in [SOMA_DIM_0, SOMA_DIM_1].into_iter().enumerate() {
            let ok = schema
                .fields()
                .get(idx)
                .is_some_and(|f| f.name() == dim && f.data_type() == &DataType::Int64);
            if !ok {
                return Err(Error::ValidationError(format!(
                    "sparse array '{name}': column {idx} must be Int64 {dim}"
                )));
            }
        }
        if let Some(bad) = batches.iter().find(|b| b.schema() != schema) {
            return Err(Error::ValidationError(format!(
                "sparse array '{name}': batch schema {:?} differs from {:?}",
                bad.schema(),
                schema
            )));
        }
        let batches = batches.into_iter().filter(|b| b.num_rows() > 0).collect();
        Ok(Self::from_parts(name, shape, schema, batches))
    }

    fn from_parts(
        name: String,
        shape: (u64, u64),
        schema: SchemaRef,
        chunks: Vec<RecordBatch>,
    ) -> Self {
        Self {
            name,
            shape,
            schema,
            chunks: Arc::new(chunks),
            stats: Arc::new(ReadStats::default()),
            faults: FaultInjector::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nnz(&self) -> usize {
        self.chunks.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn stats(&self) -> &ReadStats {
        &self.stats
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }
}

impl SparseNDArray for MemSparseArray {
    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    fn shape(&self) -> (u64, u64) {
        self.shape
    }

    fn read(&self, coords: &MatrixCoords) -> Result<BatchStream> {
        self.faults.check(&self.name)?;
        self.stats.record_read();
        if coords.obs.is_empty_selection() || coords.var.is_empty_selection() {
            return Ok(BatchStream::empty(self.schema()));
        }

        let obs = coords.obs.matcher();
        let var = coords.var.matcher();
        tracing::trace!(array = %self.name, chunks = self.chunks.len(), "sparse read");
        let select = move |chunk: &RecordBatch| {
            let kept = match (&obs, &var) {
                (CoordsMatcher::All, CoordsMatcher::All) => chunk.clone(),
                _ => {
                    let mask = and(
                        &obs.mask(int64_column(chunk, 0)?),
                        &var.mask(int64_column(chunk, 1)?),
                    )?;
                    filter_record_batch(chunk, &mask)?
                }
            };
            Ok((kept.num_rows() > 0).then_some(kept))
        };
        Ok(chunk_stream(
            self.schema(),
            Arc::clone(&self.chunks),
            Arc::clone(&self.stats),
            select,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::AxisCoords;

    fn cells(batch: &RecordBatch) -> Vec<(i64, i64)> {
        let d0 = int64_column(batch, 0).unwrap();
        let d1 = int64_column(batch, 1).unwrap();
        d0.values().iter().copied().zip(d1.values().iter().copied()).collect()
    }

    #[test]
    fn cross_product_selection() {
        let x = MemSparseArray::from_triplets(
            "raw",
            (100, 10),
            &[(10, 1, 5.0), (20, 2, 7.0), (99, 1, 1.0), (10, 2, 3.0)],
            2,
        )
        .unwrap();
        let coords = MatrixCoords::new(AxisCoords::points([10, 20]), AxisCoords::points([1]));
        let out = x.read(&coords).unwrap().concat().unwrap();
        assert_eq!(cells(&out), vec![(10, 1)]);
    }

    #[test]
    fn empty_axis_short_circuits_without_batches() {
        let x = MemSparseArray::from_triplets("raw", (4, 4), &[(0, 0, 1.0)], 8).unwrap();
        let coords = MatrixCoords::new(AxisCoords::points(Vec::new()), AxisCoords::All);
        assert_eq!(x.read(&coords).unwrap().count(), 0);
        assert_eq!(x.stats().snapshot().batches, 0);
    }

    #[test]
    fn rejects_batches_without_coordinate_columns() {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Float32, false)]));
        assert!(matches!(
            MemSparseArray::try_from_batches("raw", (1, 1), schema, Vec::new()),
            Err(Error::ValidationError(_))
        ));
    }
}
