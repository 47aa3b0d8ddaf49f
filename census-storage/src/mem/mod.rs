//! In-memory storage backend.
//!
//! Tables are held as Arrow record batches split into fixed-size chunks. A
//! read yields at most one batch per stored chunk, filtered lazily as the
//! stream is pulled, and skips chunks with no matching rows. Each handle keeps
//! its own [`ReadStats`] and [`FaultInjector`].

mod dataframe;
mod dense;
mod experiment;
mod sparse;

pub use dataframe::MemDataFrame;
pub use dense::MemDenseArray;
pub use experiment::{MemExperiment, MemMeasurement};
pub use sparse::{MemSparseArray, sparse_schema};

use std::sync::Arc;

use arrow::array::{Array, Int64Array};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use census_result::{Error, Result};

use crate::instrumentation::ReadStats;
use crate::stream::BatchStream;

/// Split `batch` into slices of at most `chunk_rows` rows.
///
/// An empty batch is kept as zero chunks.
pub(crate) fn split_chunks(batch: &RecordBatch, chunk_rows: usize) -> Result<Vec<RecordBatch>> {
    if chunk_rows == 0 {
        return Err(Error::InvalidArgumentError(
            "chunk_rows must be greater than zero".into(),
        ));
    }
    let rows = batch.num_rows();
    let mut chunks = Vec::with_capacity(rows.div_ceil(chunk_rows));
    let mut offset = 0;
    while offset < rows {
        let len = chunk_rows.min(rows - offset);
        chunks.push(batch.slice(offset, len));
        offset += len;
    }
    Ok(chunks)
}

/// Borrow column `idx` of `batch` as `Int64Array`.
pub(crate) fn int64_column<'a>(batch: &'a RecordBatch, idx: usize) -> Result<&'a Int64Array> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| {
            Error::Internal(format!(
                "column {idx} is {}, expected Int64",
                batch.column(idx).data_type()
            ))
        })
}

/// Stream `select(chunk)` over every stored chunk, dropping `None` results.
pub(crate) fn chunk_stream<F>(
    schema: SchemaRef,
    chunks: Arc<Vec<RecordBatch>>,
    stats: Arc<ReadStats>,
    select: F,
) -> BatchStream
where
    F: Fn(&RecordBatch) -> Result<Option<RecordBatch>> + Send + 'static,
{
    let iter = (0..chunks.len()).filter_map(move |i| match select(&chunks[i]) {
        Ok(Some(batch)) => {
            stats.record_batch(batch.num_rows());
            Some(Ok(batch))
        }
        Ok(None) => None,
        Err(err) => Some(Err(err)),
    });
    BatchStream::new(schema, iter)
}
