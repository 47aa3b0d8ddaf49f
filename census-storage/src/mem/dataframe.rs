use std::sync::Arc;

use arrow::compute::filter_record_batch;
use arrow::compute::kernels::boolean::and_kleene;
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;
use census_expr::{ValueFilter, evaluate};
use census_result::{Error, Result};

use super::{chunk_stream, int64_column, split_chunks};
use crate::constants::{DEFAULT_CHUNK_ROWS, SOMA_JOINID};
use crate::coords::AxisCoords;
use crate::instrumentation::{FaultInjector, ReadStats};
use crate::stream::BatchStream;
use crate::traits::DataFrame;

/// In-memory axis dataframe.
pub struct MemDataFrame {
    name: String,
    schema: SchemaRef,
    joinid_idx: usize,
    chunks: Arc<Vec<RecordBatch>>,
    stats: Arc<ReadStats>,
    faults: FaultInjector,
}

impl MemDataFrame {
    /// Wrap `batch`, which must carry an Int64 `soma_joinid` column.
    pub fn try_new(name: impl Into<String>, batch: RecordBatch) -> Result<Self> {
        Self::with_chunk_rows(name, batch, DEFAULT_CHUNK_ROWS)
    }

    pub fn with_chunk_rows(
        name: impl Into<String>,
        batch: RecordBatch,
        chunk_rows: usize,
    ) -> Result<Self> {
        let name = name.into();
        let schema = batch.schema();
        let joinid_idx = schema.index_of(SOMA_JOINID).map_err(|_| {
            Error::ValidationError(format!("dataframe '{name}' has no {SOMA_JOINID} column"))
        })?;
        if schema.field(joinid_idx).data_type() != &DataType::Int64 {
            return Err(Error::ValidationError(format!(
                "dataframe '{name}': {SOMA_JOINID} must be Int64, found {}",
                schema.field(joinid_idx).data_type()
            )));
        }
        let chunks = split_chunks(&batch, chunk_rows)?;
        tracing::trace!(
            dataframe = %name,
            rows = batch.num_rows(),
            chunks = chunks.len(),
            "built in-memory dataframe"
        );
        Ok(Self {
            name,
            schema,
            joinid_idx,
            chunks: Arc::new(chunks),
            stats: Arc::new(ReadStats::default()),
            faults: FaultInjector::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_rows(&self) -> usize {
        self.chunks.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn stats(&self) -> &ReadStats {
        &self.stats
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    fn projection(&self, column_names: Option<&[String]>) -> Result<Vec<usize>> {
        match column_names {
            None => Ok((0..self.schema.fields().len()).collect()),
            Some(names) => names
                .iter()
                .map(|col| {
                    self.schema.index_of(col).map_err(|_| {
                        Error::not_found(format!("column '{col}' in dataframe '{}'", self.name))
                    })
                })
                .collect(),
        }
    }
}

impl DataFrame for MemDataFrame {
    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    fn read(
        &self,
        coords: &AxisCoords,
        value_filter: Option<&ValueFilter>,
        column_names: Option<&[String]>,
    ) -> Result<BatchStream> {
        self.faults.check(&self.name)?;
        self.stats.record_read();

        let indices = self.projection(column_names)?;
        if let Some(filter) = value_filter {
            for col in filter.columns() {
                if self.schema.index_of(&col).is_err() {
                    return Err(Error::not_found(format!(
                        "value filter column '{col}' in dataframe '{}'",
                        self.name
                    )));
                }
            }
        }
        let out_schema = Arc::new(self.schema.project(&indices)?);
        if coords.is_empty_selection() {
            return Ok(BatchStream::empty(out_schema));
        }

        tracing::trace!(
            dataframe = %self.name,
            ?coords,
            filter = ?value_filter.map(ValueFilter::source),
            "dataframe read"
        );
        let matcher = coords.matcher();
        let filter = value_filter.cloned();
        let joinid_idx = self.joinid_idx;
        let select = move |chunk: &RecordBatch| {
            let mut mask = matcher.mask(int64_column(chunk, joinid_idx)?);
            if let Some(filter) = &filter {
                mask = and_kleene(&mask, &evaluate(filter.expr(), chunk)?)?;
            }
            let kept = filter_record_batch(chunk, &mask)?;
            if kept.num_rows() == 0 {
                return Ok(None);
            }
            Ok(Some(kept.project(&indices)?))
        };
        Ok(chunk_stream(
            out_schema,
            Arc::clone(&self.chunks),
            Arc::clone(&self.stats),
            select,
        ))
    }
}
