use std::fmt;

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use census_result::Result;

type BatchIter = Box<dyn Iterator<Item = Result<RecordBatch>> + Send>;

/// Lazy, finite, non-restartable sequence of record batches produced by a
/// storage read. Every batch shares [`BatchStream::schema`].
pub struct BatchStream {
    schema: SchemaRef,
    batches: BatchIter,
}

impl BatchStream {
    pub fn new<I>(schema: SchemaRef, batches: I) -> Self
    where
        I: Iterator<Item = Result<RecordBatch>> + Send + 'static,
    {
        Self {
            schema,
            batches: Box::new(batches),
        }
    }

    /// A stream that yields nothing.
    pub fn empty(schema: SchemaRef) -> Self {
        Self::new(schema, std::iter::empty())
    }

    pub fn from_batches(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self::new(schema, batches.into_iter().map(Ok))
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Drain the stream into a single batch. An exhausted or empty stream
    /// produces a zero-row batch with the stream's schema.
    pub fn concat(self) -> Result<RecordBatch> {
        let schema = self.schema;
        let batches = self.batches.collect::<Result<Vec<_>>>()?;
        Ok(concat_batches(&schema, &batches)?)
    }
}

impl Iterator for BatchStream {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.batches.next()
    }
}

impl fmt::Debug for BatchStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchStream")
            .field("schema", &self.schema)
            .field("batches", &"<iterator>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Field::new("soma_joinid", DataType::Int64, false)]))
    }

    #[test]
    fn concat_of_empty_stream_keeps_schema() {
        let out = BatchStream::empty(schema()).concat().unwrap();
        assert_eq!(out.num_rows(), 0);
        assert_eq!(out.schema(), schema());
    }

    #[test]
    fn concat_joins_batches_in_order() {
        let make = |ids: Vec<i64>| {
            RecordBatch::try_new(schema(), vec![Arc::new(Int64Array::from(ids))]).unwrap()
        };
        let stream = BatchStream::from_batches(schema(), vec![make(vec![1, 2]), make(vec![3])]);
        let out = stream.concat().unwrap();
        let ids = out.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ids.values().to_vec(), vec![1, 2, 3]);
    }
}
