//! Options and result of a full query read.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use census_result::{Error, Result};
use census_storage::{SOMA_DATA, SOMA_DIM_0, SOMA_DIM_1};
use rustc_hash::FxHashMap;

use crate::indexer::AxisIndexer;

/// Row coordinate column of a positionally indexed matrix.
pub const POS_DIM_0: &str = "_dim_0";

/// Column coordinate column of a positionally indexed matrix.
pub const POS_DIM_1: &str = "_dim_1";

/// Columns to return per axis. `None` returns every column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AxisColumnNames {
    pub obs: Option<Vec<String>>,
    pub var: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub column_names: AxisColumnNames,
    /// Extra matrices to read alongside the primary one.
    pub x_layers: Vec<String>,
    /// Rewrite matrix coordinates from `soma_joinid`s to 0-based positions
    /// in the returned axis tables, and drop `soma_joinid` from those tables.
    pub use_position_indexing: bool,
}

impl ReadOptions {
    pub fn with_obs_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names.obs = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_var_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names.var = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_x_layers<I, S>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.x_layers = layers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_position_indexing(mut self, enabled: bool) -> Self {
        self.use_position_indexing = enabled;
        self
    }
}

/// Fully materialized query result.
///
/// Every matrix row refers only to identifiers present in `obs` and `var`.
#[derive(Clone, Debug)]
pub struct QueryReadResult {
    pub obs: RecordBatch,
    pub var: RecordBatch,
    /// The primary matrix.
    pub x: RecordBatch,
    /// Extra matrices by name; empty when none were requested.
    pub x_layers: FxHashMap<String, RecordBatch>,
}

/// Rewrite `soma_dim_0`/`soma_dim_1` of `x` into dense positions.
pub(crate) fn to_positional(x: &RecordBatch, indexer: &AxisIndexer) -> Result<RecordBatch> {
    let data = x
        .column_by_name(SOMA_DATA)
        .ok_or_else(|| Error::not_found(format!("matrix column '{SOMA_DATA}'")))?;
    let data_field = x.schema().field_with_name(SOMA_DATA)?.clone();

    let schema = Arc::new(Schema::new(vec![
        Field::new(POS_DIM_0, DataType::Int64, false),
        Field::new(POS_DIM_1, DataType::Int64, false),
        data_field,
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(indexer.obs_index(dim_column(x, SOMA_DIM_0)?)),
        Arc::new(indexer.var_index(dim_column(x, SOMA_DIM_1)?)),
        Arc::clone(data),
    ];
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn dim_column<'a>(x: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    x.column_by_name(name)
        .ok_or_else(|| Error::not_found(format!("matrix column '{name}'")))?
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| Error::Internal(format!("matrix column '{name}' is not Int64")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::JoinIdIndex;
    use arrow::array::Float32Array;
    use census_storage::mem::sparse_schema;

    #[test]
    fn positional_rewrite_renames_and_maps() {
        let x = RecordBatch::try_new(
            sparse_schema(DataType::Float32),
            vec![
                Arc::new(Int64Array::from(vec![20, 10])),
                Arc::new(Int64Array::from(vec![2, 1])),
                Arc::new(Float32Array::from(vec![7.0, 5.0])),
            ],
        )
        .unwrap();
        let indexer = AxisIndexer::new(
            Arc::new(JoinIdIndex::new(&Int64Array::from(vec![10, 20, 30]))),
            Arc::new(JoinIdIndex::new(&Int64Array::from(vec![1, 2]))),
        );
        let out = to_positional(&x, &indexer).unwrap();
        let names: Vec<_> = out.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec![POS_DIM_0, POS_DIM_1, SOMA_DATA]);
        let d0 = out.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        let d1 = out.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(d0.values().to_vec(), vec![1, 0]);
        assert_eq!(d1.values().to_vec(), vec![1, 0]);
    }

    #[test]
    fn options_builders() {
        let opts = ReadOptions::default()
            .with_obs_columns(["tissue"])
            .with_x_layers(["normalized"])
            .with_position_indexing(true);
        assert_eq!(opts.column_names.obs, Some(vec!["tissue".to_string()]));
        assert_eq!(opts.column_names.var, None);
        assert_eq!(opts.x_layers, vec!["normalized".to_string()]);
        assert!(opts.use_position_indexing);
    }
}
