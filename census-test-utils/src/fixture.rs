//! Synthetic experiments backed by the in-memory storage backend.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use census_result::Result;
use census_storage::SOMA_JOINID;
use census_storage::mem::{
    MemDataFrame, MemDenseArray, MemExperiment, MemMeasurement, MemSparseArray,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TISSUES: [&str; 4] = ["lung", "brain", "liver", "blood"];

/// Builder for a deterministic synthetic experiment.
///
/// `obs` carries `soma_joinid`, `tissue` (cycling over four values),
/// `n_genes` (random) and `is_primary`. `var` carries `soma_joinid`,
/// `feature_name` (`gene-<id>`) and `feature_length`. Every sparse layer
/// holds roughly `density * n_obs * n_var` random cells.
#[derive(Clone, Debug)]
pub struct ExperimentFixture {
    n_obs: usize,
    n_var: usize,
    density: f64,
    seed: u64,
    chunk_rows: usize,
    measurement: String,
    sparse_layers: Vec<String>,
    dense_layers: Vec<String>,
}

impl ExperimentFixture {
    pub fn new(n_obs: usize, n_var: usize) -> Self {
        Self {
            n_obs,
            n_var,
            density: 0.2,
            seed: 42,
            chunk_rows: 64,
            measurement: "RNA".to_string(),
            sparse_layers: vec!["raw".to_string()],
            dense_layers: Vec::new(),
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn density(mut self, density: f64) -> Self {
        self.density = density.clamp(0.0, 1.0);
        self
    }

    /// Rows per stored chunk for every table and matrix.
    pub fn chunk_rows(mut self, chunk_rows: usize) -> Self {
        self.chunk_rows = chunk_rows;
        self
    }

    pub fn measurement_name(mut self, name: impl Into<String>) -> Self {
        self.measurement = name.into();
        self
    }

    pub fn with_layer(mut self, name: impl Into<String>) -> Self {
        self.sparse_layers.push(name.into());
        self
    }

    pub fn with_dense_layer(mut self, name: impl Into<String>) -> Self {
        self.dense_layers.push(name.into());
        self
    }

    pub fn build(&self) -> Result<MemExperiment> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let obs = MemDataFrame::with_chunk_rows("obs", self.obs_batch(&mut rng)?, self.chunk_rows)?;
        let var = MemDataFrame::with_chunk_rows("var", self.var_batch(&mut rng)?, self.chunk_rows)?;

        let shape = (self.n_obs as u64, self.n_var as u64);
        let mut measurement = MemMeasurement::new(var);
        for name in &self.sparse_layers {
            let cells = self.cells(&mut rng);
            let x = MemSparseArray::from_triplets(name.clone(), shape, &cells, self.chunk_rows)?;
            measurement = measurement.with_sparse(name.clone(), x);
        }
        for name in &self.dense_layers {
            measurement = measurement.with_dense(name.clone(), MemDenseArray::new(shape));
        }
        Ok(MemExperiment::new(obs).with_measurement(self.measurement.clone(), measurement))
    }

    fn obs_batch(&self, rng: &mut StdRng) -> Result<RecordBatch> {
        let schema = Arc::new(Schema::new(vec![
            Field::new(SOMA_JOINID, DataType::Int64, false),
            Field::new("tissue", DataType::Utf8, false),
            Field::new("n_genes", DataType::Int64, false),
            Field::new("is_primary", DataType::Boolean, false),
        ]));
        let n = self.n_obs as i64;
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from_iter_values(0..n)),
            Arc::new(StringArray::from_iter_values(
                (0..self.n_obs).map(|i| TISSUES[i % TISSUES.len()]),
            )),
            Arc::new(Int64Array::from_iter_values(
                (0..n).map(|_| rng.gen_range(0..5_000)),
            )),
            Arc::new(BooleanArray::from(
                (0..self.n_obs).map(|_| rng.gen_bool(0.5)).collect::<Vec<_>>(),
            )),
        ];
        Ok(RecordBatch::try_new(schema, columns)?)
    }

    fn var_batch(&self, rng: &mut StdRng) -> Result<RecordBatch> {
        let schema = Arc::new(Schema::new(vec![
            Field::new(SOMA_JOINID, DataType::Int64, false),
            Field::new("feature_name", DataType::Utf8, false),
            Field::new("feature_length", DataType::Int64, false),
        ]));
        let n = self.n_var as i64;
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from_iter_values(0..n)),
            Arc::new(StringArray::from_iter_values(
                (0..n).map(|i| format!("gene-{i}")),
            )),
            Arc::new(Int64Array::from_iter_values(
                (0..n).map(|_| rng.gen_range(100..20_000)),
            )),
        ];
        Ok(RecordBatch::try_new(schema, columns)?)
    }

    fn cells(&self, rng: &mut StdRng) -> Vec<(i64, i64, f32)> {
        let mut cells = Vec::new();
        for o in 0..self.n_obs as i64 {
            for v in 0..self.n_var as i64 {
                if rng.gen_bool(self.density) {
                    cells.push((o, v, rng.gen_range(1..100) as f32));
                }
            }
        }
        cells
    }
}

/// A dataframe with the given joinids and a `label` column (`"<name>-<id>"`).
pub fn joinid_frame(name: &str, ids: &[i64]) -> Result<MemDataFrame> {
    let schema = Arc::new(Schema::new(vec![
        Field::new(SOMA_JOINID, DataType::Int64, false),
        Field::new("label", DataType::Utf8, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(ids.to_vec())),
            Arc::new(StringArray::from_iter_values(
                ids.iter().map(|id| format!("{name}-{id}")),
            )),
        ],
    )?;
    MemDataFrame::try_new(name, batch)
}

/// Values of an Int64 column. Panics if the column is absent or mistyped.
pub fn int64_values(batch: &RecordBatch, column: &str) -> Vec<i64> {
    batch
        .column_by_name(column)
        .unwrap_or_else(|| panic!("column {column} missing"))
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap_or_else(|| panic!("column {column} is not Int64"))
        .values()
        .to_vec()
}

/// Values of a Float32 column. Panics if the column is absent or mistyped.
pub fn float32_values(batch: &RecordBatch, column: &str) -> Vec<f32> {
    batch
        .column_by_name(column)
        .unwrap_or_else(|| panic!("column {column} missing"))
        .as_any()
        .downcast_ref::<Float32Array>()
        .unwrap_or_else(|| panic!("column {column} is not Float32"))
        .values()
        .to_vec()
}
