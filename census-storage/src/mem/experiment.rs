use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::Int64Array;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use census_result::Result;

use super::{MemDataFrame, MemDenseArray, MemSparseArray};
use crate::constants::SOMA_JOINID;
use crate::traits::{DataFrame, Experiment, Measurement, NDArray};

/// In-memory measurement: a `var` dataframe plus named matrices.
pub struct MemMeasurement {
    var: Arc<MemDataFrame>,
    sparse: BTreeMap<String, Arc<MemSparseArray>>,
    dense: BTreeMap<String, Arc<MemDenseArray>>,
}

impl MemMeasurement {
    pub fn new(var: MemDataFrame) -> Self {
        Self {
            var: Arc::new(var),
            sparse: BTreeMap::new(),
            dense: BTreeMap::new(),
        }
    }

    pub fn with_sparse(mut self, name: impl Into<String>, array: MemSparseArray) -> Self {
        let name = name.into();
        self.dense.remove(&name);
        self.sparse.insert(name, Arc::new(array));
        self
    }

    pub fn with_dense(mut self, name: impl Into<String>, array: MemDenseArray) -> Self {
        let name = name.into();
        self.sparse.remove(&name);
        self.dense.insert(name, Arc::new(array));
        self
    }

    pub fn var_frame(&self) -> &Arc<MemDataFrame> {
        &self.var
    }

    pub fn sparse(&self, name: &str) -> Option<&Arc<MemSparseArray>> {
        self.sparse.get(name)
    }
}

impl Measurement for MemMeasurement {
    fn var(&self) -> Arc<dyn DataFrame> {
        self.var.clone()
    }

    fn matrix_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sparse.keys().chain(self.dense.keys()).cloned().collect();
        names.sort();
        names
    }

    fn matrix(&self, name: &str) -> Option<NDArray> {
        if let Some(array) = self.sparse.get(name) {
            return Some(NDArray::Sparse(array.clone()));
        }
        self.dense
            .get(name)
            .map(|array| NDArray::Dense(array.clone()))
    }
}

/// In-memory experiment.
pub struct MemExperiment {
    exists: bool,
    obs: Arc<MemDataFrame>,
    measurements: BTreeMap<String, Arc<MemMeasurement>>,
}

impl MemExperiment {
    pub fn new(obs: MemDataFrame) -> Self {
        Self {
            exists: true,
            obs: Arc::new(obs),
            measurements: BTreeMap::new(),
        }
    }

    /// An experiment handle whose storage does not exist.
    pub fn missing() -> Result<Self> {
        let schema = Arc::new(Schema::new(vec![Field::new(
            SOMA_JOINID,
            DataType::Int64,
            false,
        )]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(Vec::<i64>::new()))])?;
        Ok(Self {
            exists: false,
            ..Self::new(MemDataFrame::try_new("obs", batch)?)
        })
    }

    pub fn with_measurement(
        mut self,
        name: impl Into<String>,
        measurement: MemMeasurement,
    ) -> Self {
        self.measurements.insert(name.into(), Arc::new(measurement));
        self
    }

    pub fn obs_frame(&self) -> &Arc<MemDataFrame> {
        &self.obs
    }

    pub fn measurement_ref(&self, name: &str) -> Option<&Arc<MemMeasurement>> {
        self.measurements.get(name)
    }
}

impl Experiment for MemExperiment {
    fn exists(&self) -> bool {
        self.exists
    }

    fn obs(&self) -> Arc<dyn DataFrame> {
        self.obs.clone()
    }

    fn measurement_names(&self) -> Vec<String> {
        self.measurements.keys().cloned().collect()
    }

    fn measurement(&self, name: &str) -> Option<Arc<dyn Measurement>> {
        self.measurements
            .get(name)
            .map(|m| m.clone() as Arc<dyn Measurement>)
    }
}
