//! Capabilities the query layer needs from storage.
//!
//! Handles are shared as `Arc<dyn …>` and must be `Send + Sync`: the query
//! layer reads both axes concurrently and pulls matrix chunks from worker
//! threads.

use std::fmt;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use census_expr::ValueFilter;
use census_result::Result;

use crate::constants::{DENSE_ND_ARRAY, SPARSE_ND_ARRAY};
use crate::coords::{AxisCoords, MatrixCoords};
use crate::stream::BatchStream;

/// A labeled axis table (`obs` or `var`) keyed by `soma_joinid`.
pub trait DataFrame: Send + Sync {
    fn schema(&self) -> SchemaRef;

    /// Read the rows selected by `coords` that also satisfy `value_filter`,
    /// projected to `column_names` in the order given (`None` = every column).
    ///
    /// Filter columns need not be part of the projection.
    fn read(
        &self,
        coords: &AxisCoords,
        value_filter: Option<&ValueFilter>,
        column_names: Option<&[String]>,
    ) -> Result<BatchStream>;

    /// [`DataFrame::read`] drained into one batch.
    fn read_all(
        &self,
        coords: &AxisCoords,
        value_filter: Option<&ValueFilter>,
        column_names: Option<&[String]>,
    ) -> Result<RecordBatch> {
        self.read(coords, value_filter, column_names)?.concat()
    }
}

/// A sparse 2-D matrix of `(soma_dim_0, soma_dim_1, soma_data)` triplets.
pub trait SparseNDArray: Send + Sync {
    fn schema(&self) -> SchemaRef;

    /// `(n_obs, n_var)` capacity of the matrix.
    fn shape(&self) -> (u64, u64);

    /// Stream the stored cells whose row id is selected by `coords.obs` and
    /// whose column id is selected by `coords.var`.
    fn read(&self, coords: &MatrixCoords) -> Result<BatchStream>;
}

/// A dense 2-D matrix. The query layer only inspects its type tag.
pub trait DenseNDArray: Send + Sync {
    fn shape(&self) -> (u64, u64);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArrayKind {
    Sparse,
    Dense,
}

/// A matrix handle tagged with its representation.
#[derive(Clone)]
pub enum NDArray {
    Sparse(Arc<dyn SparseNDArray>),
    Dense(Arc<dyn DenseNDArray>),
}

impl NDArray {
    pub fn kind(&self) -> ArrayKind {
        match self {
            NDArray::Sparse(_) => ArrayKind::Sparse,
            NDArray::Dense(_) => ArrayKind::Dense,
        }
    }

    pub fn soma_type(&self) -> &'static str {
        match self {
            NDArray::Sparse(_) => SPARSE_ND_ARRAY,
            NDArray::Dense(_) => DENSE_ND_ARRAY,
        }
    }

    pub fn shape(&self) -> (u64, u64) {
        match self {
            NDArray::Sparse(array) => array.shape(),
            NDArray::Dense(array) => array.shape(),
        }
    }

    pub fn as_sparse(&self) -> Option<&Arc<dyn SparseNDArray>> {
        match self {
            NDArray::Sparse(array) => Some(array),
            NDArray::Dense(_) => None,
        }
    }
}

impl fmt::Debug for NDArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NDArray")
            .field("soma_type", &self.soma_type())
            .field("shape", &self.shape())
            .finish()
    }
}

/// One measurement (e.g. `RNA`) of an experiment.
pub trait Measurement: Send + Sync {
    fn var(&self) -> Arc<dyn DataFrame>;

    /// Names of the matrices (`X` layers) in this measurement, sorted.
    fn matrix_names(&self) -> Vec<String>;

    fn matrix(&self, name: &str) -> Option<NDArray>;
}

/// An annotated experiment: an `obs` axis shared by named measurements.
pub trait Experiment: Send + Sync {
    fn exists(&self) -> bool;

    fn obs(&self) -> Arc<dyn DataFrame>;

    /// Names of the measurements in this experiment, sorted.
    fn measurement_names(&self) -> Vec<String>;

    fn measurement(&self, name: &str) -> Option<Arc<dyn Measurement>>;
}
