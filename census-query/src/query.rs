//! The experiment query: filter state, identifier caches and worker pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use arrow::array::{Array, Int64Array};
use arrow::record_batch::RecordBatch;
use census_result::{Error, Result};
use census_storage::{
    AxisCoords, DataFrame, Experiment, MatrixCoords, Measurement, NDArray, SOMA_JOINID,
    SparseNDArray,
};
use rayon::ThreadPool;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::async_query::AsyncExperimentQuery;
use crate::axis::{Axis, AxisQuery};
use crate::indexer::{AxisIndexer, JoinIdIndex};
use crate::matrix::{ChunkSource, MatrixStream};
use crate::options::QueryOptions;
use crate::projection::{drop_column, physical_read_columns, project_columns};
use crate::read::{QueryReadResult, ReadOptions, to_positional};

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// State shared by the blocking and async views of one query.
pub(crate) struct QueryCore {
    id: u64,
    experiment: Arc<dyn Experiment>,
    measurement_name: String,
    measurement: Arc<dyn Measurement>,
    obs_query: AxisQuery,
    var_query: AxisQuery,
    obs_joinids: OnceLock<Arc<Int64Array>>,
    var_joinids: OnceLock<Arc<Int64Array>>,
    obs_index: OnceLock<Arc<JoinIdIndex>>,
    var_index: OnceLock<Arc<JoinIdIndex>>,
    pub(crate) pool: Arc<ThreadPool>,
}

impl QueryCore {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    fn axis_query(&self, axis: Axis) -> &AxisQuery {
        match axis {
            Axis::Obs => &self.obs_query,
            Axis::Var => &self.var_query,
        }
    }

    fn axis_frame(&self, axis: Axis) -> Arc<dyn DataFrame> {
        match axis {
            Axis::Obs => self.experiment.obs(),
            Axis::Var => self.measurement.var(),
        }
    }

    fn joinid_cell(&self, axis: Axis) -> &OnceLock<Arc<Int64Array>> {
        match axis {
            Axis::Obs => &self.obs_joinids,
            Axis::Var => &self.var_joinids,
        }
    }

    fn index_cell(&self, axis: Axis) -> &OnceLock<Arc<JoinIdIndex>> {
        match axis {
            Axis::Obs => &self.obs_index,
            Axis::Var => &self.var_index,
        }
    }

    pub(crate) fn cached_joinids(&self, axis: Axis) -> Option<Arc<Int64Array>> {
        self.joinid_cell(axis).get().cloned()
    }

    /// Read the filtered axis table. The first read of an axis also fills its
    /// identifier cache, widening the physical read with `soma_joinid` if the
    /// caller did not ask for it.
    pub(crate) fn read_axis(
        &self,
        axis: Axis,
        column_names: Option<&[String]>,
    ) -> Result<RecordBatch> {
        let cell = self.joinid_cell(axis);
        let need_joinids = cell.get().is_none();
        let physical = physical_read_columns(column_names, need_joinids);
        let query = self.axis_query(axis);

        tracing::debug!(
            query = self.id,
            %axis,
            columns = ?physical,
            need_joinids,
            "reading axis dataframe"
        );
        let table = self.axis_frame(axis).read_all(
            query.coords(),
            query.value_filter(),
            physical.as_deref(),
        )?;

        if need_joinids {
            let joinids = table
                .column_by_name(SOMA_JOINID)
                .ok_or_else(|| {
                    Error::Internal(format!("{axis} read returned no {SOMA_JOINID} column"))
                })?
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| Error::Internal(format!("{axis} {SOMA_JOINID} is not Int64")))?
                .clone();
            // A concurrent first read may have won; its identifiers are the same.
            if cell.set(Arc::new(joinids)).is_ok() {
                tracing::debug!(
                    query = self.id,
                    %axis,
                    n = table.num_rows(),
                    "cached axis joinids"
                );
            }
        }

        project_columns(&table, column_names)
    }

    pub(crate) fn joinids(&self, axis: Axis) -> Result<Arc<Int64Array>> {
        if let Some(ids) = self.cached_joinids(axis) {
            return Ok(ids);
        }
        self.read_axis(axis, Some(&[SOMA_JOINID.to_string()]))?;
        self.cached_joinids(axis)
            .ok_or_else(|| Error::Internal(format!("{axis} joinids missing after read")))
    }

    /// Both identifier sets, reading unresolved axes in parallel on the pool.
    fn resolve_joinids(&self) -> Result<(Arc<Int64Array>, Arc<Int64Array>)> {
        match (self.cached_joinids(Axis::Obs), self.cached_joinids(Axis::Var)) {
            (Some(obs), Some(var)) => Ok((obs, var)),
            (None, None) => {
                let (obs, var) = self
                    .pool
                    .join(|| self.joinids(Axis::Obs), || self.joinids(Axis::Var));
                Ok((obs?, var?))
            }
            _ => Ok((self.joinids(Axis::Obs)?, self.joinids(Axis::Var)?)),
        }
    }

    fn index(&self, axis: Axis) -> Result<Arc<JoinIdIndex>> {
        let cell = self.index_cell(axis);
        if let Some(index) = cell.get() {
            return Ok(Arc::clone(index));
        }
        let joinids = self.joinids(axis)?;
        let built = Arc::new(JoinIdIndex::new(&joinids));
        tracing::trace!(query = self.id, %axis, n = built.len(), "built joinid index");
        Ok(Arc::clone(cell.get_or_init(|| built)))
    }

    pub(crate) fn indexer(&self) -> Result<AxisIndexer> {
        self.resolve_joinids()?;
        Ok(AxisIndexer::new(self.index(Axis::Obs)?, self.index(Axis::Var)?))
    }

    pub(crate) fn index_coords(&self, axis: Axis, coords: &Int64Array) -> Result<Int64Array> {
        Ok(self.index(axis)?.get_indexer(coords))
    }

    /// Look up `layer` and check it can be read.
    fn sparse_layer(&self, layer: &str) -> Result<Arc<dyn SparseNDArray>> {
        if layer.is_empty() {
            return Err(Error::InvalidArgumentError("must specify an X layer".into()));
        }
        match self.measurement.matrix(layer) {
            Some(NDArray::Sparse(x)) => Ok(x),
            Some(NDArray::Dense(_)) => Err(Error::UnsupportedFormat(format!(
                "X layer '{layer}' is a dense array; only sparse arrays can be read"
            ))),
            None => Err(Error::not_found(format!(
                "X layer '{layer}' in measurement '{}'",
                self.measurement_name
            ))),
        }
    }

    /// Validation used by [`QueryCore::read`]: unknown names are argument
    /// errors there.
    fn read_layer(&self, layer: &str) -> Result<Arc<dyn SparseNDArray>> {
        self.sparse_layer(layer).map_err(|err| match err {
            Error::NotFound(_) => Error::InvalidArgumentError(format!(
                "unknown X layer name '{layer}'"
            )),
            other => other,
        })
    }

    fn open_matrix(&self, x: &Arc<dyn SparseNDArray>, prefetch: bool) -> Result<ChunkSource> {
        let (obs, var) = self.resolve_joinids()?;
        if obs.is_empty() || var.is_empty() {
            tracing::debug!(query = self.id, "empty axis selection; matrix read skipped");
            return Ok(ChunkSource::empty(x.schema()));
        }
        let coords = MatrixCoords::new(AxisCoords::Points(obs), AxisCoords::Points(var));
        let stream = x.read(&coords)?;
        tracing::debug!(query = self.id, prefetch, "opened matrix stream");
        Ok(if prefetch {
            ChunkSource::prefetch(stream, Arc::clone(&self.pool))
        } else {
            ChunkSource::direct(stream)
        })
    }

    pub(crate) fn x_source(&self, layer: &str, prefetch: bool) -> Result<ChunkSource> {
        let x = self.sparse_layer(layer)?;
        self.open_matrix(&x, prefetch)
    }

    pub(crate) fn read(&self, x_name: &str, options: &ReadOptions) -> Result<QueryReadResult> {
        // Each distinct matrix is read once, however often it is named.
        let mut seen = FxHashSet::default();
        let matrices = std::iter::once(x_name)
            .chain(options.x_layers.iter().map(String::as_str))
            .filter(|name| seen.insert(*name))
            .map(|name| Ok((name, self.read_layer(name)?)))
            .collect::<Result<Vec<_>>>()?;

        let (obs, var) = self.pool.join(
            || self.read_axis(Axis::Obs, options.column_names.obs.as_deref()),
            || self.read_axis(Axis::Var, options.column_names.var.as_deref()),
        );
        let (mut obs, mut var) = (obs?, var?);

        let indexer = if options.use_position_indexing {
            Some(self.indexer()?)
        } else {
            None
        };
        let mut tables: FxHashMap<&str, RecordBatch> = FxHashMap::default();
        for (name, matrix) in &matrices {
            let mut table = MatrixStream::new(self.open_matrix(matrix, true)?).concat()?;
            if let Some(indexer) = &indexer {
                table = to_positional(&table, indexer)?;
            }
            tables.insert(*name, table);
        }
        if indexer.is_some() {
            obs = drop_column(&obs, SOMA_JOINID)?;
            var = drop_column(&var, SOMA_JOINID)?;
        }

        let matrix = |name: &str| {
            tables
                .get(name)
                .cloned()
                .ok_or_else(|| Error::Internal(format!("matrix '{name}' was not fetched")))
        };
        let x = matrix(x_name)?;
        let x_layers = options
            .x_layers
            .iter()
            .map(|name| Ok((name.clone(), matrix(name)?)))
            .collect::<Result<FxHashMap<_, _>>>()?;

        tracing::debug!(
            query = self.id,
            obs = obs.num_rows(),
            var = var.num_rows(),
            nnz = x.num_rows(),
            layers = x_layers.len(),
            "query read complete"
        );
        Ok(QueryReadResult {
            obs,
            var,
            x,
            x_layers,
        })
    }
}

/// A filtered slice of one measurement of an experiment.
///
/// Both axis tables are assumed to fit in memory; the matrix is available
/// incrementally through [`ExperimentQuery::x`]. Each query owns a worker
/// pool, released by [`ExperimentQuery::close`] (or on drop).
///
/// ```
/// use std::sync::Arc;
/// use census_query::{AxisQuery, ExperimentQuery, ReadOptions};
/// use census_test_utils::ExperimentFixture;
///
/// let experiment = Arc::new(ExperimentFixture::new(40, 8).build().unwrap());
/// let query = ExperimentQuery::new(
///     experiment,
///     "RNA",
///     AxisQuery::all().with_value_filter("tissue = 'lung'").unwrap(),
///     AxisQuery::all(),
/// )
/// .unwrap();
/// assert_eq!(query.n_obs().unwrap(), 10);
/// let result = query.read("raw", &ReadOptions::default()).unwrap();
/// assert_eq!(result.obs.num_rows(), 10);
/// query.close();
/// ```
pub struct ExperimentQuery {
    pub(crate) core: Arc<QueryCore>,
    closed: bool,
}

impl ExperimentQuery {
    /// Open a query with the default [`QueryOptions`].
    ///
    /// Fails with [`Error::ValidationError`] before any I/O if the experiment
    /// does not exist or has no measurement named `measurement_name`.
    pub fn new(
        experiment: Arc<dyn Experiment>,
        measurement_name: &str,
        obs_query: AxisQuery,
        var_query: AxisQuery,
    ) -> Result<Self> {
        Self::new_with_options(
            experiment,
            measurement_name,
            obs_query,
            var_query,
            &QueryOptions::default(),
        )
    }

    pub fn new_with_options(
        experiment: Arc<dyn Experiment>,
        measurement_name: &str,
        obs_query: AxisQuery,
        var_query: AxisQuery,
        options: &QueryOptions,
    ) -> Result<Self> {
        if !experiment.exists() {
            return Err(Error::ValidationError("experiment does not exist".into()));
        }
        let measurement = experiment.measurement(measurement_name).ok_or_else(|| {
            Error::ValidationError(format!(
                "measurement '{measurement_name}' does not exist in the experiment"
            ))
        })?;

        let id = NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed);
        let pool = Arc::new(options.build_pool(id)?);
        tracing::debug!(query = id, measurement = measurement_name, "opened experiment query");
        Ok(Self {
            core: Arc::new(QueryCore {
                id,
                experiment,
                measurement_name: measurement_name.to_string(),
                measurement,
                obs_query,
                var_query,
                obs_joinids: OnceLock::new(),
                var_joinids: OnceLock::new(),
                obs_index: OnceLock::new(),
                var_index: OnceLock::new(),
                pool,
            }),
            closed: false,
        })
    }

    pub fn experiment(&self) -> &Arc<dyn Experiment> {
        &self.core.experiment
    }

    pub fn measurement_name(&self) -> &str {
        &self.core.measurement_name
    }

    pub fn axis_query(&self, axis: Axis) -> &AxisQuery {
        self.core.axis_query(axis)
    }

    /// The filtered `obs` table, projected to `column_names` (`None` = all).
    pub fn obs(&self, column_names: Option<&[String]>) -> Result<RecordBatch> {
        self.core.read_axis(Axis::Obs, column_names)
    }

    /// The filtered `var` table, projected to `column_names` (`None` = all).
    pub fn var(&self, column_names: Option<&[String]>) -> Result<RecordBatch> {
        self.core.read_axis(Axis::Var, column_names)
    }

    pub fn axis_table(&self, axis: Axis, column_names: Option<&[String]>) -> Result<RecordBatch> {
        self.core.read_axis(axis, column_names)
    }

    /// `soma_joinid`s selected on `obs`, in storage order. Cached after the
    /// first axis read.
    pub fn obs_joinids(&self) -> Result<Arc<Int64Array>> {
        self.core.joinids(Axis::Obs)
    }

    pub fn var_joinids(&self) -> Result<Arc<Int64Array>> {
        self.core.joinids(Axis::Var)
    }

    pub fn axis_joinids(&self, axis: Axis) -> Result<Arc<Int64Array>> {
        self.core.joinids(axis)
    }

    /// Number of `obs` rows selected by the query, not the dataset size.
    pub fn n_obs(&self) -> Result<usize> {
        Ok(self.obs_joinids()?.len())
    }

    pub fn n_vars(&self) -> Result<usize> {
        Ok(self.var_joinids()?.len())
    }

    /// Stream the cells of X layer `layer` restricted to the query.
    ///
    /// Both identifier sets are resolved first, in parallel when neither is
    /// cached. An empty selection on either axis yields no chunks. With
    /// `prefetch`, the next chunk is read on the pool while the caller
    /// processes the current one.
    ///
    /// Errors: [`Error::InvalidArgumentError`] for an empty name,
    /// [`Error::NotFound`] for an unknown layer and
    /// [`Error::UnsupportedFormat`] for a dense one.
    pub fn x(&self, layer: &str, prefetch: bool) -> Result<MatrixStream<'_>> {
        Ok(MatrixStream::new(self.core.x_source(layer, prefetch)?))
    }

    /// Read the whole query result: both axis tables (concurrently), the
    /// primary matrix `x_name` and every layer in `options.x_layers`.
    ///
    /// All matrix names are checked before any I/O. Empty or unknown names
    /// fail with [`Error::InvalidArgumentError`], dense matrices with
    /// [`Error::UnsupportedFormat`].
    pub fn read(&self, x_name: &str, options: &ReadOptions) -> Result<QueryReadResult> {
        self.core.read(x_name, options)
    }

    /// Positional indexer over both axes. Resolves missing identifier sets.
    pub fn indexer(&self) -> Result<AxisIndexer> {
        self.core.indexer()
    }

    /// Dense positions of `coords` on `axis`; unknown ids map to
    /// [`NOT_FOUND`](crate::NOT_FOUND).
    pub fn index(&self, axis: Axis, coords: &Int64Array) -> Result<Int64Array> {
        self.core.index_coords(axis, coords)
    }

    pub fn into_async(self) -> AsyncExperimentQuery {
        AsyncExperimentQuery::new(self)
    }

    /// Release the worker pool.
    pub fn close(mut self) {
        self.closed = true;
        tracing::debug!(query = self.core.id, "closing experiment query");
    }
}

impl Drop for ExperimentQuery {
    fn drop(&mut self) {
        if !self.closed {
            tracing::debug!(query = self.core.id, "experiment query dropped without close()");
        }
    }
}

/// Open a query, run `body` and close the query on every exit path,
/// including a panic inside `body`.
pub fn experiment_query<T, F>(
    experiment: Arc<dyn Experiment>,
    measurement_name: &str,
    obs_query: AxisQuery,
    var_query: AxisQuery,
    body: F,
) -> Result<T>
where
    F: FnOnce(&ExperimentQuery) -> Result<T>,
{
    let query = ExperimentQuery::new(experiment, measurement_name, obs_query, var_query)?;
    let out = body(&query);
    query.close();
    out
}
