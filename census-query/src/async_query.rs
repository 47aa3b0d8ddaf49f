//! Async view of an [`ExperimentQuery`].
//!
//! Every blocking operation is dispatched to the query's own worker pool and
//! the calling task awaits a `oneshot` reply. No state is duplicated: both
//! views share the same core, caches and pool.

use std::sync::{Arc, Mutex};

use arrow::array::{Array, Int64Array};
use arrow::record_batch::RecordBatch;
use census_result::{Error, Result};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::oneshot;

use crate::axis::Axis;
use crate::indexer::AxisIndexer;
use crate::matrix::{ChunkSource, Pulled};
use crate::query::{ExperimentQuery, QueryCore};
use crate::read::{QueryReadResult, ReadOptions};

/// Owning async wrapper around an [`ExperimentQuery`].
pub struct AsyncExperimentQuery {
    query: ExperimentQuery,
}

impl AsyncExperimentQuery {
    pub fn new(query: ExperimentQuery) -> Self {
        Self { query }
    }

    pub fn inner(&self) -> &ExperimentQuery {
        &self.query
    }

    pub fn into_inner(self) -> ExperimentQuery {
        self.query
    }

    pub fn close(self) {
        self.query.close();
    }

    /// Run `f` against the core on the query's pool.
    async fn dispatch<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&QueryCore) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let core = Arc::clone(&self.query.core);
        self.query.core.pool.spawn(move || {
            let _ = tx.send(f(&core));
        });
        rx.await.map_err(|_| {
            tracing::warn!(query = self.query.core.id(), "query worker dropped its reply");
            Error::Internal("query worker task was lost".into())
        })?
    }

    pub async fn obs(&self, column_names: Option<Vec<String>>) -> Result<RecordBatch> {
        self.dispatch(move |core| core.read_axis(Axis::Obs, column_names.as_deref()))
            .await
    }

    pub async fn var(&self, column_names: Option<Vec<String>>) -> Result<RecordBatch> {
        self.dispatch(move |core| core.read_axis(Axis::Var, column_names.as_deref()))
            .await
    }

    pub async fn axis_table(
        &self,
        axis: Axis,
        column_names: Option<Vec<String>>,
    ) -> Result<RecordBatch> {
        self.dispatch(move |core| core.read_axis(axis, column_names.as_deref()))
            .await
    }

    /// Served from the cache without dispatch once resolved.
    pub async fn obs_joinids(&self) -> Result<Arc<Int64Array>> {
        self.axis_joinids(Axis::Obs).await
    }

    pub async fn var_joinids(&self) -> Result<Arc<Int64Array>> {
        self.axis_joinids(Axis::Var).await
    }

    pub async fn axis_joinids(&self, axis: Axis) -> Result<Arc<Int64Array>> {
        if let Some(ids) = self.query.core.cached_joinids(axis) {
            return Ok(ids);
        }
        self.dispatch(move |core| core.joinids(axis)).await
    }

    pub async fn n_obs(&self) -> Result<usize> {
        Ok(self.obs_joinids().await?.len())
    }

    pub async fn n_vars(&self) -> Result<usize> {
        Ok(self.var_joinids().await?.len())
    }

    pub async fn indexer(&self) -> Result<AxisIndexer> {
        self.dispatch(|core| core.indexer()).await
    }

    /// Dense positions of `coords` on `axis`; unknown ids map to
    /// [`NOT_FOUND`](crate::NOT_FOUND).
    pub async fn index(&self, axis: Axis, coords: &Int64Array) -> Result<Int64Array> {
        let coords = coords.clone();
        self.dispatch(move |core| core.index_coords(axis, &coords)).await
    }

    pub async fn read(&self, x_name: &str, options: ReadOptions) -> Result<QueryReadResult> {
        let x_name = x_name.to_string();
        self.dispatch(move |core| core.read(&x_name, &options)).await
    }

    /// Async counterpart of [`ExperimentQuery::x`].
    ///
    /// Layer validation and the storage open happen before this returns.
    /// Each poll of the stream dispatches one "fetch next chunk" to the pool.
    pub async fn x(
        &self,
        layer: &str,
        prefetch: bool,
    ) -> Result<BoxStream<'_, Result<RecordBatch>>> {
        let layer = layer.to_string();
        let source = self
            .dispatch(move |core| core.x_source(&layer, prefetch))
            .await?;
        Ok(self.chunk_stream(source))
    }

    fn chunk_stream(&self, source: ChunkSource) -> BoxStream<'_, Result<RecordBatch>> {
        let pool = Arc::clone(&self.query.core.pool);
        let source = Arc::new(Mutex::new(source));
        stream::unfold(Some(source), move |state| {
            let pool = Arc::clone(&pool);
            async move {
                let source = state?;
                let (tx, rx) = oneshot::channel();
                let task_source = Arc::clone(&source);
                pool.spawn(move || {
                    let pulled = task_source
                        .lock()
                        .expect("async matrix source lock poisoned")
                        .pull();
                    let _ = tx.send(pulled);
                });
                match rx.await {
                    Ok(Pulled::Value(item)) => Some((item, Some(source))),
                    Ok(Pulled::Exhausted) => None,
                    Err(_) => {
                        tracing::warn!("matrix chunk task dropped its reply");
                        Some((
                            Err(Error::Internal("matrix chunk task was lost".into())),
                            None,
                        ))
                    }
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisQuery;
    use census_test_utils::ExperimentFixture;
    use futures::TryStreamExt;

    fn query() -> AsyncExperimentQuery {
        let exp = Arc::new(ExperimentFixture::new(30, 12).seed(9).build().unwrap());
        ExperimentQuery::new(
            exp,
            "RNA",
            AxisQuery::all().with_range(Some(5), Some(24)),
            AxisQuery::all().with_value_filter("feature_length > 1000").unwrap(),
        )
        .unwrap()
        .into_async()
    }

    #[tokio::test]
    async fn joinids_come_from_cache_after_first_read() {
        let q = query();
        assert!(q.inner().core.cached_joinids(Axis::Obs).is_none());
        let obs = q.obs(None).await.unwrap();
        assert_eq!(obs.num_rows(), 20);
        let ids = q.obs_joinids().await.unwrap();
        assert_eq!(ids.len(), 20);
        assert_eq!(q.n_obs().await.unwrap(), 20);
        q.close();
    }

    #[tokio::test]
    async fn x_stream_errors_surface_at_open() {
        let q = query();
        assert!(matches!(q.x("missing", false).await.err(), Some(Error::NotFound(_))));
        q.close();
    }

    #[tokio::test]
    async fn x_stream_ends_after_last_chunk() {
        let q = query();
        let chunks: Vec<RecordBatch> = q.x("raw", true).await.unwrap().try_collect().await.unwrap();
        let sync_rows: usize = q
            .inner()
            .x("raw", false)
            .unwrap()
            .map(|b| b.unwrap().num_rows())
            .sum();
        assert_eq!(chunks.iter().map(RecordBatch::num_rows).sum::<usize>(), sync_rows);
        q.close();
    }
}
