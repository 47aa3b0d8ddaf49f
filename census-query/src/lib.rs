//! Experiment query layer for annotated single-cell data.
//!
//! An [`ExperimentQuery`] selects a rectangular slice of one measurement of an
//! experiment: rows of `obs` chosen by an [`AxisQuery`], columns of the
//! measurement's `var` chosen by another, and the cells of any sparse X layer
//! that fall in their cross product.
//!
//! Axis tables are read whole; matrices are streamed chunk by chunk
//! ([`MatrixStream`]), optionally with one-chunk-ahead prefetch on the query's
//! worker pool. [`ExperimentQuery::read`] materializes everything at once and
//! can rewrite matrix coordinates from `soma_joinid`s to dense positions.
//!
//! The `soma_joinid`s selected on each axis are cached on the first read of
//! that axis and reused afterwards, so repeated reads of one query always
//! agree on the row set.
//!
//! [`AsyncExperimentQuery`] offers the same operations as `async fn`s backed
//! by the same pool and caches.

mod async_query;
mod axis;
mod indexer;
mod matrix;
mod options;
pub mod projection;
mod query;
mod read;

pub use async_query::AsyncExperimentQuery;
pub use axis::{Axis, AxisQuery};
pub use census_result::{Error, Result};
pub use indexer::{AxisIndexer, JoinIdIndex, NOT_FOUND};
pub use matrix::{MatrixStream, Pulled, pull_next};
pub use options::{MIN_THREADS, QueryOptions, THREADS_ENV};
pub use projection::{physical_read_columns, project_columns};
pub use query::{ExperimentQuery, experiment_query};
pub use read::{AxisColumnNames, POS_DIM_0, POS_DIM_1, QueryReadResult, ReadOptions};
