//! Storage boundary for the census experiment query layer.
//!
//! The query layer never touches on-disk layout. It talks to storage through
//! the traits in [`traits`]: an [`Experiment`] exposes an `obs` [`DataFrame`]
//! and named [`Measurement`]s; a measurement exposes a `var` dataframe and
//! named matrices ([`NDArray`]), of which only the sparse form can be read.
//!
//! Reads return a [`BatchStream`]: a lazy, finite, non-restartable sequence of
//! Arrow record batches, one per unit of storage I/O.
//!
//! The [`mem`] module provides an in-memory backend that honours the same
//! contract. It is used by the test suites and demos and records per-handle
//! read statistics.

pub mod constants;
pub mod coords;
pub mod instrumentation;
pub mod mem;
pub mod stream;
pub mod traits;

pub use census_result::{Error, Result};
pub use constants::*;
pub use coords::{AxisCoords, CoordsMatcher, MatrixCoords};
pub use instrumentation::{FaultInjector, ReadStats, ReadStatsSnapshot};
pub use stream::BatchStream;
pub use traits::{
    ArrayKind, DataFrame, DenseNDArray, Experiment, Measurement, NDArray, SparseNDArray,
};
