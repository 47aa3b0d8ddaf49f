//! Shared contract checks for any storage backend.
//!
//! Verifies for any `DataFrame` / `SparseNDArray`:
//! - Point, range and unrestricted selections agree with a brute-force scan.
//! - Every batch of a stream carries the stream's schema.
//! - An empty selection yields no batches.

use std::collections::BTreeSet;

use arrow::array::{Array, Int64Array};
use arrow::record_batch::RecordBatch;
use census_storage::{AxisCoords, DataFrame, MatrixCoords, SOMA_JOINID, SparseNDArray};

fn ids(batch: &RecordBatch, column: &str) -> Vec<i64> {
    batch
        .column_by_name(column)
        .expect("column present")
        .as_any()
        .downcast_ref::<Int64Array>()
        .expect("Int64 column")
        .values()
        .to_vec()
}

fn drain(stream: census_storage::BatchStream) -> Vec<RecordBatch> {
    let schema = stream.schema().clone();
    let batches: Vec<RecordBatch> = stream.map(|b| b.expect("batch")).collect();
    for b in &batches {
        assert_eq!(b.schema(), schema, "batch schema must match stream schema");
    }
    batches
}

/// Check dataframe selections against the unrestricted read.
pub fn run_dataframe_contract(df: &dyn DataFrame) {
    let all: Vec<i64> = drain(df.read(&AxisCoords::All, None, None).expect("read all"))
        .iter()
        .flat_map(|b| ids(b, SOMA_JOINID))
        .collect();
    assert!(!all.is_empty(), "contract needs a non-empty dataframe");

    let picked: Vec<i64> = all.iter().copied().step_by(3).collect();
    let got: BTreeSet<i64> = drain(
        df.read(&AxisCoords::points(picked.iter().copied()), None, None)
            .expect("read points"),
    )
    .iter()
    .flat_map(|b| ids(b, SOMA_JOINID))
    .collect();
    assert_eq!(got, picked.iter().copied().collect::<BTreeSet<_>>());

    let lo = all[all.len() / 4];
    let hi = all[all.len() / 2];
    let expected: Vec<i64> = all.iter().copied().filter(|id| (lo..=hi).contains(id)).collect();
    let got: Vec<i64> = drain(
        df.read(&AxisCoords::range(Some(lo), Some(hi)), None, None)
            .expect("read range"),
    )
    .iter()
    .flat_map(|b| ids(b, SOMA_JOINID))
    .collect();
    assert_eq!(got, expected);

    let empty = drain(
        df.read(&AxisCoords::points(Vec::new()), None, None)
            .expect("read empty"),
    );
    assert!(empty.is_empty());
}

/// Check sparse cross-product selections against a brute-force filter.
pub fn run_sparse_contract(x: &dyn SparseNDArray, obs: &[i64], var: &[i64]) {
    let all = drain(x.read(&MatrixCoords::default()).expect("read all"));
    let cells: Vec<(i64, i64)> = all
        .iter()
        .flat_map(|b| {
            ids(b, census_storage::SOMA_DIM_0)
                .into_iter()
                .zip(ids(b, census_storage::SOMA_DIM_1))
        })
        .collect();

    let obs_set: BTreeSet<i64> = obs.iter().copied().collect();
    let var_set: BTreeSet<i64> = var.iter().copied().collect();
    let expected: Vec<(i64, i64)> = cells
        .iter()
        .copied()
        .filter(|(o, v)| obs_set.contains(o) && var_set.contains(v))
        .collect();

    let coords = MatrixCoords::new(
        AxisCoords::points(obs.iter().copied()),
        AxisCoords::points(var.iter().copied()),
    );
    let got: Vec<(i64, i64)> = drain(x.read(&coords).expect("read cross product"))
        .iter()
        .flat_map(|b| {
            ids(b, census_storage::SOMA_DIM_0)
                .into_iter()
                .zip(ids(b, census_storage::SOMA_DIM_1))
        })
        .collect();
    assert_eq!(got, expected);

    let none = MatrixCoords::new(
        AxisCoords::points(obs.iter().copied()),
        AxisCoords::points(Vec::new()),
    );
    assert!(drain(x.read(&none).expect("read empty")).is_empty());
}
