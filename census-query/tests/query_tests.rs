use std::collections::BTreeSet;
use std::sync::Arc;

use arrow::array::{Array, Int64Array};
use census_query::{
    Axis, AxisQuery, ExperimentQuery, NOT_FOUND, POS_DIM_0, POS_DIM_1, QueryOptions, ReadOptions,
};
use census_storage::mem::{MemExperiment, MemMeasurement, MemSparseArray};
use census_storage::{MatrixCoords, SOMA_DATA, SOMA_DIM_0, SOMA_DIM_1, SOMA_JOINID, SparseNDArray};
use census_test_utils::{
    ExperimentFixture, float32_values, init_tracing_for_tests, int64_values, joinid_frame,
};

fn fixture() -> Arc<MemExperiment> {
    Arc::new(
        ExperimentFixture::new(120, 40)
            .seed(11)
            .density(0.15)
            .chunk_rows(50)
            .with_layer("normalized")
            .build()
            .unwrap(),
    )
}

fn scenario() -> Arc<MemExperiment> {
    let x = MemSparseArray::from_triplets(
        "raw",
        (100, 3),
        &[(10, 1, 5.0), (20, 2, 7.0), (99, 1, 1.0)],
        1,
    )
    .unwrap();
    let rna = MemMeasurement::new(joinid_frame("var", &[1, 2]).unwrap()).with_sparse("raw", x);
    Arc::new(
        MemExperiment::new(joinid_frame("obs", &[10, 20, 30, 40, 99]).unwrap())
            .with_measurement("RNA", rna),
    )
}

fn cells(batch: &arrow::record_batch::RecordBatch, d0: &str, d1: &str) -> Vec<(i64, i64)> {
    int64_values(batch, d0)
        .into_iter()
        .zip(int64_values(batch, d1))
        .collect()
}

#[test]
fn end_to_end_scenario() {
    init_tracing_for_tests();
    let query = ExperimentQuery::new(
        scenario(),
        "RNA",
        AxisQuery::all().with_points([10, 20, 30]),
        AxisQuery::all(),
    )
    .unwrap();

    let result = query.read("raw", &ReadOptions::default()).unwrap();
    assert_eq!(cells(&result.x, SOMA_DIM_0, SOMA_DIM_1), vec![(10, 1), (20, 2)]);
    assert_eq!(float32_values(&result.x, SOMA_DATA), vec![5.0, 7.0]);
    assert_eq!(int64_values(&result.obs, SOMA_JOINID), vec![10, 20, 30]);
    assert!(result.x_layers.is_empty());

    let positional = query
        .read("raw", &ReadOptions::default().with_position_indexing(true))
        .unwrap();
    assert_eq!(cells(&positional.x, POS_DIM_0, POS_DIM_1), vec![(0, 0), (1, 1)]);
    assert_eq!(float32_values(&positional.x, SOMA_DATA), vec![5.0, 7.0]);
    assert!(positional.obs.column_by_name(SOMA_JOINID).is_none());
    assert!(positional.var.column_by_name(SOMA_JOINID).is_none());
    query.close();
}

#[test]
fn joinids_are_deterministic_across_column_choices() {
    init_tracing_for_tests();
    let exp = fixture();
    let obs_query = AxisQuery::all()
        .with_value_filter("tissue IN ('lung', 'liver') AND n_genes >= 1000")
        .unwrap();

    let query =
        ExperimentQuery::new(exp.clone(), "RNA", obs_query.clone(), AxisQuery::all()).unwrap();
    let narrow = query.obs(Some(&["tissue".to_string()])).unwrap();
    assert_eq!(narrow.num_columns(), 1);
    let first = query.obs_joinids().unwrap();
    let wide = query.obs(None).unwrap();
    assert_eq!(int64_values(&wide, SOMA_JOINID), first.values().to_vec());
    assert_eq!(narrow.num_rows(), wide.num_rows());
    assert_eq!(query.obs_joinids().unwrap().values(), first.values());
    query.close();

    let other = ExperimentQuery::new(exp, "RNA", obs_query, AxisQuery::all()).unwrap();
    let ids = other.obs_joinids().unwrap();
    let projected = other.obs(Some(&["n_genes".to_string()])).unwrap();
    assert_eq!(ids.values(), first.values());
    assert_eq!(projected.num_rows(), ids.len());
    other.close();
}

#[test]
fn matrix_reads_exactly_the_cross_product() {
    init_tracing_for_tests();
    let exp = fixture();
    let query = ExperimentQuery::new(
        exp.clone(),
        "RNA",
        AxisQuery::all().with_value_filter("tissue = 'brain' OR is_primary = true").unwrap(),
        AxisQuery::all().with_points((0..40).filter(|v| v % 3 != 0)),
    )
    .unwrap();

    let obs: BTreeSet<i64> = query.obs_joinids().unwrap().values().iter().copied().collect();
    let var: BTreeSet<i64> = query.var_joinids().unwrap().values().iter().copied().collect();

    let full = exp
        .measurement_ref("RNA")
        .unwrap()
        .sparse("raw")
        .unwrap()
        .read(&MatrixCoords::default())
        .unwrap()
        .concat()
        .unwrap();
    let expected: BTreeSet<(i64, i64)> = cells(&full, SOMA_DIM_0, SOMA_DIM_1)
        .into_iter()
        .filter(|(o, v)| obs.contains(o) && var.contains(v))
        .collect();

    for prefetch in [false, true] {
        let got: BTreeSet<(i64, i64)> = query
            .x("raw", prefetch)
            .unwrap()
            .flat_map(|batch| cells(&batch.unwrap(), SOMA_DIM_0, SOMA_DIM_1))
            .collect();
        assert_eq!(got, expected);
    }
    query.close();
}

#[test]
fn indexer_maps_cached_order_and_sentinel() {
    let query = ExperimentQuery::new(
        fixture(),
        "RNA",
        AxisQuery::all().with_points([90, 3, 57, 12]),
        AxisQuery::all().with_range(Some(10), Some(14)),
    )
    .unwrap();

    let obs = query.obs_joinids().unwrap();
    let indexer = query.indexer().unwrap();
    let positions = indexer.obs_index(&obs);
    assert_eq!(positions.values().to_vec(), (0..obs.len() as i64).collect::<Vec<_>>());

    let lookup = Int64Array::from(vec![12, 12, 1000, 90]);
    let got = query.index(Axis::Obs, &lookup).unwrap();
    let pos = |id: i64| obs.values().iter().position(|v| *v == id).unwrap() as i64;
    assert_eq!(got.values().to_vec(), vec![pos(12), pos(12), NOT_FOUND, pos(90)]);

    let var = indexer.var_index(&Int64Array::from(vec![10, 14, 15]));
    assert_eq!(var.values().to_vec(), vec![0, 4, NOT_FOUND]);
    query.close();
}

#[test]
fn empty_selection_reads_nothing() {
    let exp = fixture();
    let query = ExperimentQuery::new(
        exp.clone(),
        "RNA",
        AxisQuery::all().with_value_filter("tissue = 'pancreas'").unwrap(),
        AxisQuery::all(),
    )
    .unwrap();

    assert_eq!(query.n_obs().unwrap(), 0);
    assert_eq!(query.x("raw", true).unwrap().count(), 0);

    let result = query
        .read(
            "raw",
            &ReadOptions::default()
                .with_x_layers(["normalized"])
                .with_position_indexing(true),
        )
        .unwrap();
    assert_eq!(result.obs.num_rows(), 0);
    assert_eq!(result.x.num_rows(), 0);
    assert_eq!(result.x_layers["normalized"].num_rows(), 0);
    let raw = exp.measurement_ref("RNA").unwrap().sparse("raw").unwrap();
    assert_eq!(raw.stats().snapshot().reads, 0);
    query.close();
}

#[test]
fn positional_rewrite_round_trips() {
    let query = ExperimentQuery::new_with_options(
        fixture(),
        "RNA",
        AxisQuery::all().with_range(Some(20), Some(79)),
        AxisQuery::all().with_value_filter("feature_length < 15000").unwrap(),
        &QueryOptions::default().with_num_threads(3),
    )
    .unwrap();

    let by_id = query.read("raw", &ReadOptions::default()).unwrap();
    let by_pos = query
        .read("raw", &ReadOptions::default().with_position_indexing(true))
        .unwrap();
    assert_eq!(by_id.x.num_rows(), by_pos.x.num_rows());

    let obs_ids = int64_values(&by_id.obs, SOMA_JOINID);
    let var_ids = int64_values(&by_id.var, SOMA_JOINID);
    for ((o, v), (i, j)) in cells(&by_id.x, SOMA_DIM_0, SOMA_DIM_1)
        .into_iter()
        .zip(cells(&by_pos.x, POS_DIM_0, POS_DIM_1))
    {
        assert_eq!(obs_ids[i as usize], o);
        assert_eq!(var_ids[j as usize], v);
    }
    assert_eq!(by_pos.obs.num_rows(), obs_ids.len());
    query.close();
}

#[test]
fn read_projects_columns_and_layers() {
    let exp = fixture();
    let query = ExperimentQuery::new(
        exp.clone(),
        "RNA",
        AxisQuery::all().with_points([1, 2, 3]),
        AxisQuery::all().with_points([0, 1]),
    )
    .unwrap();
    let opts = ReadOptions::default()
        .with_obs_columns(["tissue", "n_genes"])
        .with_var_columns(["feature_name"])
        .with_x_layers(["normalized"]);
    let result = query.read("raw", &opts).unwrap();

    let obs_cols: Vec<_> = result.obs.schema().fields().iter().map(|f| f.name().clone()).collect();
    assert_eq!(obs_cols, vec!["tissue", "n_genes"]);
    assert_eq!(result.var.num_columns(), 1);
    assert_eq!(result.x_layers.len(), 1);
    assert_eq!(int64_values(&result.x, SOMA_DIM_1).iter().filter(|v| **v > 1).count(), 0);
    assert_eq!(query.n_obs().unwrap(), 3);

    let reads_before = exp.obs_frame().stats().snapshot().reads;
    query.obs_joinids().unwrap();
    query.indexer().unwrap();
    assert_eq!(exp.obs_frame().stats().snapshot().reads, reads_before);
    query.close();
}

#[test]
fn repeated_layer_names_read_each_matrix_once() {
    let exp = fixture();
    let query =
        ExperimentQuery::new(exp.clone(), "RNA", AxisQuery::all(), AxisQuery::all()).unwrap();
    let rna = exp.measurement_ref("RNA").unwrap();
    let raw = rna.sparse("raw").unwrap();
    let normalized = rna.sparse("normalized").unwrap();
    raw.stats().reset();
    normalized.stats().reset();

    let opts = ReadOptions::default()
        .with_x_layers(["raw", "normalized", "normalized"])
        .with_position_indexing(true);
    let result = query.read("raw", &opts).unwrap();

    assert_eq!(raw.stats().snapshot().reads, 1);
    assert_eq!(normalized.stats().snapshot().reads, 1);
    assert_eq!(result.x_layers.len(), 2);
    assert_eq!(result.x_layers["raw"], result.x);
    assert!(result.x_layers["normalized"].column_by_name(POS_DIM_0).is_some());
    query.close();
}

#[test]
fn storage_errors_propagate_from_the_matrix_open() {
    let exp = fixture();
    let query =
        ExperimentQuery::new(exp.clone(), "RNA", AxisQuery::all(), AxisQuery::all()).unwrap();
    let raw = exp.measurement_ref("RNA").unwrap().sparse("raw").unwrap();
    raw.faults().fail_next(1);
    assert!(matches!(query.x("raw", false).err(), Some(census_query::Error::Io(_))));
    assert!(query.x("raw", false).unwrap().all(|b| b.is_ok()));
    query.close();
}

#[test]
fn abandoned_prefetch_does_not_block_close() {
    let query = ExperimentQuery::new(fixture(), "RNA", AxisQuery::all(), AxisQuery::all()).unwrap();
    {
        let mut stream = query.x("normalized", true).unwrap();
        assert!(stream.next().unwrap().is_ok());
    }
    query.close();
}
