use canopy_pipeline::{
    ConcatBag, ConfigError, GraphError, PartitionTable, Pipeline, PipelineError, PlaceKind, PlaceSpec, ProgressEvent,
    ProgressLog, RunContext, ScalarCheck,
};
use canopy_table::{row, Table, Value};
use canopy_test_utils::{counting, failing, ids, recordings, work_dir};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn partitioned(name: &str, rows: usize, npartitions: usize, work_dir: &std::path::Path) -> Pipeline {
    let mut pipeline = Pipeline::new(name, work_dir);
    pipeline.register("recordings", recordings(rows)).unwrap();
    pipeline
        .register("npartitions", PlaceSpec::checked(npartitions, ScalarCheck::AtLeast(1)))
        .unwrap();
    pipeline
        .register(
            "recordings_bag",
            PlaceSpec::derive(PartitionTable::shared(), ["recordings", "npartitions"]),
        )
        .unwrap();
    pipeline
        .register("flat", PlaceSpec::derive(ConcatBag::shared(), ["recordings_bag"]))
        .unwrap();
    pipeline
}

#[test]
fn compute_is_idempotent() {
    let dir = work_dir();
    let pipeline = partitioned("idempotent", 25, 4, dir.path());
    let place = pipeline.place("flat").unwrap();

    let first = place.compute(&RunContext::new()).unwrap();
    let second = place.compute(&RunContext::new()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.into_table().unwrap(), recordings(25));
}

#[test]
fn persisted_artifact_reads_back() {
    let dir = work_dir();
    let pipeline = partitioned("round_trip", 12, 3, dir.path());
    let place = pipeline.place("flat").unwrap();

    assert!(place.read().unwrap_err().is_cache_miss());

    place.set_persist(true);
    let computed = place.compute(&RunContext::new()).unwrap();
    let path = place.artifact_path();
    assert_eq!(path, dir.path().join("round_trip").join("persist").join("flat.parquet"));
    assert!(path.is_file());
    assert_eq!(place.read().unwrap(), computed);
}

#[test]
fn persisting_leaves_no_staging_files() {
    let dir = work_dir();
    let pipeline = partitioned("staging", 8, 2, dir.path());
    pipeline["recordings_bag"].set_persist(true);
    pipeline["flat"].set_persist(true);

    let evaluation = pipeline.place("flat").unwrap().evaluate(&RunContext::new()).unwrap();
    assert_eq!(evaluation.report.persisted().len(), 2);

    let persist_dir = dir.path().join("staging").join("persist");
    let mut files: Vec<String> = std::fs::read_dir(&persist_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files, vec!["flat.parquet".to_string(), "recordings_bag.parquet".to_string()]);
}

#[test]
fn compute_never_reads_the_cache() {
    let dir = work_dir();
    let counter = Arc::new(AtomicUsize::new(0));
    let mut pipeline = Pipeline::new("no_cache_reads", dir.path());
    pipeline.register("recordings", recordings(3)).unwrap();
    pipeline
        .register(
            "copy",
            PlaceSpec::derive(counting("copy", PlaceKind::Table, counter.clone()), ["recordings"]),
        )
        .unwrap();
    pipeline["copy"].set_persist(true);

    let place = pipeline.place("copy").unwrap();
    place.compute(&RunContext::new()).unwrap();
    place.compute(&RunContext::new()).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn unregistered_reference_is_rejected() {
    let mut pipeline = Pipeline::new("forward_ref", std::env::temp_dir());
    pipeline.register("npartitions", Value::scalar(2)).unwrap();

    let err = pipeline
        .register(
            "recordings_bag",
            PlaceSpec::derive(PartitionTable::shared(), ["recordings", "npartitions"]),
        )
        .unwrap_err();
    assert_eq!(
        err,
        GraphError::UnregisteredReference {
            place: "recordings_bag".into(),
            missing: "recordings".into(),
        }
    );
    assert!(!pipeline.contains("recordings_bag"));
}

#[test]
fn shared_upstream_runs_once_per_call() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut pipeline = Pipeline::new("diamond", std::env::temp_dir());
    pipeline.register("recordings", recordings(4)).unwrap();
    pipeline
        .register(
            "source",
            PlaceSpec::derive(counting("source", PlaceKind::Table, counter.clone()), ["recordings"]),
        )
        .unwrap();
    pipeline.register("left", PlaceSpec::derive(counting("left", PlaceKind::Table, Arc::default()), ["source"])).unwrap();
    pipeline.register("right", PlaceSpec::derive(counting("right", PlaceKind::Table, Arc::default()), ["source"])).unwrap();
    pipeline
        .register(
            "join",
            PlaceSpec::derive(counting("join", PlaceKind::Table, Arc::default()), ["left", "right"]),
        )
        .unwrap();

    let evaluation = pipeline.place("join").unwrap().evaluate(&RunContext::new()).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(
        evaluation.report.evaluated(),
        ["recordings", "source", "left", "right", "join"]
    );
}

#[test]
fn bad_feed_fails_before_any_work() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut pipeline = Pipeline::new("bad_feed", std::env::temp_dir());
    pipeline.register("recordings", recordings(2)).unwrap();
    pipeline
        .register(
            "copy",
            PlaceSpec::derive(counting("copy", PlaceKind::Table, counter.clone()), ["recordings"]),
        )
        .unwrap();
    let place = pipeline.place("copy").unwrap();

    let err = place
        .compute(&RunContext::new().with_override("recordings", 1))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Config(ConfigError::UnknownFeedKey(ref key)) if key == "recordings"));

    let err = place.future(&RunContext::new().with_override("missing", 1)).unwrap_err();
    assert!(err.is_config());
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn invalid_partition_override_fails_before_any_work() {
    let dir = work_dir();
    let counter = Arc::new(AtomicUsize::new(0));
    let mut pipeline = partitioned("bad_npartitions", 6, 2, dir.path());
    pipeline
        .register(
            "counted",
            PlaceSpec::derive(counting("counted", PlaceKind::Table, counter.clone()), ["flat"]),
        )
        .unwrap();
    let place = pipeline.place("counted").unwrap();

    for fed in [serde_json::json!(0), serde_json::json!("ten"), serde_json::json!(1.5)] {
        let log = Arc::new(ProgressLog::new());
        let ctx = RunContext::new()
            .with_progress(log.clone())
            .with_override("npartitions", fed.clone());

        let err = place.compute(&ctx).unwrap_err();
        assert!(
            matches!(err, PipelineError::Config(ConfigError::InvalidParameter { ref name, .. }) if name == "npartitions"),
            "{fed}: {err}"
        );
        assert!(place.future(&ctx).unwrap_err().is_config());
        assert!(log.finished().is_empty());
    }
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn transition_failure_names_the_place() {
    let mut pipeline = Pipeline::new("failure", std::env::temp_dir());
    pipeline.register("recordings", recordings(2)).unwrap();
    pipeline.register("broken", PlaceSpec::derive(failing("broken", PlaceKind::Table), ["recordings"])).unwrap();

    let err = pipeline.place("broken").unwrap().compute(&RunContext::new()).unwrap_err();
    assert!(matches!(err, PipelineError::Transition { ref place, .. } if place == "broken"));
}

#[test]
fn progress_observer_sees_every_place() {
    let dir = work_dir();
    let pipeline = partitioned("progress", 6, 2, dir.path());
    pipeline["flat"].set_persist(true);
    let log = Arc::new(ProgressLog::new());

    let ctx = RunContext::new().with_progress(log.clone());
    pipeline.place("flat").unwrap().compute(&ctx).unwrap();

    assert_eq!(log.finished(), ["recordings", "npartitions", "recordings_bag", "flat"]);
    assert!(log
        .events()
        .iter()
        .any(|event| matches!(event, ProgressEvent::Persisted { place, .. } if place == "flat")));
}

#[test]
fn literal_place_computes_to_itself() {
    let mut pipeline = Pipeline::new("literal", std::env::temp_dir());
    let table: Table = (0..3).map(|i| row([("x", i)])).collect();
    pipeline.register("table", table.clone()).unwrap();
    assert_eq!(
        pipeline.place("table").unwrap().compute(&RunContext::new()).unwrap(),
        Value::Table(table)
    );
}

proptest! {
    #[test]
    fn partitions_are_complete_and_ordered(rows in 0usize..60, npartitions in 1usize..12) {
        let pipeline = partitioned("completeness", rows, npartitions, &std::env::temp_dir());
        let bag = pipeline
            .place("recordings_bag")
            .unwrap()
            .compute(&RunContext::new())
            .unwrap()
            .into_bag()
            .unwrap();

        prop_assert_eq!(bag.npartitions(), npartitions);
        let lengths = bag.partition_lengths();
        let max = lengths.iter().copied().max().unwrap_or(0);
        let min = lengths.iter().copied().min().unwrap_or(0);
        prop_assert!(max - min <= 1);
        let expected: Vec<i64> = (0..rows as i64).collect();
        prop_assert_eq!(ids(&bag.concat(), "id"), expected);
    }

    #[test]
    fn feed_never_leaks_between_calls(rows in 1usize..40, registered in 1usize..8, fed in 1usize..8) {
        let pipeline = partitioned("feed_isolation", rows, registered, &std::env::temp_dir());
        let place = pipeline.place("recordings_bag").unwrap();

        let fed_bag = place
            .compute(&RunContext::new().with_override("npartitions", fed))
            .unwrap()
            .into_bag()
            .unwrap();
        prop_assert_eq!(fed_bag.npartitions(), fed);

        let plain = place.compute(&RunContext::new()).unwrap().into_bag().unwrap();
        prop_assert_eq!(plain.npartitions(), registered);
        prop_assert_eq!(pipeline["npartitions"].literal().cloned(), Some(Value::scalar(registered)));
    }
}
