use canopy_pipeline::{
    ConcatBag, FnTransition, InlineClient, PartitionTable, Pipeline, PipelineError, PlaceKind, PlaceSpec, RunContext,
    ScalarCheck, TokioClient, Transition,
};
use canopy_table::{Table, Value};
use canopy_test_utils::{counting, failing, recordings, work_dir};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn flat_pipeline(name: &str, rows: usize, counter: Arc<AtomicUsize>) -> Pipeline {
    flat_pipeline_in(name, rows, counter, &std::env::temp_dir())
}

fn flat_pipeline_in(name: &str, rows: usize, counter: Arc<AtomicUsize>, work_dir: &Path) -> Pipeline {
    let mut pipeline = Pipeline::new(name, work_dir);
    pipeline.register("recordings", recordings(rows)).unwrap();
    pipeline
        .register("npartitions", PlaceSpec::checked(3, ScalarCheck::AtLeast(1)))
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
        .register(
            "counted",
            PlaceSpec::derive(counting("counted", PlaceKind::Table, counter), ["flat"]),
        )
        .unwrap();
    pipeline
}

fn slow(name: &str, delay: Duration) -> Arc<dyn Transition> {
    FnTransition::new(name, PlaceKind::Table, move |inputs: Vec<Value>, _feed| {
        std::thread::sleep(delay);
        Ok(inputs.into_iter().next().unwrap_or_else(|| Value::Table(Table::new())))
    })
    .shared()
}

#[test]
fn inline_future_runs_lazily() {
    let counter = Arc::new(AtomicUsize::new(0));
    let pipeline = flat_pipeline("inline_lazy", 9, counter.clone());
    let place = pipeline.place("counted").unwrap();

    let future = place.future(&RunContext::new()).unwrap();
    assert_eq!(future.tasks().len(), 5);
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    let evaluation = futures::executor::block_on(future).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(evaluation.value, place.compute(&RunContext::new()).unwrap());
}

#[test]
fn explicit_inline_client_matches_local_walk() {
    let pipeline = flat_pipeline("inline_client", 7, Arc::default());
    let place = pipeline.place("flat").unwrap();

    let local = place.evaluate(&RunContext::new()).unwrap();
    let inline = place
        .evaluate(&RunContext::new().with_client(Arc::new(InlineClient::new())))
        .unwrap();
    assert_eq!(inline.value, local.value);
    assert_eq!(inline.report.evaluated(), local.report.evaluated());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tokio_future_resolves_with_feed() {
    let client = TokioClient::current(2).unwrap();
    let pipeline = flat_pipeline("tokio_future", 10, Arc::default());
    let ctx = RunContext::new()
        .with_client(Arc::new(client))
        .with_override("npartitions", 5);

    let bag = pipeline
        .place("recordings_bag")
        .unwrap()
        .future(&ctx)
        .unwrap()
        .await
        .unwrap()
        .into_value()
        .into_bag()
        .unwrap();
    assert_eq!(bag.npartitions(), 5);
    assert_eq!(bag.concat(), recordings(10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failure_surfaces_on_the_handle() {
    let client = TokioClient::current(2).unwrap();
    let mut pipeline = Pipeline::new("tokio_failure", std::env::temp_dir());
    pipeline.register("recordings", recordings(3)).unwrap();
    pipeline
        .register("broken", PlaceSpec::derive(failing("broken", PlaceKind::Table), ["recordings"]))
        .unwrap();
    pipeline
        .register(
            "after",
            PlaceSpec::derive(counting("after", PlaceKind::Table, Arc::default()), ["broken"]),
        )
        .unwrap();

    let future = pipeline
        .place("after")
        .unwrap()
        .future(&RunContext::new().with_client(Arc::new(client)))
        .unwrap();
    let err = future.await.unwrap_err();
    assert!(matches!(err, PipelineError::Transition { ref place, .. } if place == "broken"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_stops_downstream_tasks() {
    let client = TokioClient::current(2).unwrap();
    let downstream = Arc::new(AtomicUsize::new(0));
    let mut pipeline = Pipeline::new("tokio_cancel", std::env::temp_dir());
    pipeline.register("recordings", recordings(3)).unwrap();
    pipeline
        .register(
            "slow",
            PlaceSpec::derive(slow("slow", Duration::from_millis(300)), ["recordings"]),
        )
        .unwrap();
    pipeline
        .register(
            "after",
            PlaceSpec::derive(counting("after", PlaceKind::Table, downstream.clone()), ["slow"]),
        )
        .unwrap();

    let future = pipeline
        .place("after")
        .unwrap()
        .future(&RunContext::new().with_client(Arc::new(client)))
        .unwrap();
    future.cancel();
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(downstream.load(Ordering::SeqCst), 0);
    assert!(future.await.unwrap_err().is_cancelled());
}

#[test]
fn compute_blocks_on_a_client() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let client = TokioClient::new(runtime.handle().clone(), 3);
    let dir = work_dir();

    let pipeline = flat_pipeline_in("compute_client", 11, Arc::default(), dir.path());
    pipeline["flat"].set_persist(true);

    let place = pipeline.place("flat").unwrap();
    let remote = place
        .evaluate(&RunContext::new().with_client(Arc::new(client)))
        .unwrap();
    assert_eq!(remote.value, Value::Table(recordings(11)));
    assert!(remote.report.persisted().contains_key("flat"));
    assert_eq!(place.read().unwrap(), remote.value);
}

#[test]
fn pending_place_resolves_through_its_handle() {
    let upstream = flat_pipeline("pending_upstream", 6, Arc::default());
    let handle = upstream.place("flat").unwrap().future(&RunContext::new()).unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let mut downstream = Pipeline::new("pending_downstream", std::env::temp_dir());
    downstream.register("flat", handle).unwrap();
    downstream
        .register(
            "copy",
            PlaceSpec::derive(counting("copy", PlaceKind::Table, counter.clone()), ["flat"]),
        )
        .unwrap();

    let local = downstream.place("copy").unwrap().compute(&RunContext::new()).unwrap();
    let via_future = futures::executor::block_on(downstream.place("copy").unwrap().future(&RunContext::new()).unwrap())
        .unwrap()
        .into_value();
    assert_eq!(local, Value::Table(recordings(6)));
    assert_eq!(via_future, local);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn cancelling_a_downstream_walk_leaves_the_pending_handle_alone() {
    let upstream = flat_pipeline("cancel_upstream", 6, Arc::default());
    let handle = upstream.place("flat").unwrap().future(&RunContext::new()).unwrap();

    let mut downstream = Pipeline::new("cancel_downstream", std::env::temp_dir());
    downstream.register("flat", handle.clone()).unwrap();
    downstream
        .register(
            "copy",
            PlaceSpec::derive(counting("copy", PlaceKind::Table, Arc::default()), ["flat"]),
        )
        .unwrap();

    let walk = downstream.place("copy").unwrap().future(&RunContext::new()).unwrap();
    walk.cancel();
    assert!(futures::executor::block_on(walk).unwrap_err().is_cancelled());

    let upstream_value = futures::executor::block_on(handle).unwrap().into_value();
    assert_eq!(upstream_value, Value::Table(recordings(6)));
}
