//! The aggregator consuming a live result queue.

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use montecarlo_aggregator::{
    spawn_renderer, AggregatorConfig, Renderer, ResultAggregator, ResultSnapshot,
};
use montecarlo_broker_memory::MemoryBroker;
use montecarlo_test_helpers::{wait_until, TestBroker};
use montecarlo_types::{ResultMessage, ScenarioId, WorkerId, RESULT_QUEUE};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing_test::traced_test;

fn result(worker: &str, scenario: u64, value: Option<f64>) -> ResultMessage {
    ResultMessage {
        worker_id: WorkerId::new(worker),
        scenario_id: ScenarioId(scenario),
        result: value,
    }
}

fn fast_config(dedup: bool) -> AggregatorConfig {
    AggregatorConfig {
        snapshot_interval: Duration::from_millis(10),
        dedup,
        histogram_bins: 4,
    }
}

type AggregatorHandle = JoinHandle<Arc<ResultSnapshot>>;

fn spawn_aggregator(
    broker: MemoryBroker,
    config: AggregatorConfig,
    snapshots: Sender<Arc<ResultSnapshot>>,
) -> (Sender<()>, AggregatorHandle) {
    let (shutdown_tx, shutdown_rx) = bounded(1);
    let handle = thread::spawn(move || {
        let mut aggregator = ResultAggregator::new(broker, config);
        aggregator.run(&snapshots, &shutdown_rx).unwrap()
    });
    (shutdown_tx, handle)
}

fn drained(broker: &TestBroker) -> bool {
    broker.depth(RESULT_QUEUE) == 0 && broker.broker().unacked_count(RESULT_QUEUE) == 0
}

#[test]
fn test_results_are_aggregated_and_acked() {
    let broker = TestBroker::new();
    broker.publish(RESULT_QUEUE, &result("w1", 1, Some(1.0)));
    broker.publish(RESULT_QUEUE, &result("w2", 2, Some(3.0)));
    broker.publish(RESULT_QUEUE, &result("w1", 3, Some(5.0)));
    broker.publish(RESULT_QUEUE, &result("w1", 4, None));

    let (snapshot_tx, _snapshot_rx) = unbounded();
    let (shutdown, handle) = spawn_aggregator(broker.handle(), fast_config(false), snapshot_tx);

    assert!(wait_until(Duration::from_secs(5), || drained(&broker)));
    shutdown.send(()).unwrap();
    let last = handle.join().unwrap();

    assert_eq!(last.total, 4);
    assert_eq!(last.count, 3);
    assert_eq!(last.mean, Some(3.0));
    assert_eq!(last.std_dev, Some(2.0));
    assert_eq!(last.min, Some(1.0));
    assert_eq!(last.max, Some(5.0));
    assert_eq!(
        last.per_worker,
        vec![(WorkerId::new("w1"), 3), (WorkerId::new("w2"), 1)]
    );

    let stats = broker.broker().stats();
    assert_eq!(stats.queue(RESULT_QUEUE).acked, 4);
}

#[test]
fn test_duplicates_counted_unless_dedup() {
    for (dedup, expected_total) in [(false, 3), (true, 2)] {
        let broker = TestBroker::new();
        broker.publish(RESULT_QUEUE, &result("w1", 1, Some(1.0)));
        broker.publish(RESULT_QUEUE, &result("w1", 2, Some(2.0)));
        broker.publish(RESULT_QUEUE, &result("w2", 1, Some(4.0)));

        let (snapshot_tx, _snapshot_rx) = unbounded();
        let (shutdown, handle) =
            spawn_aggregator(broker.handle(), fast_config(dedup), snapshot_tx);
        assert!(wait_until(Duration::from_secs(5), || drained(&broker)));
        shutdown.send(()).unwrap();
        let last = handle.join().unwrap();

        assert_eq!(last.total, expected_total, "dedup = {dedup}");
        assert_eq!(last.duplicates, 1, "dedup = {dedup}");
    }
}

#[traced_test]
#[test]
fn test_malformed_result_is_dropped() {
    let broker = TestBroker::new();
    broker.publish_raw(RESULT_QUEUE, b"{\"worker_id\": \"w1\"");
    broker.publish(RESULT_QUEUE, &result("w1", 1, Some(2.0)));

    // Run on the test thread so the aggregator's events land in this test's span.
    let (shutdown_tx, shutdown_rx) = bounded(1);
    let watched = broker.handle();
    let watcher = thread::spawn(move || {
        let drained = wait_until(Duration::from_secs(5), || {
            watched.queue_depth(RESULT_QUEUE) == Some(0) && watched.unacked_count(RESULT_QUEUE) == 0
        });
        shutdown_tx.send(()).unwrap();
        drained
    });

    let (snapshot_tx, _snapshot_rx) = unbounded();
    let mut aggregator = ResultAggregator::new(broker.handle(), fast_config(false));
    let last = aggregator.run(&snapshot_tx, &shutdown_rx).unwrap();
    assert!(watcher.join().unwrap());

    assert_eq!(last.total, 1);
    assert!(logs_contain("Dropping malformed result"));
}

#[derive(Default)]
struct Collecting {
    totals: Vec<usize>,
}

impl Renderer for Collecting {
    fn render(&mut self, snapshot: &ResultSnapshot) {
        self.totals.push(snapshot.total);
    }
}

fn renderer_for(rx: Receiver<Arc<ResultSnapshot>>) -> JoinHandle<Collecting> {
    spawn_renderer(Collecting::default(), rx)
}

#[test]
fn test_renderer_sees_growing_snapshots() {
    let broker = TestBroker::new();
    let (snapshot_tx, snapshot_rx) = unbounded();
    let renderer = renderer_for(snapshot_rx);
    let (shutdown, handle) = spawn_aggregator(broker.handle(), fast_config(false), snapshot_tx);

    for scenario in 1..=5 {
        broker.publish(RESULT_QUEUE, &result("w1", scenario, Some(scenario as f64)));
        thread::sleep(Duration::from_millis(15));
    }
    assert!(wait_until(Duration::from_secs(5), || drained(&broker)));
    shutdown.send(()).unwrap();
    handle.join().unwrap();

    // The aggregator dropped its sender, so the renderer loop ends.
    let collected = renderer.join().unwrap();
    assert!(collected.totals.len() >= 2);
    assert!(collected.totals.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(collected.totals.last(), Some(&5));
}

#[test]
fn test_snapshot_survives_renderer_exit() {
    let broker = TestBroker::new();
    broker.publish(RESULT_QUEUE, &result("w1", 1, Some(1.0)));

    let (snapshot_tx, snapshot_rx) = unbounded();
    drop(snapshot_rx);
    let (shutdown, handle) = spawn_aggregator(broker.handle(), fast_config(false), snapshot_tx);
    assert!(wait_until(Duration::from_secs(5), || drained(&broker)));
    shutdown.send(()).unwrap();

    assert_eq!(handle.join().unwrap().total, 1);
}
