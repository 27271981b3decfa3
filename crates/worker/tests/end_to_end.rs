//! A single worker against a published model and scenario stream.

use crossbeam::channel::bounded;
use montecarlo_publisher::{PublisherConfig, TaskPublisher};
use montecarlo_test_helpers::{fixtures, wait_until, TestBroker};
use montecarlo_types::{Model, ResultMessage, WorkerId, RESULT_QUEUE, SCENARIO_QUEUE};
use montecarlo_worker::{StopReason, WorkerConfig, WorkerRuntime};
use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

fn worker_config(id: &str) -> WorkerConfig {
    WorkerConfig {
        worker_id: WorkerId::new(id),
        model_poll_interval: Duration::from_millis(10),
        ..WorkerConfig::default()
    }
}

#[test]
fn test_sum_model_three_scenarios() {
    let broker = TestBroker::new();
    let publisher = TaskPublisher::connect(broker.broker(), PublisherConfig::default()).unwrap();
    let model = Model::parse(fixtures::SUM_MODEL_TEXT).unwrap();
    publisher.publish_model(&model).unwrap();
    publisher
        .publish_scenarios(&model, 3, fixtures::seeded_rng(42))
        .unwrap();

    let (shutdown_tx, shutdown_rx) = bounded(1);
    let handle = {
        let broker = broker.handle();
        thread::spawn(move || {
            WorkerRuntime::new(broker, worker_config("solo"))
                .run(&shutdown_rx)
                .unwrap()
        })
    };

    assert!(wait_until(Duration::from_secs(5), || broker.depth(RESULT_QUEUE) == 3));
    shutdown_tx.send(()).unwrap();
    let report = handle.join().unwrap();

    assert!(report.model_loaded);
    assert_eq!(report.stop_reason, StopReason::Shutdown);
    assert_eq!(report.stats.processed, 3);
    assert_eq!(report.stats.results_published, 3);

    let results: Vec<ResultMessage> = broker.drain(RESULT_QUEUE);
    assert_eq!(results.len(), 3);
    let ids: BTreeSet<u64> = results.iter().map(|r| r.scenario_id.get()).collect();
    assert_eq!(ids, BTreeSet::from([1, 2, 3]));
    for result in &results {
        assert_eq!(result.worker_id, WorkerId::new("solo"));
        let value = result.result.unwrap();
        assert!((0.0..=2.0).contains(&value), "{value}");
    }
    assert_eq!(broker.depth(SCENARIO_QUEUE), 0);
}

#[test]
fn test_crashed_worker_scenario_is_redelivered() {
    let broker = TestBroker::new();
    let publisher = TaskPublisher::connect(broker.broker(), PublisherConfig::default()).unwrap();
    let model = fixtures::sum_model();
    publisher.publish_model(&model).unwrap();
    publisher
        .publish_scenarios(&model, 5, fixtures::seeded_rng(7))
        .unwrap();

    // Processes two scenarios, then stops holding the third.
    let (_never_tx, never_rx) = bounded(1);
    let crashed = WorkerRuntime::new(
        broker.handle(),
        WorkerConfig {
            max_scenarios: Some(2),
            ..worker_config("crashed")
        },
    )
    .run(&never_rx)
    .unwrap();
    assert_eq!(crashed.stop_reason, StopReason::ScenarioLimit);
    assert_eq!(crashed.stats.processed, 2);
    assert_eq!(broker.depth(SCENARIO_QUEUE), 3);

    let (shutdown_tx, shutdown_rx) = bounded(1);
    let handle = {
        let broker = broker.handle();
        thread::spawn(move || {
            WorkerRuntime::new(broker, worker_config("survivor"))
                .run(&shutdown_rx)
                .unwrap()
        })
    };
    assert!(wait_until(Duration::from_secs(5), || broker.depth(RESULT_QUEUE) == 5));
    shutdown_tx.send(()).unwrap();
    let survivor = handle.join().unwrap();

    assert_eq!(survivor.stats.processed, 3);
    assert_eq!(survivor.stats.redelivered, 1);

    let results: Vec<ResultMessage> = broker.drain(RESULT_QUEUE);
    let ids: BTreeSet<u64> = results.iter().map(|r| r.scenario_id.get()).collect();
    assert_eq!(ids, (1..=5).collect());
}
