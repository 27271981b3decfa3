//! How the model reaches workers that start before it is published.

use crossbeam::channel::{bounded, Sender};
use montecarlo_broker::ModelDelivery;
use montecarlo_broker_memory::MemoryBroker;
use montecarlo_publisher::{PublisherConfig, TaskPublisher};
use montecarlo_test_helpers::{fixtures, wait_until, TestBroker};
use montecarlo_types::{ResultMessage, WorkerId, RESULT_QUEUE};
use montecarlo_worker::{WorkerConfig, WorkerReport, WorkerRuntime, WorkerState};
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn config(id: &str, delivery: ModelDelivery) -> WorkerConfig {
    WorkerConfig {
        worker_id: WorkerId::new(id),
        model_poll_interval: Duration::from_millis(10),
        model_delivery: delivery,
        ..WorkerConfig::default()
    }
}

fn spawn_worker(
    broker: MemoryBroker,
    config: WorkerConfig,
) -> (Sender<()>, JoinHandle<WorkerReport>) {
    let (shutdown_tx, shutdown_rx) = bounded(1);
    let handle = thread::spawn(move || {
        WorkerRuntime::new(broker, config)
            .run(&shutdown_rx)
            .unwrap()
    });
    (shutdown_tx, handle)
}

#[test]
fn test_shared_queue_model_reaches_exactly_one_worker() {
    let broker = TestBroker::new();
    let mut first = WorkerRuntime::new(broker.handle(), config("a", ModelDelivery::SharedQueue));
    let mut second = WorkerRuntime::new(broker.handle(), config("b", ModelDelivery::SharedQueue));
    first.bootstrap().unwrap();
    second.bootstrap().unwrap();
    assert!(!first.acquire_model().unwrap());
    assert!(!second.acquire_model().unwrap());

    let publisher = TaskPublisher::connect(
        broker.broker(),
        PublisherConfig {
            model_delivery: ModelDelivery::SharedQueue,
            ..Default::default()
        },
    )
    .unwrap();
    publisher.publish_model(&fixtures::sum_model()).unwrap();

    let loaded = [first.acquire_model().unwrap(), second.acquire_model().unwrap()];
    assert_eq!(loaded, [true, false]);

    // The loser keeps polling an empty queue.
    for _ in 0..5 {
        assert!(!second.acquire_model().unwrap());
    }
    assert_eq!(first.state(), WorkerState::Ready);
    assert_eq!(second.state(), WorkerState::AwaitingModel);
}

#[test]
fn test_broadcast_model_reaches_every_worker() {
    let broker = TestBroker::new();
    let mut workers: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|id| WorkerRuntime::new(broker.handle(), config(id, ModelDelivery::Broadcast)))
        .collect();
    for worker in &mut workers[..2] {
        worker.bootstrap().unwrap();
        assert!(!worker.acquire_model().unwrap());
    }

    let publisher = TaskPublisher::connect(broker.broker(), PublisherConfig::default()).unwrap();
    publisher.publish_model(&fixtures::sum_model()).unwrap();

    // The third worker starts after the publish.
    workers[2].bootstrap().unwrap();

    for worker in &mut workers {
        assert!(worker.acquire_model().unwrap(), "{} missed the model", worker.worker_id());
        assert_eq!(worker.model(), Some(&fixtures::sum_model()));
    }
}

#[test]
fn test_concurrent_workers_in_each_mode() {
    for (delivery, expected_loaded) in [(ModelDelivery::SharedQueue, 1), (ModelDelivery::Broadcast, 2)] {
        let broker = TestBroker::new();
        let workers: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|id| spawn_worker(broker.handle(), config(id, delivery)))
            .collect();

        // Both workers are connected before the model exists.
        assert!(wait_until(Duration::from_secs(5), || {
            broker.broker().open_channels() >= 3
        }));

        let publisher = TaskPublisher::connect(
            broker.broker(),
            PublisherConfig {
                model_delivery: delivery,
                ..Default::default()
            },
        )
        .unwrap();
        let model = fixtures::sum_model();
        publisher.publish_model(&model).unwrap();
        publisher
            .publish_scenarios(&model, 20, fixtures::seeded_rng(3))
            .unwrap();

        assert!(wait_until(Duration::from_secs(10), || {
            broker.depth(RESULT_QUEUE) == 20
        }));

        let reports: Vec<WorkerReport> = workers
            .into_iter()
            .map(|(shutdown, handle)| {
                shutdown.send(()).unwrap();
                handle.join().unwrap()
            })
            .collect();
        let loaded = reports.iter().filter(|r| r.model_loaded).count();
        assert_eq!(loaded, expected_loaded, "{delivery}");

        let results: Vec<ResultMessage> = broker.drain(RESULT_QUEUE);
        assert_eq!(results.len(), 20);
    }
}
