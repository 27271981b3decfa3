//! Run orchestration.

use crate::config::SimulatorConfig;
use crate::report::{Completion, SimulationReport};
use crossbeam::channel::{bounded, never, unbounded, Receiver};
use montecarlo_aggregator::{
    spawn_renderer, AggregatorError, LogRenderer, Renderer, ResultAggregator,
};
use montecarlo_broker_memory::MemoryBroker;
use montecarlo_publisher::{PublishError, TaskPublisher};
use montecarlo_types::{Model, RESULT_QUEUE, SCENARIO_QUEUE};
use montecarlo_worker::{WorkerError, WorkerReport, WorkerRuntime};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// How often the queues are inspected while waiting for the run to drain.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Aggregator error: {0}")]
    Aggregator(#[from] AggregatorError),

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("{0} thread panicked")]
    Panicked(String),
}

/// One complete run in a single process: a publisher, a pool of worker
/// threads and an aggregator, all connected to one [`MemoryBroker`].
///
/// The run is over once every scenario has been consumed and every result
/// aggregated, or when the timeout passes. Workers are then stopped
/// abruptly, followed by the aggregator.
pub struct Simulator {
    config: SimulatorConfig,
    model: Model,
    broker: MemoryBroker,
}

impl Simulator {
    pub fn new(config: SimulatorConfig, model: Model) -> Result<Self, SimulationError> {
        if config.workers.count == 0 {
            return Err(SimulationError::InvalidConfig(
                "workers.count must be at least 1".into(),
            ));
        }
        if config.aggregator.histogram_bins == 0 {
            return Err(SimulationError::InvalidConfig(
                "aggregator.histogram_bins must be at least 1".into(),
            ));
        }
        Ok(Self {
            config,
            model,
            broker: MemoryBroker::new(),
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Handle to the broker the run uses.
    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    /// Run to completion, logging snapshots as they arrive.
    pub fn run(self) -> Result<SimulationReport, SimulationError> {
        self.run_with(LogRenderer::default(), &never())
    }

    /// Run with a custom renderer. A message on `interrupt`, or its sender
    /// being dropped, ends the wait early.
    pub fn run_with<R>(
        self,
        renderer: R,
        interrupt: &Receiver<()>,
    ) -> Result<SimulationReport, SimulationError>
    where
        R: Renderer + 'static,
    {
        let started = Instant::now();
        let seed = self.config.run.seed.unwrap_or_else(rand::random);
        info!(
            workers = self.config.workers.count,
            scenarios = self.config.run.scenarios,
            seed,
            model_delivery = %self.config.workers.model_delivery,
            "Starting simulation"
        );

        let (snapshot_tx, snapshot_rx) = unbounded();
        let renderer = spawn_renderer(renderer, snapshot_rx);

        let (aggregator_stop_tx, aggregator_stop_rx) = bounded::<()>(0);
        let aggregator = {
            let mut aggregator =
                ResultAggregator::new(self.broker.clone(), self.config.aggregator_config());
            aggregator.connect()?;
            thread::Builder::new()
                .name("aggregator".into())
                .spawn(move || aggregator.run(&snapshot_tx, &aggregator_stop_rx))?
        };

        // Dropping the sender stops every worker at once.
        let (worker_stop_tx, worker_stop_rx) = bounded::<()>(0);
        let workers = (0..self.config.workers.count)
            .map(|index| {
                let mut runtime =
                    WorkerRuntime::new(self.broker.clone(), self.config.worker_config(index));
                let shutdown = worker_stop_rx.clone();
                thread::Builder::new()
                    .name(format!("worker-{index}"))
                    .spawn(move || runtime.run(&shutdown))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let publisher = TaskPublisher::connect(&self.broker, self.config.publisher_config())?;
        publisher.publish_model(&self.model)?;
        let published = publisher.publish_scenarios(
            &self.model,
            self.config.run.scenarios,
            ChaCha8Rng::seed_from_u64(seed),
        )?;
        publisher.close()?;

        let completion = self.wait_for_drain(interrupt);
        info!(%completion, elapsed = ?started.elapsed(), "Stopping workers");

        drop(worker_stop_tx);
        let mut workers_out: Vec<WorkerReport> = Vec::with_capacity(workers.len());
        let mut worker_error = None;
        for handle in workers {
            match join(handle, "worker")? {
                Ok(report) => workers_out.push(report),
                Err(e) => {
                    worker_error.get_or_insert(e);
                }
            }
        }

        drop(aggregator_stop_tx);
        let snapshot = join(aggregator, "aggregator")??;
        join(renderer, "renderer")?;

        if let Some(e) = worker_error {
            return Err(e.into());
        }

        let report = SimulationReport {
            seed,
            completion,
            elapsed: started.elapsed(),
            published,
            snapshot,
            workers: workers_out,
            broker: self.broker.stats(),
        };
        info!(
            completion = %report.completion,
            results = report.snapshot.total,
            mean = ?report.snapshot.mean,
            "Simulation finished"
        );
        Ok(report)
    }

    fn wait_for_drain(&self, interrupt: &Receiver<()>) -> Completion {
        let deadline = Instant::now() + self.config.timeout();
        loop {
            if self.drained() {
                return Completion::Drained;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    pending_scenarios = self.pending(SCENARIO_QUEUE),
                    pending_results = self.pending(RESULT_QUEUE),
                    "Timed out waiting for the run to drain"
                );
                return Completion::TimedOut;
            }
            crossbeam::channel::select! {
                recv(interrupt) -> _ => {
                    warn!("Interrupted");
                    return Completion::Interrupted;
                }
                default(DRAIN_POLL_INTERVAL.min(deadline - now)) => {}
            }
        }
    }

    /// Ready plus unacknowledged messages in a queue.
    fn pending(&self, queue: &str) -> usize {
        self.broker.queue_depth(queue).unwrap_or(0) + self.broker.unacked_count(queue)
    }

    /// Results are published before their scenario is acknowledged, so once
    /// both queues are empty every result has reached the aggregator.
    fn drained(&self) -> bool {
        self.pending(SCENARIO_QUEUE) == 0 && self.pending(RESULT_QUEUE) == 0
    }
}

fn join<T>(handle: JoinHandle<T>, name: &str) -> Result<T, SimulationError> {
    handle
        .join()
        .map_err(|_| SimulationError::Panicked(name.to_string()))
}
