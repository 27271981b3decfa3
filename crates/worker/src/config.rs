use montecarlo_broker::ModelDelivery;
use montecarlo_types::WorkerId;
use std::time::Duration;

/// Configuration for [`WorkerRuntime`](crate::WorkerRuntime).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: WorkerId,

    /// Unacknowledged deliveries allowed on the worker's channel. One gives
    /// fair dispatch across competing workers.
    pub prefetch: u16,

    /// Backoff between model pull attempts.
    pub model_poll_interval: Duration,

    pub model_delivery: ModelDelivery,

    /// Stop consuming after this many deliveries, leaving any delivery
    /// already pushed to the worker unacknowledged.
    pub max_scenarios: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: WorkerId::for_process(0),
            prefetch: 1,
            model_poll_interval: Duration::from_secs(3),
            model_delivery: ModelDelivery::default(),
            max_scenarios: None,
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, worker_id: WorkerId) -> Self {
        self.worker_id = worker_id;
        self
    }
}
