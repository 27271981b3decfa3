use montecarlo_broker::ModelDelivery;
use montecarlo_types::MODEL_TTL;
use std::time::Duration;

/// Configuration for [`TaskPublisher`](crate::TaskPublisher).
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub model_delivery: ModelDelivery,
    /// Retention window of the published model.
    pub model_ttl: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            model_delivery: ModelDelivery::default(),
            model_ttl: MODEL_TTL,
        }
    }
}
