//! Queues and exchanges shared by publisher, workers and aggregator.

use crate::error::BrokerError;
use crate::traits::Channel;
use crate::types::{ExchangeKind, QueueOptions};
use montecarlo_types::{WorkerId, MODEL_EXCHANGE, MODEL_QUEUE, RESULT_QUEUE, SCENARIO_QUEUE};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the model reaches workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelDelivery {
    /// Fan-out exchange with last-value retention; each worker binds its own
    /// queue and receives its own copy.
    #[default]
    Broadcast,
    /// One durable `modelQueue` that workers pull from. A pull removes the
    /// message, so only the first worker obtains the model.
    SharedQueue,
}

impl fmt::Display for ModelDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast => f.write_str("broadcast"),
            Self::SharedQueue => f.write_str("shared-queue"),
        }
    }
}

impl std::str::FromStr for ModelDelivery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broadcast" => Ok(Self::Broadcast),
            "shared-queue" => Ok(Self::SharedQueue),
            other => Err(format!(
                "unknown model delivery '{other}' (expected broadcast or shared-queue)"
            )),
        }
    }
}

/// Declare the three durable work queues.
///
/// Every participant declares them on startup so that whichever process
/// comes first creates them.
pub fn declare_work_queues<C: Channel + ?Sized>(channel: &C) -> Result<(), BrokerError> {
    for queue in [MODEL_QUEUE, SCENARIO_QUEUE, RESULT_QUEUE] {
        channel.declare_queue(queue, QueueOptions::durable())?;
    }
    Ok(())
}

/// Declare the fan-out exchange that broadcasts the model.
///
/// The exchange retains the last model so workers that bind after the
/// publish still receive it.
pub fn declare_model_exchange<C: Channel + ?Sized>(channel: &C) -> Result<(), BrokerError> {
    channel.declare_exchange(MODEL_EXCHANGE, ExchangeKind::Fanout { retain_last: true })
}

/// Name of a worker's private model queue in broadcast mode.
pub fn worker_model_queue(worker: &WorkerId) -> String {
    format!("{MODEL_QUEUE}.{worker}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_delivery_names() {
        assert_eq!(ModelDelivery::default(), ModelDelivery::Broadcast);
        assert_eq!(
            "shared-queue".parse::<ModelDelivery>().unwrap(),
            ModelDelivery::SharedQueue
        );
        assert_eq!(ModelDelivery::SharedQueue.to_string(), "shared-queue");
        assert!("fanout".parse::<ModelDelivery>().is_err());
    }

    #[test]
    fn test_worker_model_queue_name() {
        let worker = WorkerId::new("worker-42-0");
        assert_eq!(worker_model_queue(&worker), "modelQueue.worker-42-0");
    }
}
