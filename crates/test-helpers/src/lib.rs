//! Test helpers for Monte Carlo runs.
//!
//! Provides ready-made models, a broker with the run topology declared, and
//! helpers to drain queues and wait on asynchronous progress.
//!
//! # Example
//!
//! ```rust
//! use montecarlo_test_helpers::{fixtures, TestBroker};
//! use montecarlo_types::SCENARIO_QUEUE;
//!
//! let broker = TestBroker::new();
//! assert_eq!(broker.depth(SCENARIO_QUEUE), 0);
//!
//! let model = fixtures::sum_model();
//! assert_eq!(model.function, "x + y");
//! ```

pub mod fixtures;

use montecarlo_broker::{
    declare_model_exchange, declare_work_queues, Broker, Channel, MessageProperties,
    DEFAULT_EXCHANGE,
};
use montecarlo_broker_memory::{MemoryBroker, MemoryChannel};
use montecarlo_types::QueueMessage;
use std::time::{Duration, Instant};

/// A [`MemoryBroker`] with the work queues and model exchange declared, plus
/// a control channel for inspecting queues from the test.
pub struct TestBroker {
    broker: MemoryBroker,
    control: MemoryChannel,
}

impl std::fmt::Debug for TestBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestBroker")
            .field("open_channels", &self.broker.open_channels())
            .finish()
    }
}

impl Default for TestBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl TestBroker {
    pub fn new() -> Self {
        let broker = MemoryBroker::new();
        let control = broker
            .open_channel()
            .expect("open control channel");
        declare_work_queues(&control).expect("declare work queues");
        declare_model_exchange(&control).expect("declare model exchange");
        Self { broker, control }
    }

    /// Another handle to the broker, to hand to the code under test.
    pub fn handle(&self) -> MemoryBroker {
        self.broker.clone()
    }

    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    pub fn control(&self) -> &MemoryChannel {
        &self.control
    }

    pub fn depth(&self, queue: &str) -> usize {
        self.broker.queue_depth(queue).unwrap_or(0)
    }

    /// Publish a message to a queue through the default exchange.
    pub fn publish<M: QueueMessage>(&self, queue: &str, message: &M) {
        self.control
            .publish_message(
                DEFAULT_EXCHANGE,
                queue,
                message,
                MessageProperties::persistent(),
            )
            .expect("publish");
    }

    /// Publish a raw body to a queue through the default exchange.
    pub fn publish_raw(&self, queue: &str, body: &[u8]) {
        self.control
            .publish(
                DEFAULT_EXCHANGE,
                queue,
                body.to_vec(),
                MessageProperties::persistent(),
            )
            .expect("publish");
    }

    /// Pull, acknowledge and decode every ready message in a queue.
    pub fn drain<M: QueueMessage>(&self, queue: &str) -> Vec<M> {
        let mut messages = Vec::new();
        while let Some(delivery) = self.control.get(queue).expect("get") {
            self.control.ack(delivery.tag).expect("ack");
            messages.push(
                montecarlo_broker::decode_message(&delivery.body).expect("decode drained message"),
            );
        }
        messages
    }
}

/// Poll `condition` until it holds or `timeout` passes.
///
/// Returns whether the condition held.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}
