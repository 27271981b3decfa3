//! In-process message broker.
//!
//! Provides [`MemoryBroker`], an implementation of the
//! [`Broker`](montecarlo_broker::Broker) interface that keeps queues and
//! exchanges in memory and pushes deliveries to consumers over crossbeam
//! channels. It models the parts of an AMQP broker that the run protocol
//! relies on: durable queues, the default exchange, fan-out with last-value
//! retention, per-channel prefetch, manual acknowledgement, redelivery of
//! unacknowledged messages, message expiry, and broker restart.
//!
//! [`BrokerStats`] tracks per-queue and per-consumer counters for tests and
//! end-of-run reports.

mod broker;
mod channel;
mod stats;

pub use broker::MemoryBroker;
pub use channel::MemoryChannel;
pub use stats::{BrokerStats, ConsumerStats, QueueStats};

/// Identifier of a channel within one broker.
pub type ChannelId = u64;
