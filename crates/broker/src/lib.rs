//! Transport-independent message broker interface.
//!
//! This crate contains the pieces shared by every broker backend:
//!
//! - [`traits`]: the [`Broker`] and [`Channel`] interfaces
//! - [`types`]: queue options, exchange kinds, message properties, deliveries
//! - [`codec`]: JSON encode/decode of [`QueueMessage`](montecarlo_types::QueueMessage) bodies
//! - [`topology`]: declaration of the queues and exchange a run uses
//!
//! The semantics follow an AMQP 0-9-1 style broker: durable queues, a default
//! exchange routing by queue name, fan-out exchanges, per-channel prefetch,
//! and manual acknowledgement with redelivery of unacknowledged messages.

pub mod codec;
mod error;
pub mod topology;
pub mod traits;
pub mod types;

pub use codec::{decode_message, encode_message, CodecError};
pub use error::BrokerError;
pub use topology::{declare_model_exchange, declare_work_queues, worker_model_queue, ModelDelivery};
pub use traits::{Broker, Channel};
pub use types::{
    Consumer, ConsumerTag, Delivery, DeliveryTag, ExchangeKind, MessageProperties, QueueInfo,
    QueueOptions, DEFAULT_EXCHANGE,
};
