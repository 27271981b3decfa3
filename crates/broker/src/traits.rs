//! Broker and channel interfaces.
//!
//! Implemented by the in-process backend (`montecarlo-broker-memory`). A
//! networked client would implement the same two traits.

use crate::codec;
use crate::error::BrokerError;
use crate::types::{
    Consumer, ConsumerTag, Delivery, DeliveryTag, ExchangeKind, MessageProperties, QueueInfo,
    QueueOptions,
};
use montecarlo_types::QueueMessage;

/// A broker connection from which channels are opened.
pub trait Broker: Send + Sync {
    type Channel: Channel + 'static;

    /// Open a new channel with its own prefetch window and delivery tags.
    fn open_channel(&self) -> Result<Self::Channel, BrokerError>;
}

/// A lightweight session on a broker connection.
///
/// Every operation fails with [`BrokerError::ChannelClosed`] once the channel
/// has been closed, either explicitly or by the broker. Dropping a channel
/// closes it: its unacknowledged deliveries are requeued with the
/// `redelivered` flag set and its exclusive queues are deleted.
pub trait Channel: Send {
    // ── Topology ──

    /// Declare a queue, creating it if absent.
    ///
    /// Redeclaring an existing queue with identical options is a no-op.
    fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<QueueInfo, BrokerError>;

    /// Delete a queue and its ready messages. Deleting an absent queue is not
    /// an error. Returns the number of messages dropped.
    fn delete_queue(&self, name: &str) -> Result<usize, BrokerError>;

    /// Drop all ready messages from a queue. Returns the number dropped.
    fn purge_queue(&self, name: &str) -> Result<usize, BrokerError>;

    fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<(), BrokerError>;

    /// Bind a queue to an exchange. A fan-out exchange retaining a message
    /// delivers a copy of it to the newly bound queue.
    fn bind_queue(&self, queue: &str, exchange: &str) -> Result<(), BrokerError>;

    // ── Flow control ──

    /// Limit the number of unacknowledged deliveries on this channel.
    /// Zero means unlimited.
    fn set_prefetch(&self, count: u16) -> Result<(), BrokerError>;

    // ── Messaging ──

    /// Publish a body through an exchange. Messages that route to no queue
    /// are dropped.
    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
        properties: MessageProperties,
    ) -> Result<(), BrokerError>;

    /// Pull one message without subscribing. Returns `None` when the queue
    /// has no ready message. The delivery must be acknowledged.
    fn get(&self, queue: &str) -> Result<Option<Delivery>, BrokerError>;

    /// Subscribe to a queue with manual acknowledgement.
    fn consume(&self, queue: &str) -> Result<Consumer, BrokerError>;

    fn cancel(&self, consumer: &ConsumerTag) -> Result<(), BrokerError>;

    fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError>;

    /// Reject a delivery, either requeueing it or dropping it.
    fn reject(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError>;

    // ── Lifecycle ──

    fn close(&self) -> Result<(), BrokerError>;

    fn is_open(&self) -> bool;

    // ── Typed helpers ──

    /// Encode and publish a queue message.
    fn publish_message<M: QueueMessage>(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &M,
        properties: MessageProperties,
    ) -> Result<(), BrokerError>
    where
        Self: Sized,
    {
        let body = codec::encode_message(message)?;
        self.publish(exchange, routing_key, body, properties)
    }
}
