//! Value types exchanged with a broker.

use crossbeam::channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Name of the default exchange, which routes to the queue named by the
/// routing key.
pub const DEFAULT_EXCHANGE: &str = "";

/// Options for declaring a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueOptions {
    /// Survives a broker restart.
    pub durable: bool,
    /// Owned by the declaring channel; deleted when that channel closes.
    pub exclusive: bool,
    /// Deleted once its last consumer goes away.
    pub auto_delete: bool,
}

impl QueueOptions {
    /// A durable, shared queue.
    pub fn durable() -> Self {
        Self {
            durable: true,
            ..Self::default()
        }
    }

    /// A private queue that lives only as long as its channel.
    pub fn exclusive() -> Self {
        Self {
            durable: false,
            exclusive: true,
            auto_delete: true,
        }
    }
}

/// Exchange routing behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Routes to queues bound under the routing key.
    Direct,
    /// Copies every message to each bound queue.
    ///
    /// With `retain_last`, the exchange keeps the most recent message and
    /// delivers it to any queue bound later, until the message expires.
    Fanout { retain_last: bool },
}

/// Per-message publish properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageProperties {
    /// Survives a broker restart when stored in a durable queue.
    pub persistent: bool,
    /// Time after publish when the message is discarded if still queued.
    pub expiration: Option<Duration>,
}

impl MessageProperties {
    pub fn persistent() -> Self {
        Self {
            persistent: true,
            expiration: None,
        }
    }

    pub fn with_expiration(mut self, ttl: Duration) -> Self {
        self.expiration = Some(ttl);
        self
    }
}

/// Broker-assigned identifier of one delivery, used to ack or reject it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTag(pub u64);

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broker-assigned identifier of a consumer subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerTag(pub String);

impl fmt::Display for ConsumerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message handed to a client, pending acknowledgement.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: DeliveryTag,
    /// Queue the message was taken from.
    pub queue: String,
    pub body: Arc<[u8]>,
    /// Set when the message was previously delivered and not acknowledged.
    pub redelivered: bool,
    pub properties: MessageProperties,
}

/// Result of declaring a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub name: String,
    /// Ready messages at declaration time.
    pub message_count: usize,
    pub consumer_count: usize,
}

/// A push subscription on a queue.
///
/// The broker sends deliveries into the subscription as the channel's
/// prefetch window allows. When the broker cancels the subscription (channel
/// closed, queue deleted, broker restarted) the receiver disconnects.
#[derive(Debug)]
pub struct Consumer {
    tag: ConsumerTag,
    queue: String,
    deliveries: Receiver<Delivery>,
}

impl Consumer {
    pub fn new(tag: ConsumerTag, queue: impl Into<String>, deliveries: Receiver<Delivery>) -> Self {
        Self {
            tag,
            queue: queue.into(),
            deliveries,
        }
    }

    pub fn tag(&self) -> &ConsumerTag {
        &self.tag
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// The underlying receiver, for use in `crossbeam::select!`.
    pub fn receiver(&self) -> &Receiver<Delivery> {
        &self.deliveries
    }

    pub fn try_recv(&self) -> Result<Delivery, TryRecvError> {
        self.deliveries.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Delivery, RecvTimeoutError> {
        self.deliveries.recv_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_option_presets() {
        let durable = QueueOptions::durable();
        assert!(durable.durable && !durable.exclusive && !durable.auto_delete);

        let exclusive = QueueOptions::exclusive();
        assert!(!exclusive.durable && exclusive.exclusive && exclusive.auto_delete);
    }

    #[test]
    fn test_persistent_with_expiration() {
        let props = MessageProperties::persistent().with_expiration(Duration::from_secs(600));
        assert!(props.persistent);
        assert_eq!(props.expiration, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_consumer_disconnects_when_sender_dropped() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let consumer = Consumer::new(ConsumerTag("ctag-1".into()), "scenarioQueue", rx);
        drop(tx);
        assert!(matches!(consumer.try_recv(), Err(TryRecvError::Disconnected)));
        assert_eq!(consumer.queue(), "scenarioQueue");
    }
}
