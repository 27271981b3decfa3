use crate::codec::CodecError;
use crate::types::{ConsumerTag, DeliveryTag};
use thiserror::Error;

/// Errors returned by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Channel is closed")]
    ChannelClosed,

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Exchange not found: {0}")]
    ExchangeNotFound(String),

    #[error("Queue {0} is exclusive to another channel")]
    ResourceLocked(String),

    #[error("Queue {0} already declared with different options")]
    PreconditionFailed(String),

    #[error("Unknown delivery tag {0}")]
    UnknownDeliveryTag(DeliveryTag),

    #[error("Unknown consumer {0}")]
    UnknownConsumer(ConsumerTag),

    #[error("Consumer {0} was cancelled by the broker")]
    ConsumerCancelled(ConsumerTag),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl BrokerError {
    /// Whether the error means the connection is unusable and the caller
    /// should give up rather than retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ChannelClosed | Self::ConsumerCancelled(_))
    }
}
