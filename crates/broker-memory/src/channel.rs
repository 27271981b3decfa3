//! Channel implementation for the in-process broker.

use crate::broker::BrokerState;
use crate::ChannelId;
use montecarlo_broker::{
    BrokerError, Channel, Consumer, ConsumerTag, Delivery, DeliveryTag, ExchangeKind,
    MessageProperties, QueueInfo, QueueOptions,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// A channel on a [`MemoryBroker`](crate::MemoryBroker).
///
/// Each call takes the broker lock for its duration. Dropping the channel
/// closes it.
pub struct MemoryChannel {
    id: ChannelId,
    state: Arc<Mutex<BrokerState>>,
}

impl std::fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChannel").field("id", &self.id).finish()
    }
}

impl MemoryChannel {
    pub(crate) fn new(id: ChannelId, state: Arc<Mutex<BrokerState>>) -> Self {
        Self { id, state }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }
}

impl Channel for MemoryChannel {
    fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<QueueInfo, BrokerError> {
        self.state.lock().declare_queue(self.id, name, options)
    }

    fn delete_queue(&self, name: &str) -> Result<usize, BrokerError> {
        self.state.lock().delete_queue(self.id, name)
    }

    fn purge_queue(&self, name: &str) -> Result<usize, BrokerError> {
        self.state.lock().purge_queue(self.id, name)
    }

    fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<(), BrokerError> {
        self.state.lock().declare_exchange(self.id, name, kind)
    }

    fn bind_queue(&self, queue: &str, exchange: &str) -> Result<(), BrokerError> {
        self.state.lock().bind_queue(self.id, queue, exchange)
    }

    fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        self.state.lock().set_prefetch(self.id, count)
    }

    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
        properties: MessageProperties,
    ) -> Result<(), BrokerError> {
        self.state
            .lock()
            .publish(self.id, exchange, routing_key, body, properties)
    }

    fn get(&self, queue: &str) -> Result<Option<Delivery>, BrokerError> {
        self.state.lock().get(self.id, queue)
    }

    fn consume(&self, queue: &str) -> Result<Consumer, BrokerError> {
        self.state.lock().consume(self.id, queue)
    }

    fn cancel(&self, consumer: &ConsumerTag) -> Result<(), BrokerError> {
        self.state.lock().cancel(self.id, consumer)
    }

    fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError> {
        self.state.lock().ack(self.id, tag)
    }

    fn reject(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError> {
        self.state.lock().reject(self.id, tag, requeue)
    }

    fn close(&self) -> Result<(), BrokerError> {
        self.state.lock().close_channel(self.id);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().is_open(self.id)
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.state.lock().close_channel(self.id);
    }
}
