//! Broker state and routing.

use crate::channel::MemoryChannel;
use crate::stats::{BrokerStats, ConsumerStats, QueueStats};
use crate::ChannelId;
use crossbeam::channel::Sender;
use montecarlo_broker::{
    Broker, BrokerError, Consumer, ConsumerTag, Delivery, DeliveryTag, ExchangeKind,
    MessageProperties, QueueInfo, QueueOptions, DEFAULT_EXCHANGE,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};

// ═══════════════════════════════════════════════════════════════════════
// Stored state
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct StoredMessage {
    body: Arc<[u8]>,
    properties: MessageProperties,
    expires_at: Option<Instant>,
    redelivered: bool,
    /// Exchange whose retained value this message is, if any.
    retained_from: Option<Arc<str>>,
}

impl StoredMessage {
    fn new(body: Vec<u8>, properties: MessageProperties, now: Instant) -> Self {
        Self {
            body: body.into(),
            properties,
            expires_at: properties.expiration.map(|ttl| now + ttl),
            redelivered: false,
            retained_from: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug)]
struct ConsumerSlot {
    tag: ConsumerTag,
    channel: ChannelId,
    sender: Sender<Delivery>,
}

#[derive(Debug)]
struct Queue {
    options: QueueOptions,
    /// Declaring channel of an exclusive queue.
    owner: Option<ChannelId>,
    messages: VecDeque<StoredMessage>,
    consumers: Vec<ConsumerSlot>,
    /// Round-robin position in `consumers`.
    cursor: usize,
}

impl Queue {
    fn new(options: QueueOptions, owner: Option<ChannelId>) -> Self {
        Self {
            options,
            owner,
            messages: VecDeque::new(),
            consumers: Vec::new(),
            cursor: 0,
        }
    }

    fn check_access(&self, name: &str, channel: ChannelId) -> Result<(), BrokerError> {
        match self.owner {
            Some(owner) if owner != channel => Err(BrokerError::ResourceLocked(name.to_string())),
            _ => Ok(()),
        }
    }

    fn drop_expired(&mut self, now: Instant) -> u64 {
        let before = self.messages.len();
        self.messages.retain(|m| !m.is_expired(now));
        (before - self.messages.len()) as u64
    }

    /// Next consumer, starting from the cursor, whose channel has room in
    /// its prefetch window.
    fn next_ready_consumer(&self, channels: &HashMap<ChannelId, ChannelState>) -> Option<usize> {
        let n = self.consumers.len();
        (0..n)
            .map(|i| (self.cursor + i) % n)
            .find(|&i| {
                channels
                    .get(&self.consumers[i].channel)
                    .is_some_and(ChannelState::has_capacity)
            })
    }
}

#[derive(Debug)]
struct Exchange {
    kind: ExchangeKind,
    bindings: Vec<String>,
    retained: Option<StoredMessage>,
}

#[derive(Debug)]
struct Unacked {
    queue: String,
    message: StoredMessage,
}

#[derive(Debug, Default)]
struct ChannelState {
    prefetch: u16,
    unacked: BTreeMap<DeliveryTag, Unacked>,
}

impl ChannelState {
    /// Pulled and pushed deliveries both count against the window.
    fn has_capacity(&self) -> bool {
        self.prefetch == 0 || self.unacked.len() < usize::from(self.prefetch)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Broker state
// ═══════════════════════════════════════════════════════════════════════

/// Everything the broker holds, guarded by one lock.
#[derive(Debug, Default)]
pub(crate) struct BrokerState {
    queues: HashMap<String, Queue>,
    exchanges: HashMap<String, Exchange>,
    channels: HashMap<ChannelId, ChannelState>,
    queue_stats: BTreeMap<String, QueueStats>,
    consumer_stats: Vec<ConsumerStats>,
    unroutable: u64,
    restarts: u64,
    next_channel: ChannelId,
    next_delivery: u64,
    next_consumer: u64,
}

impl BrokerState {
    fn ensure_open(&self, channel: ChannelId) -> Result<(), BrokerError> {
        if self.channels.contains_key(&channel) {
            Ok(())
        } else {
            Err(BrokerError::ChannelClosed)
        }
    }

    fn queue_mut(&mut self, name: &str, channel: ChannelId) -> Result<&mut Queue, BrokerError> {
        let queue = self
            .queues
            .get_mut(name)
            .ok_or_else(|| BrokerError::QueueNotFound(name.to_string()))?;
        queue.check_access(name, channel)?;
        Ok(queue)
    }

    pub(crate) fn is_open(&self, channel: ChannelId) -> bool {
        self.channels.contains_key(&channel)
    }

    fn open_channel(&mut self) -> ChannelId {
        self.next_channel += 1;
        let id = self.next_channel;
        self.channels.insert(id, ChannelState::default());
        trace!(channel = id, "Channel opened");
        id
    }

    // ── Topology ──

    pub(crate) fn declare_queue(
        &mut self,
        channel: ChannelId,
        name: &str,
        options: QueueOptions,
    ) -> Result<QueueInfo, BrokerError> {
        self.ensure_open(channel)?;

        if let Some(queue) = self.queues.get_mut(name) {
            queue.check_access(name, channel)?;
            if queue.options != options {
                return Err(BrokerError::PreconditionFailed(name.to_string()));
            }
            queue.drop_expired(Instant::now());
            return Ok(QueueInfo {
                name: name.to_string(),
                message_count: queue.messages.len(),
                consumer_count: queue.consumers.len(),
            });
        }

        let owner = options.exclusive.then_some(channel);
        self.queues
            .insert(name.to_string(), Queue::new(options, owner));
        self.queue_stats.entry(name.to_string()).or_default();
        debug!(
            queue = name,
            durable = options.durable,
            exclusive = options.exclusive,
            "Queue declared"
        );

        Ok(QueueInfo {
            name: name.to_string(),
            message_count: 0,
            consumer_count: 0,
        })
    }

    pub(crate) fn delete_queue(
        &mut self,
        channel: ChannelId,
        name: &str,
    ) -> Result<usize, BrokerError> {
        self.ensure_open(channel)?;
        match self.queues.get(name) {
            None => return Ok(0),
            Some(queue) => queue.check_access(name, channel)?,
        }
        Ok(self.remove_queue(name))
    }

    /// Remove a queue with its bindings. Its consumers are cancelled by
    /// dropping their senders.
    fn remove_queue(&mut self, name: &str) -> usize {
        let Some(queue) = self.queues.remove(name) else {
            return 0;
        };
        for exchange in self.exchanges.values_mut() {
            exchange.bindings.retain(|b| b != name);
        }
        montecarlo_metrics::set_queue_depth(name, 0);
        debug!(
            queue = name,
            dropped = queue.messages.len(),
            consumers = queue.consumers.len(),
            "Queue deleted"
        );
        queue.messages.len()
    }

    pub(crate) fn purge_queue(
        &mut self,
        channel: ChannelId,
        name: &str,
    ) -> Result<usize, BrokerError> {
        self.ensure_open(channel)?;
        let queue = self.queue_mut(name, channel)?;
        let dropped = queue.messages.len();
        queue.messages.clear();
        montecarlo_metrics::set_queue_depth(name, 0);
        debug!(queue = name, dropped, "Queue purged");
        Ok(dropped)
    }

    pub(crate) fn declare_exchange(
        &mut self,
        channel: ChannelId,
        name: &str,
        kind: ExchangeKind,
    ) -> Result<(), BrokerError> {
        self.ensure_open(channel)?;
        if name == DEFAULT_EXCHANGE {
            return Err(BrokerError::PreconditionFailed(name.to_string()));
        }
        match self.exchanges.get(name) {
            Some(exchange) if exchange.kind != kind => {
                Err(BrokerError::PreconditionFailed(name.to_string()))
            }
            Some(_) => Ok(()),
            None => {
                self.exchanges.insert(
                    name.to_string(),
                    Exchange {
                        kind,
                        bindings: Vec::new(),
                        retained: None,
                    },
                );
                debug!(exchange = name, ?kind, "Exchange declared");
                Ok(())
            }
        }
    }

    pub(crate) fn bind_queue(
        &mut self,
        channel: ChannelId,
        queue: &str,
        exchange: &str,
    ) -> Result<(), BrokerError> {
        self.ensure_open(channel)?;
        self.queue_mut(queue, channel)?;
        let now = Instant::now();
        let ex = self
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BrokerError::ExchangeNotFound(exchange.to_string()))?;

        if ex.bindings.iter().any(|b| b == queue) {
            return Ok(());
        }
        ex.bindings.push(queue.to_string());

        let retained = match ex.kind {
            ExchangeKind::Fanout { retain_last: true } => {
                ex.retained.clone().filter(|m| !m.is_expired(now))
            }
            _ => None,
        };
        debug!(queue, exchange, retained = retained.is_some(), "Queue bound");

        if let Some(message) = retained {
            self.enqueue(queue, message);
            self.dispatch(queue);
        }
        Ok(())
    }

    // ── Flow control ──

    pub(crate) fn set_prefetch(&mut self, channel: ChannelId, count: u16) -> Result<(), BrokerError> {
        let state = self
            .channels
            .get_mut(&channel)
            .ok_or(BrokerError::ChannelClosed)?;
        state.prefetch = count;
        trace!(channel, prefetch = count, "Prefetch set");
        self.dispatch_all();
        Ok(())
    }

    // ── Messaging ──

    pub(crate) fn publish(
        &mut self,
        channel: ChannelId,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
        properties: MessageProperties,
    ) -> Result<(), BrokerError> {
        self.ensure_open(channel)?;
        let mut message = StoredMessage::new(body, properties, Instant::now());

        let mut retained = false;
        let targets: Vec<String> = if exchange == DEFAULT_EXCHANGE {
            if self.queues.contains_key(routing_key) {
                vec![routing_key.to_string()]
            } else {
                Vec::new()
            }
        } else {
            let ex = self
                .exchanges
                .get_mut(exchange)
                .ok_or_else(|| BrokerError::ExchangeNotFound(exchange.to_string()))?;
            match ex.kind {
                ExchangeKind::Direct => ex
                    .bindings
                    .iter()
                    .filter(|b| *b == routing_key)
                    .cloned()
                    .collect(),
                ExchangeKind::Fanout { retain_last } => {
                    if retain_last {
                        message.retained_from = Some(exchange.into());
                        ex.retained = Some(message.clone());
                        retained = true;
                    }
                    ex.bindings.clone()
                }
            }
        };

        if targets.is_empty() && !retained {
            self.unroutable += 1;
            debug!(exchange, routing_key, "Message unroutable, dropped");
            return Ok(());
        }

        trace!(exchange, routing_key, queues = targets.len(), "Message published");
        for target in &targets {
            if retained {
                self.drop_superseded(target, exchange);
            }
            self.enqueue(target, message.clone());
            self.dispatch(target);
        }
        Ok(())
    }

    /// Remove queued copies of an earlier retained value of `exchange`.
    /// Copies already delivered and awaiting ack are left alone.
    fn drop_superseded(&mut self, name: &str, exchange: &str) {
        let Some(queue) = self.queues.get_mut(name) else {
            return;
        };
        let before = queue.messages.len();
        queue
            .messages
            .retain(|m| m.retained_from.as_deref() != Some(exchange));
        let dropped = before - queue.messages.len();
        if dropped > 0 {
            debug!(queue = name, exchange, dropped, "Superseded retained message dropped");
        }
    }

    fn enqueue(&mut self, name: &str, message: StoredMessage) {
        if let Some(queue) = self.queues.get_mut(name) {
            queue.messages.push_back(message);
            self.queue_stats.entry(name.to_string()).or_default().published += 1;
        }
    }

    fn next_tag(&mut self) -> DeliveryTag {
        self.next_delivery += 1;
        DeliveryTag(self.next_delivery)
    }

    pub(crate) fn get(
        &mut self,
        channel: ChannelId,
        name: &str,
    ) -> Result<Option<Delivery>, BrokerError> {
        self.ensure_open(channel)?;
        let now = Instant::now();
        let queue = self.queue_mut(name, channel)?;
        let expired = queue.drop_expired(now);
        let message = queue.messages.pop_front();

        let stats = self.queue_stats.entry(name.to_string()).or_default();
        stats.expired += expired;
        let Some(message) = message else {
            return Ok(None);
        };
        stats.delivered += 1;
        if message.redelivered {
            stats.redelivered += 1;
        }

        let tag = self.next_tag();
        let delivery = Delivery {
            tag,
            queue: name.to_string(),
            body: message.body.clone(),
            redelivered: message.redelivered,
            properties: message.properties,
        };
        if let Some(state) = self.channels.get_mut(&channel) {
            state.unacked.insert(
                tag,
                Unacked {
                    queue: name.to_string(),
                    message,
                },
            );
        }
        trace!(queue = name, channel, tag = tag.0, "Message pulled");
        self.update_gauges(name);
        Ok(Some(delivery))
    }

    pub(crate) fn consume(&mut self, channel: ChannelId, name: &str) -> Result<Consumer, BrokerError> {
        self.ensure_open(channel)?;
        self.queue_mut(name, channel)?;

        self.next_consumer += 1;
        let tag = ConsumerTag(format!("ctag-{channel}.{}", self.next_consumer));
        let (sender, receiver) = crossbeam::channel::unbounded();

        if let Some(queue) = self.queues.get_mut(name) {
            queue.consumers.push(ConsumerSlot {
                tag: tag.clone(),
                channel,
                sender,
            });
        }
        self.consumer_stats.push(ConsumerStats {
            tag: tag.clone(),
            queue: name.to_string(),
            delivered: 0,
            peak_unacked: 0,
        });
        debug!(queue = name, consumer = %tag, "Consumer registered");

        self.dispatch(name);
        Ok(Consumer::new(tag, name, receiver))
    }

    pub(crate) fn cancel(&mut self, channel: ChannelId, tag: &ConsumerTag) -> Result<(), BrokerError> {
        self.ensure_open(channel)?;
        let found = self.queues.iter_mut().find_map(|(name, queue)| {
            let index = queue
                .consumers
                .iter()
                .position(|c| &c.tag == tag && c.channel == channel)?;
            queue.consumers.remove(index);
            let emptied = queue.consumers.is_empty() && queue.options.auto_delete;
            Some((name.clone(), emptied))
        });

        match found {
            None => Err(BrokerError::UnknownConsumer(tag.clone())),
            Some((name, emptied)) => {
                debug!(queue = %name, consumer = %tag, "Consumer cancelled");
                if emptied {
                    self.remove_queue(&name);
                }
                Ok(())
            }
        }
    }

    pub(crate) fn ack(&mut self, channel: ChannelId, tag: DeliveryTag) -> Result<(), BrokerError> {
        let state = self
            .channels
            .get_mut(&channel)
            .ok_or(BrokerError::ChannelClosed)?;
        let unacked = state
            .unacked
            .remove(&tag)
            .ok_or(BrokerError::UnknownDeliveryTag(tag))?;

        self.queue_stats.entry(unacked.queue.clone()).or_default().acked += 1;
        trace!(queue = %unacked.queue, channel, tag = tag.0, "Message acked");
        self.dispatch_all();
        self.update_gauges(&unacked.queue);
        Ok(())
    }

    pub(crate) fn reject(
        &mut self,
        channel: ChannelId,
        tag: DeliveryTag,
        requeue: bool,
    ) -> Result<(), BrokerError> {
        let state = self
            .channels
            .get_mut(&channel)
            .ok_or(BrokerError::ChannelClosed)?;
        let unacked = state
            .unacked
            .remove(&tag)
            .ok_or(BrokerError::UnknownDeliveryTag(tag))?;

        self.queue_stats.entry(unacked.queue.clone()).or_default().rejected += 1;
        trace!(queue = %unacked.queue, channel, tag = tag.0, requeue, "Message rejected");
        if requeue {
            self.requeue_front(&unacked.queue, unacked.message, Instant::now());
        }
        self.dispatch_all();
        self.update_gauges(&unacked.queue);
        Ok(())
    }

    /// Put a message back at the head of its queue, flagged as redelivered.
    /// Dropped if the queue is gone or the message has expired.
    fn requeue_front(&mut self, name: &str, mut message: StoredMessage, now: Instant) {
        if message.is_expired(now) {
            self.queue_stats.entry(name.to_string()).or_default().expired += 1;
            return;
        }
        if let Some(queue) = self.queues.get_mut(name) {
            message.redelivered = true;
            queue.messages.push_front(message);
        }
    }

    // ── Lifecycle ──

    pub(crate) fn close_channel(&mut self, channel: ChannelId) {
        let Some(state) = self.channels.remove(&channel) else {
            return;
        };
        let now = Instant::now();

        let mut to_delete = Vec::new();
        for (name, queue) in self.queues.iter_mut() {
            let before = queue.consumers.len();
            queue.consumers.retain(|c| c.channel != channel);
            let emptied = before > 0 && queue.consumers.is_empty() && queue.options.auto_delete;
            if queue.owner == Some(channel) || emptied {
                to_delete.push(name.clone());
            }
        }

        // Newest first so the oldest ends up at the head.
        let requeued = state.unacked.len();
        let mut touched = Vec::new();
        for (_, unacked) in state.unacked.into_iter().rev() {
            if !touched.contains(&unacked.queue) {
                touched.push(unacked.queue.clone());
            }
            self.requeue_front(&unacked.queue, unacked.message, now);
        }

        for name in &to_delete {
            self.remove_queue(name);
        }
        debug!(channel, requeued, deleted = to_delete.len(), "Channel closed");

        self.dispatch_all();
        for name in &touched {
            self.update_gauges(name);
        }
    }

    fn restart(&mut self) {
        let channels: Vec<ChannelId> = self.channels.keys().copied().collect();
        for channel in channels {
            self.close_channel(channel);
        }

        self.queues.retain(|_, q| q.options.durable);
        for queue in self.queues.values_mut() {
            queue.messages.retain(|m| m.properties.persistent);
            queue.consumers.clear();
            queue.cursor = 0;
            queue.owner = None;
        }
        let queues = &self.queues;
        for exchange in self.exchanges.values_mut() {
            exchange.bindings.retain(|b| queues.contains_key(b));
            if exchange
                .retained
                .as_ref()
                .is_some_and(|m| !m.properties.persistent)
            {
                exchange.retained = None;
            }
        }
        self.restarts += 1;
        info!(
            queues = self.queues.len(),
            restarts = self.restarts,
            "Broker restarted"
        );
    }

    // ── Dispatch ──

    /// Push ready messages to consumers with spare prefetch, round-robin.
    fn dispatch(&mut self, name: &str) {
        {
            let BrokerState {
                queues,
                channels,
                queue_stats,
                consumer_stats,
                next_delivery,
                ..
            } = self;
            let Some(queue) = queues.get_mut(name) else {
                return;
            };
            let stats = queue_stats.entry(name.to_string()).or_default();
            stats.expired += queue.drop_expired(Instant::now());

            while !queue.messages.is_empty() {
                let Some(index) = queue.next_ready_consumer(channels) else {
                    break;
                };
                let Some(message) = queue.messages.pop_front() else {
                    break;
                };
                *next_delivery += 1;
                let tag = DeliveryTag(*next_delivery);
                let slot = &queue.consumers[index];
                let delivery = Delivery {
                    tag,
                    queue: name.to_string(),
                    body: message.body.clone(),
                    redelivered: message.redelivered,
                    properties: message.properties,
                };

                if slot.sender.send(delivery).is_err() {
                    trace!(queue = name, consumer = %slot.tag, "Subscriber gone, dropping consumer");
                    queue.messages.push_front(message);
                    queue.consumers.remove(index);
                    continue;
                }

                let consumer_tag = slot.tag.clone();
                let channel_id = slot.channel;
                queue.cursor = index + 1;

                stats.delivered += 1;
                if message.redelivered {
                    stats.redelivered += 1;
                }
                let held = match channels.get_mut(&channel_id) {
                    Some(channel) => {
                        channel.unacked.insert(
                            tag,
                            Unacked {
                                queue: name.to_string(),
                                message,
                            },
                        );
                        channel.unacked.len()
                    }
                    None => 0,
                };
                if let Some(consumer) = consumer_stats.iter_mut().find(|c| c.tag == consumer_tag) {
                    consumer.delivered += 1;
                    consumer.peak_unacked = consumer.peak_unacked.max(held);
                }
                trace!(queue = name, consumer = %consumer_tag, tag = tag.0, "Message dispatched");
            }
        }
        self.update_gauges(name);
    }

    fn dispatch_all(&mut self) {
        let pending: Vec<String> = self
            .queues
            .iter()
            .filter(|(_, q)| !q.messages.is_empty() && !q.consumers.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        for name in pending {
            self.dispatch(&name);
        }
    }

    fn unacked_in(&self, name: &str) -> usize {
        self.channels
            .values()
            .flat_map(|c| c.unacked.values())
            .filter(|u| u.queue == name)
            .count()
    }

    fn update_gauges(&self, name: &str) {
        if let Some(queue) = self.queues.get(name) {
            montecarlo_metrics::set_queue_depth(name, queue.messages.len());
            montecarlo_metrics::set_queue_unacked(name, self.unacked_in(name));
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Public handle
// ═══════════════════════════════════════════════════════════════════════

/// In-process broker.
///
/// Cloning yields another handle to the same broker, the way several
/// processes connect to one server.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a broker restart.
    ///
    /// All channels are closed, requeueing their unacknowledged messages.
    /// Non-durable queues and non-persistent messages are lost.
    pub fn restart(&self) {
        self.state.lock().restart();
    }

    pub fn stats(&self) -> BrokerStats {
        let state = self.state.lock();
        BrokerStats {
            queues: state.queue_stats.clone(),
            consumers: state.consumer_stats.clone(),
            unroutable: state.unroutable,
            restarts: state.restarts,
        }
    }

    pub fn queue_exists(&self, name: &str) -> bool {
        self.state.lock().queues.contains_key(name)
    }

    /// Ready messages in a queue, after discarding expired ones.
    pub fn queue_depth(&self, name: &str) -> Option<usize> {
        let mut state = self.state.lock();
        let queue = state.queues.get_mut(name)?;
        let expired = queue.drop_expired(Instant::now());
        let depth = queue.messages.len();
        state.queue_stats.entry(name.to_string()).or_default().expired += expired;
        Some(depth)
    }

    /// Deliveries from a queue that are awaiting acknowledgement.
    pub fn unacked_count(&self, name: &str) -> usize {
        self.state.lock().unacked_in(name)
    }

    pub fn consumer_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(name)
            .map_or(0, |q| q.consumers.len())
    }

    pub fn open_channels(&self) -> usize {
        self.state.lock().channels.len()
    }
}

impl Broker for MemoryBroker {
    type Channel = MemoryChannel;

    fn open_channel(&self) -> Result<MemoryChannel, BrokerError> {
        let id = self.state.lock().open_channel();
        Ok(MemoryChannel::new(id, Arc::clone(&self.state)))
    }
}
