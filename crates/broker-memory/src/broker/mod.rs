use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use island_broker::{
    Consumer, Delivery, ExchangeKind, ExchangeOptions, MessageProperties, QueueInfo, QueueOptions,
    topic_matches,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{Error, Result};

pub(crate) type ConnectionId = u64;
pub(crate) type ChannelId = u64;

/// Routes straight to the queue named by the routing key.
const DEFAULT_EXCHANGE: &str = "";

const RESERVED_PREFIX: &str = "amq.";

/// A message that was rejected without requeue.
#[derive(Clone, Debug)]
pub struct DeadLetter {
    /// Queue the message was rejected from.
    pub queue: String,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Message properties.
    pub properties: MessageProperties,
    /// Raw body.
    pub body: Bytes,
}

#[derive(Clone, Debug)]
struct Message {
    exchange: String,
    routing_key: String,
    properties: MessageProperties,
    body: Bytes,
    redelivered: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Binding {
    queue: String,
    pattern: String,
}

#[derive(Debug)]
struct Exchange {
    kind: ExchangeKind,
    options: ExchangeOptions,
    bindings: Vec<Binding>,
}

impl Exchange {
    fn route(&self, routing_key: &str) -> Vec<String> {
        let mut queues: Vec<String> = Vec::new();
        for binding in &self.bindings {
            let hit = match self.kind {
                ExchangeKind::Direct => binding.pattern == routing_key,
                ExchangeKind::Fanout => true,
                ExchangeKind::Topic => topic_matches(routing_key, &binding.pattern),
            };
            if hit && !queues.contains(&binding.queue) {
                queues.push(binding.queue.clone());
            }
        }
        queues
    }
}

#[derive(Debug)]
struct ConsumerEntry {
    tag: String,
    channel: ChannelId,
    sender: mpsc::UnboundedSender<Delivery>,
}

#[derive(Debug)]
struct Queue {
    options: QueueOptions,
    owner: Option<ConnectionId>,
    ready: VecDeque<Message>,
    consumers: Vec<ConsumerEntry>,
    next_consumer: usize,
    ever_consumed: bool,
}

impl Queue {
    const fn new(options: QueueOptions, owner: Option<ConnectionId>) -> Self {
        Self {
            options,
            owner,
            ready: VecDeque::new(),
            consumers: Vec::new(),
            next_consumer: 0,
            ever_consumed: false,
        }
    }

    fn info(&self, name: &str) -> QueueInfo {
        QueueInfo {
            name: name.to_string(),
            message_count: self.ready.len(),
            consumer_count: self.consumers.len(),
        }
    }

    fn check_access(&self, name: &str, connection: ConnectionId) -> Result<()> {
        match self.owner {
            Some(owner) if owner != connection => Err(Error::ResourceLocked(format!(
                "queue '{name}' is exclusive to connection {owner}"
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug)]
struct Unacked {
    queue: String,
    channel: ChannelId,
    message: Message,
}

#[derive(Debug, Default)]
struct State {
    exchanges: HashMap<String, Exchange>,
    queues: HashMap<String, Queue>,
    unacked: HashMap<u64, Unacked>,
    dead_letters: Vec<DeadLetter>,
    connections: HashSet<ConnectionId>,
    channels: HashMap<ChannelId, ConnectionId>,
    last_id: u64,
    last_delivery_tag: u64,
}

impl State {
    const fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn connection_of(&self, channel: ChannelId) -> Result<ConnectionId> {
        self.channels
            .get(&channel)
            .copied()
            .ok_or(Error::ChannelClosed(channel))
    }

    fn queue(&self, name: &str) -> Result<&Queue> {
        self.queues
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("queue '{name}'")))
    }

    /// Hands ready messages to consumers, round-robin, until one side runs out.
    fn dispatch(&mut self, queue_name: &str) {
        loop {
            let Some(queue) = self.queues.get_mut(queue_name) else {
                return;
            };
            if queue.consumers.is_empty() {
                return;
            }
            let Some(message) = queue.ready.pop_front() else {
                return;
            };

            let index = queue.next_consumer % queue.consumers.len();
            let delivery_tag = self.last_delivery_tag + 1;
            let delivery = Delivery {
                delivery_tag,
                exchange: message.exchange.clone(),
                routing_key: message.routing_key.clone(),
                redelivered: message.redelivered,
                properties: message.properties.clone(),
                body: message.body.clone(),
            };

            let consumer = &queue.consumers[index];
            let channel = consumer.channel;
            if consumer.sender.send(delivery).is_ok() {
                trace!(queue = queue_name, delivery_tag, "delivered");
                queue.next_consumer = index + 1;
                self.last_delivery_tag = delivery_tag;
                self.unacked.insert(
                    delivery_tag,
                    Unacked {
                        queue: queue_name.to_string(),
                        channel,
                        message,
                    },
                );
            } else {
                let gone = queue.consumers.remove(index);
                debug!(queue = queue_name, consumer_tag = %gone.tag, "consumer dropped its stream");
                queue.ready.push_front(message);
            }
        }
    }

    fn requeue(&mut self, unacked: Unacked) {
        let Unacked {
            queue: queue_name,
            mut message,
            ..
        } = unacked;
        let Some(queue) = self.queues.get_mut(&queue_name) else {
            debug!(queue = %queue_name, "queue is gone, dropping requeued message");
            return;
        };
        message.redelivered = true;
        queue.ready.push_front(message);
        self.dispatch(&queue_name);
    }

    fn dead_letter(&mut self, unacked: Unacked) {
        let Unacked { queue, message, .. } = unacked;
        debug!(%queue, routing_key = %message.routing_key, "message dead-lettered");
        self.dead_letters.push(DeadLetter {
            queue,
            exchange: message.exchange,
            routing_key: message.routing_key,
            properties: message.properties,
            body: message.body,
        });
    }

    fn remove_bindings(&mut self, mut doomed: impl FnMut(&str, &Binding) -> bool) {
        self.exchanges.retain(|name, exchange| {
            let before = exchange.bindings.len();
            exchange.bindings.retain(|binding| !doomed(name.as_str(), binding));
            let emptied = before > 0 && exchange.bindings.is_empty();
            if emptied && exchange.options.auto_delete {
                debug!(exchange = %name, "auto-deleting exchange");
                return false;
            }
            true
        });
    }

    fn delete_queue(&mut self, name: &str) {
        if self.queues.remove(name).is_some() {
            debug!(queue = name, "queue deleted");
            self.remove_bindings(|_, binding| binding.queue == name);
        }
    }

    fn maybe_auto_delete(&mut self, name: &str) {
        let doomed = self.queues.get(name).is_some_and(|queue| {
            queue.options.auto_delete && queue.ever_consumed && queue.consumers.is_empty()
        });
        if doomed {
            self.delete_queue(name);
        }
    }

    fn close_channel(&mut self, channel: ChannelId) {
        if self.channels.remove(&channel).is_none() {
            return;
        }

        let mut affected = Vec::new();
        for (name, queue) in &mut self.queues {
            let before = queue.consumers.len();
            queue.consumers.retain(|consumer| consumer.channel != channel);
            if queue.consumers.len() != before {
                affected.push(name.clone());
            }
        }
        for name in &affected {
            self.maybe_auto_delete(name);
        }

        // Highest tag first so the oldest delivery ends up at the head again.
        let mut tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, unacked)| unacked.channel == channel)
            .map(|(tag, _)| *tag)
            .collect();
        tags.sort_unstable_by(|a, b| b.cmp(a));
        for tag in tags {
            if let Some(unacked) = self.unacked.remove(&tag) {
                self.requeue(unacked);
            }
        }
        debug!(channel, "channel closed");
    }

    fn close_connection(&mut self, connection: ConnectionId) {
        if !self.connections.remove(&connection) {
            return;
        }
        let channels: Vec<ChannelId> = self
            .channels
            .iter()
            .filter(|(_, owner)| **owner == connection)
            .map(|(channel, _)| *channel)
            .collect();
        for channel in channels {
            self.close_channel(channel);
        }
        let exclusive: Vec<String> = self
            .queues
            .iter()
            .filter(|(_, queue)| queue.owner == Some(connection))
            .map(|(name, _)| name.clone())
            .collect();
        for name in exclusive {
            self.delete_queue(&name);
        }
        debug!(connection, "connection closed");
    }
}

/// Shared state of an in-process broker.
///
/// Clones refer to the same broker.
#[derive(Clone, Debug, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

impl MemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all queues, sorted.
    #[must_use]
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// `(exchange, pattern)` pairs bound to `queue`, sorted.
    #[must_use]
    pub fn bindings(&self, queue: &str) -> Vec<(String, String)> {
        let state = self.state.lock();
        let mut bindings: Vec<(String, String)> = state
            .exchanges
            .iter()
            .flat_map(|(exchange, entry)| {
                entry
                    .bindings
                    .iter()
                    .filter(|binding| binding.queue == queue)
                    .map(|binding| (exchange.clone(), binding.pattern.clone()))
            })
            .collect();
        bindings.sort();
        bindings
    }

    /// Messages waiting in `queue`, `None` if it does not exist.
    #[must_use]
    pub fn message_count(&self, queue: &str) -> Option<usize> {
        self.state.lock().queues.get(queue).map(|q| q.ready.len())
    }

    /// Consumers registered on `queue`, `None` if it does not exist.
    #[must_use]
    pub fn consumer_count(&self, queue: &str) -> Option<usize> {
        self.state.lock().queues.get(queue).map(|q| q.consumers.len())
    }

    /// Deliveries handed out and not yet acked or nacked.
    #[must_use]
    pub fn unacked_count(&self) -> usize {
        self.state.lock().unacked.len()
    }

    /// Messages rejected without requeue, oldest first.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().dead_letters.clone()
    }

    pub(crate) fn open_connection(&self) -> ConnectionId {
        let mut state = self.state.lock();
        let connection = state.next_id();
        state.connections.insert(connection);
        debug!(connection, "connection opened");
        connection
    }

    pub(crate) fn is_connection_open(&self, connection: ConnectionId) -> bool {
        self.state.lock().connections.contains(&connection)
    }

    pub(crate) fn close_connection(&self, connection: ConnectionId) {
        self.state.lock().close_connection(connection);
    }

    pub(crate) fn open_channel(&self, connection: ConnectionId) -> Result<ChannelId> {
        let mut state = self.state.lock();
        if !state.connections.contains(&connection) {
            return Err(Error::ConnectionClosed(connection));
        }
        let channel = state.next_id();
        state.channels.insert(channel, connection);
        Ok(channel)
    }

    pub(crate) fn is_channel_open(&self, channel: ChannelId) -> bool {
        self.state.lock().channels.contains_key(&channel)
    }

    pub(crate) fn close_channel(&self, channel: ChannelId) {
        self.state.lock().close_channel(channel);
    }

    pub(crate) fn declare_exchange(
        &self,
        channel: ChannelId,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeOptions,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.connection_of(channel)?;
        if name == DEFAULT_EXCHANGE || name.starts_with(RESERVED_PREFIX) {
            return Err(Error::AccessRefused(format!(
                "exchange name '{name}' is reserved"
            )));
        }
        match state.exchanges.get(name) {
            Some(existing) if existing.kind != kind || existing.options != options => {
                Err(Error::PreconditionFailed(format!(
                    "exchange '{name}' already declared as {} with {:?}",
                    existing.kind, existing.options
                )))
            }
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(
                    name.to_string(),
                    Exchange {
                        kind,
                        options,
                        bindings: Vec::new(),
                    },
                );
                debug!(exchange = name, %kind, "exchange declared");
                Ok(())
            }
        }
    }

    pub(crate) fn declare_queue(
        &self,
        channel: ChannelId,
        name: &str,
        options: QueueOptions,
    ) -> Result<QueueInfo> {
        let mut state = self.state.lock();
        let connection = state.connection_of(channel)?;
        let name = if name.is_empty() {
            format!("{RESERVED_PREFIX}gen-{}", Uuid::new_v4().simple())
        } else {
            name.to_string()
        };

        if let Some(existing) = state.queues.get(&name) {
            existing.check_access(&name, connection)?;
            if existing.options != options {
                return Err(Error::PreconditionFailed(format!(
                    "queue '{name}' already declared with {:?}",
                    existing.options
                )));
            }
            return Ok(existing.info(&name));
        }

        let owner = options.exclusive.then_some(connection);
        state.queues.insert(name.clone(), Queue::new(options, owner));
        debug!(queue = %name, ?options, "queue declared");
        Ok(QueueInfo {
            name,
            message_count: 0,
            consumer_count: 0,
        })
    }

    pub(crate) fn bind(
        &self,
        channel: ChannelId,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let connection = state.connection_of(channel)?;
        state.queue(queue)?.check_access(queue, connection)?;
        if exchange == DEFAULT_EXCHANGE {
            return Err(Error::AccessRefused(
                "queues cannot be bound to the default exchange".to_string(),
            ));
        }
        let entry = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| Error::NotFound(format!("exchange '{exchange}'")))?;
        let binding = Binding {
            queue: queue.to_string(),
            pattern: pattern.to_string(),
        };
        if !entry.bindings.contains(&binding) {
            entry.bindings.push(binding);
            debug!(queue, exchange, pattern, "queue bound");
        }
        Ok(())
    }

    pub(crate) fn unbind(
        &self,
        channel: ChannelId,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let connection = state.connection_of(channel)?;
        state.queue(queue)?.check_access(queue, connection)?;
        if !state.exchanges.contains_key(exchange) {
            return Err(Error::NotFound(format!("exchange '{exchange}'")));
        }
        state.remove_bindings(|name, binding| {
            name == exchange && binding.queue == queue && binding.pattern == pattern
        });
        debug!(queue, exchange, pattern, "queue unbound");
        Ok(())
    }

    pub(crate) fn publish(
        &self,
        channel: ChannelId,
        exchange: &str,
        routing_key: &str,
        body: Bytes,
        properties: MessageProperties,
    ) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.connection_of(channel)?;

        let targets = if exchange == DEFAULT_EXCHANGE {
            if state.queues.contains_key(routing_key) {
                vec![routing_key.to_string()]
            } else {
                Vec::new()
            }
        } else {
            state
                .exchanges
                .get(exchange)
                .ok_or_else(|| Error::NotFound(format!("exchange '{exchange}'")))?
                .route(routing_key)
        };

        if targets.is_empty() {
            trace!(exchange, routing_key, "message unroutable, dropped");
            return Ok(());
        }

        let message = Message {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            properties,
            body,
            redelivered: false,
        };
        for target in targets {
            if let Some(queue) = state.queues.get_mut(&target) {
                queue.ready.push_back(message.clone());
            }
            state.dispatch(&target);
        }
        Ok(())
    }

    pub(crate) fn consume(&self, channel: ChannelId, queue_name: &str) -> Result<Consumer> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let connection = state.connection_of(channel)?;
        let queue = state
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| Error::NotFound(format!("queue '{queue_name}'")))?;
        queue.check_access(queue_name, connection)?;

        let tag = format!("ctag-{}", Uuid::new_v4().simple());
        let (sender, receiver) = mpsc::unbounded_channel();
        queue.consumers.push(ConsumerEntry {
            tag: tag.clone(),
            channel,
            sender,
        });
        queue.ever_consumed = true;
        debug!(queue = queue_name, consumer_tag = %tag, "consumer registered");

        state.dispatch(queue_name);
        Ok(Consumer::new(
            tag,
            queue_name,
            UnboundedReceiverStream::new(receiver),
        ))
    }

    pub(crate) fn cancel(&self, channel: ChannelId, consumer_tag: &str) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.connection_of(channel)?;

        let cancelled = state.queues.iter_mut().find_map(|(name, queue)| {
            let index = queue
                .consumers
                .iter()
                .position(|c| c.tag == consumer_tag && c.channel == channel)?;
            queue.consumers.remove(index);
            Some(name.clone())
        });

        match cancelled {
            Some(queue) => {
                debug!(%queue, consumer_tag, "consumer cancelled");
                state.maybe_auto_delete(&queue);
            }
            None => debug!(consumer_tag, "cancel for unknown consumer ignored"),
        }
        Ok(())
    }

    pub(crate) fn ack(&self, channel: ChannelId, delivery_tag: u64) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.connection_of(channel)?;
        take_unacked(state, channel, delivery_tag).map(|_| ())
    }

    pub(crate) fn nack(&self, channel: ChannelId, delivery_tag: u64, requeue: bool) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.connection_of(channel)?;
        let unacked = take_unacked(state, channel, delivery_tag)?;
        if requeue {
            state.requeue(unacked);
        } else {
            state.dead_letter(unacked);
        }
        Ok(())
    }
}

fn take_unacked(state: &mut State, channel: ChannelId, delivery_tag: u64) -> Result<Unacked> {
    let owned = state
        .unacked
        .get(&delivery_tag)
        .is_some_and(|unacked| unacked.channel == channel);
    if !owned {
        return Err(unknown_delivery_tag(delivery_tag));
    }
    state
        .unacked
        .remove(&delivery_tag)
        .ok_or_else(|| unknown_delivery_tag(delivery_tag))
}

fn unknown_delivery_tag(delivery_tag: u64) -> Error {
    Error::PreconditionFailed(format!("unknown delivery tag {delivery_tag}"))
}
