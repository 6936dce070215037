use async_trait::async_trait;
use bytes::Bytes;
use island_broker::{
    Channel, Consumer, ExchangeKind, ExchangeOptions, MessageProperties, QueueInfo, QueueOptions,
};

use crate::broker::{ChannelId, MemoryBroker};
use crate::error::{Error, Result};

/// A channel on a [`MemoryBroker`] connection.
#[derive(Clone, Debug)]
pub struct MemoryChannel {
    broker: MemoryBroker,
    id: ChannelId,
}

impl MemoryChannel {
    pub(crate) const fn new(broker: MemoryBroker, id: ChannelId) -> Self {
        Self { broker, id }
    }

    /// Broker-assigned channel id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Whether the channel is still usable.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.broker.is_channel_open(self.id)
    }

    /// Closes the channel: cancels its consumers and requeues its unacked deliveries.
    pub fn close(&self) {
        self.broker.close_channel(self.id);
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    type Error = Error;

    async fn assert_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeOptions,
    ) -> Result<()> {
        self.broker.declare_exchange(self.id, name, kind, options)
    }

    async fn assert_queue(&self, name: &str, options: QueueOptions) -> Result<QueueInfo> {
        self.broker.declare_queue(self.id, name, options)
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> Result<()> {
        self.broker.bind(self.id, queue, exchange, pattern)
    }

    async fn unbind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> Result<()> {
        self.broker.unbind(self.id, queue, exchange, pattern)
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Bytes,
        properties: MessageProperties,
    ) -> Result<()> {
        self.broker
            .publish(self.id, exchange, routing_key, body, properties)
    }

    async fn consume(&self, queue: &str) -> Result<Consumer> {
        self.broker.consume(self.id, queue)
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<()> {
        self.broker.cancel(self.id, consumer_tag)
    }

    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        self.broker.ack(self.id, delivery_tag)
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        self.broker.nack(self.id, delivery_tag, requeue)
    }
}
