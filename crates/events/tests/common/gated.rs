//! Channel pool that parks one bind or unbind call until released, for
//! interleaving subscription changes with other operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use island_broker::{
    Channel, ChannelPool, Consumer, ExchangeKind, ExchangeOptions, MessageProperties, QueueInfo,
    QueueOptions,
};
use island_broker_memory::{Error, MemoryBroker, MemoryChannel, MemoryChannelPool};
use island_events::{EventService, EventServiceConfig};
use tokio::sync::Notify;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Bind,
    Unbind,
}

#[derive(Debug)]
pub struct Gate {
    operation: Operation,
    pattern: String,
    armed: AtomicBool,
    reached: Notify,
    release: Notify,
}

impl Gate {
    pub fn new(operation: Operation, pattern: &str) -> Arc<Self> {
        Arc::new(Self {
            operation,
            pattern: pattern.to_string(),
            armed: AtomicBool::new(true),
            reached: Notify::new(),
            release: Notify::new(),
        })
    }

    /// Waits until a caller is parked at the gate.
    pub async fn reached(&self) {
        tokio::time::timeout(super::WAIT, self.reached.notified())
            .await
            .expect("gate never reached");
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self, operation: Operation, pattern: &str) {
        if operation == self.operation
            && pattern == self.pattern
            && self.armed.swap(false, Ordering::SeqCst)
        {
            self.reached.notify_one();
            self.release.notified().await;
        }
    }
}

#[derive(Clone, Debug)]
pub struct GatedChannel {
    inner: MemoryChannel,
    gate: Arc<Gate>,
}

#[async_trait]
impl Channel for GatedChannel {
    type Error = Error;

    async fn assert_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeOptions,
    ) -> Result<(), Error> {
        self.inner.assert_exchange(name, kind, options).await
    }

    async fn assert_queue(&self, name: &str, options: QueueOptions) -> Result<QueueInfo, Error> {
        self.inner.assert_queue(name, options).await
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> Result<(), Error> {
        self.gate.pass(Operation::Bind, pattern).await;
        self.inner.bind_queue(queue, exchange, pattern).await
    }

    async fn unbind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> Result<(), Error> {
        self.gate.pass(Operation::Unbind, pattern).await;
        self.inner.unbind_queue(queue, exchange, pattern).await
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Bytes,
        properties: MessageProperties,
    ) -> Result<(), Error> {
        self.inner
            .publish(exchange, routing_key, body, properties)
            .await
    }

    async fn consume(&self, queue: &str) -> Result<Consumer, Error> {
        self.inner.consume(queue).await
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), Error> {
        self.inner.cancel(consumer_tag).await
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), Error> {
        self.inner.ack(delivery_tag).await
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        self.inner.nack(delivery_tag, requeue).await
    }
}

#[derive(Clone, Debug)]
pub struct GatedPool {
    inner: MemoryChannelPool,
    gate: Arc<Gate>,
}

#[async_trait]
impl ChannelPool for GatedPool {
    type Error = Error;
    type Channel = GatedChannel;

    async fn acquire_channel(&self) -> Result<GatedChannel, Error> {
        Ok(GatedChannel {
            inner: self.inner.acquire_channel().await?,
            gate: Arc::clone(&self.gate),
        })
    }

    async fn release_channel(&self, channel: GatedChannel) {
        self.inner.release_channel(channel.inner).await;
    }
}

/// Initialized and consuming, with broker calls passing through `gate`.
pub async fn started(
    broker: &MemoryBroker,
    config: EventServiceConfig,
    gate: &Arc<Gate>,
) -> EventService<GatedPool> {
    let service = EventService::new(config).unwrap();
    let pool = GatedPool {
        inner: MemoryChannelPool::connect(broker),
        gate: Arc::clone(gate),
    };
    service.initialize(pool).await.unwrap();
    service.start_consume().await.unwrap();
    service
}
