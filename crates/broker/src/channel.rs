use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

use crate::consumer::Consumer;
use crate::delivery::MessageProperties;
use crate::exchange::{ExchangeKind, ExchangeOptions};
use crate::queue::{QueueInfo, QueueOptions};

/// Marker trait for broker errors
pub trait BrokerError: Error + Send + Sync + 'static {}

/// One logical channel to a broker.
///
/// Channels are cheap handles; clones refer to the same underlying channel.
#[async_trait]
pub trait Channel
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the channel.
    type Error: BrokerError;

    /// Declares an exchange, or checks that an existing one has the same shape.
    async fn assert_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeOptions,
    ) -> Result<(), Self::Error>;

    /// Declares a queue, or checks that an existing one has the same options.
    async fn assert_queue(&self, name: &str, options: QueueOptions)
    -> Result<QueueInfo, Self::Error>;

    /// Routes messages matching `pattern` from `exchange` into `queue`.
    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str)
    -> Result<(), Self::Error>;

    /// Removes a binding created by [`Channel::bind_queue`].
    async fn unbind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<(), Self::Error>;

    /// Publishes a message; returns once the broker accepted it.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Bytes,
        properties: MessageProperties,
    ) -> Result<(), Self::Error>;

    /// Registers a consumer on `queue`.
    async fn consume(&self, queue: &str) -> Result<Consumer, Self::Error>;

    /// Cancels a consumer; its delivery stream ends once drained.
    async fn cancel(&self, consumer_tag: &str) -> Result<(), Self::Error>;

    /// Acknowledges a delivery received on this channel.
    async fn ack(&self, delivery_tag: u64) -> Result<(), Self::Error>;

    /// Negatively acknowledges a delivery, optionally putting it back on its queue.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), Self::Error>;
}
