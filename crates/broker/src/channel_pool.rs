use std::future::Future;

use async_trait::async_trait;

use crate::channel::{BrokerError, Channel};

/// Owns broker connections and lends out channels.
#[async_trait]
pub trait ChannelPool
where
    Self: Send + Sync + 'static,
{
    /// The error type for the pool and its channels.
    type Error: BrokerError;

    /// The channel type handed out by the pool.
    type Channel: Channel<Error = Self::Error>;

    /// Takes a channel for long-lived use.
    async fn acquire_channel(&self) -> Result<Self::Channel, Self::Error>;

    /// Hands a channel back to the pool.
    async fn release_channel(&self, channel: Self::Channel);

    /// Runs `op` on a channel that is released afterwards, whatever the outcome.
    async fn using_channel<F, Fut, R>(&self, op: F) -> Result<R, Self::Error>
    where
        F: FnOnce(Self::Channel) -> Fut + Send,
        Fut: Future<Output = Result<R, Self::Error>> + Send,
        R: Send,
    {
        let channel = self.acquire_channel().await?;
        let result = op(channel.clone()).await;
        self.release_channel(channel).await;
        result
    }
}
