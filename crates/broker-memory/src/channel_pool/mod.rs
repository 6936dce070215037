use std::sync::Arc;

use async_trait::async_trait;
use island_broker::{Adapter, AdapterError, ChannelPool};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::broker::{ConnectionId, MemoryBroker};
use crate::channel::MemoryChannel;
use crate::error::{Error, Result};

/// One connection to a [`MemoryBroker`], lending out channels.
///
/// Released channels are kept and handed out again. Clones share the
/// connection.
#[derive(Clone, Debug)]
pub struct MemoryChannelPool {
    broker: MemoryBroker,
    connection: ConnectionId,
    idle: Arc<Mutex<Vec<MemoryChannel>>>,
}

impl MemoryChannelPool {
    /// Opens a new connection to `broker`.
    #[must_use]
    pub fn connect(broker: &MemoryBroker) -> Self {
        Self {
            broker: broker.clone(),
            connection: broker.open_connection(),
            idle: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Whether the connection is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.broker.is_connection_open(self.connection)
    }

    /// Closes the connection: closes every channel, then deletes the
    /// connection's exclusive queues.
    pub fn close(&self) {
        self.idle.lock().clear();
        self.broker.close_connection(self.connection);
    }
}

#[async_trait]
impl ChannelPool for MemoryChannelPool {
    type Error = Error;
    type Channel = MemoryChannel;

    async fn acquire_channel(&self) -> Result<MemoryChannel> {
        loop {
            let Some(channel) = self.idle.lock().pop() else {
                break;
            };
            if channel.is_open() {
                return Ok(channel);
            }
        }
        let id = self.broker.open_channel(self.connection)?;
        debug!(connection = self.connection, channel = id, "channel opened");
        Ok(MemoryChannel::new(self.broker.clone(), id))
    }

    async fn release_channel(&self, channel: MemoryChannel) {
        if channel.is_open() && self.is_open() {
            self.idle.lock().push(channel);
        }
    }
}

#[async_trait]
impl Adapter for MemoryChannelPool {
    type Adaptee = MemoryBroker;

    fn name(&self) -> &'static str {
        "memory-channel-pool"
    }

    fn adaptee(&self) -> &MemoryBroker {
        &self.broker
    }

    async fn initialize(&self) -> std::result::Result<(), AdapterError> {
        if !self.is_open() {
            return Err(AdapterError::failed(
                self.name(),
                Error::ConnectionClosed(self.connection),
            ));
        }
        info!(connection = self.connection, "memory channel pool ready");
        Ok(())
    }

    async fn destroy(&self) -> std::result::Result<(), AdapterError> {
        self.close();
        info!(connection = self.connection, "memory channel pool destroyed");
        Ok(())
    }
}
