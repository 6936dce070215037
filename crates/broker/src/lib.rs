//! Abstract interface for topic-routed message brokers.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Adapters give broker collaborators an explicit lifecycle.
pub mod adapter;

/// Channels perform broker operations.
pub mod channel;

/// Channel pools own broker connections and lend out channels.
pub mod channel_pool;

/// Consumers stream deliveries from a queue.
pub mod consumer;

/// Deliveries are messages handed to consumers.
pub mod delivery;

/// Exchanges route published messages to bound queues.
pub mod exchange;

/// Queues hold messages until they are consumed.
pub mod queue;

/// Routing keys, routing patterns and topic matching.
pub mod topic;

pub use adapter::{Adapter, AdapterError};
pub use channel::{BrokerError, Channel};
pub use channel_pool::ChannelPool;
pub use consumer::Consumer;
pub use delivery::{Delivery, FieldTable, MessageProperties};
pub use exchange::{ExchangeKind, ExchangeOptions};
pub use queue::{QueueInfo, QueueOptions};
pub use topic::{RoutingKey, RoutingPattern, TopicError, topic_matches};
