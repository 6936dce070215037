use std::error::Error as StdError;
use std::time::Duration;

use island_broker::TopicError;
use thiserror::Error;

use crate::registry::SubscriptionId;

/// Boxed broker failure.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Result type for event service operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the event service.
#[derive(Debug, Error)]
pub enum Error {
    /// `start_consume` was already called.
    #[error("event service is already consuming")]
    AlreadyConsuming,

    /// `initialize` was already called.
    #[error("event service is already initialized")]
    AlreadyInitialized,

    /// The broker refused a subscription binding.
    #[error("failed to bind queue {queue} to {pattern}: {source}")]
    Bind {
        /// Queue being bound.
        queue: String,
        /// Routing pattern of the binding.
        pattern: String,
        /// Broker failure.
        source: BoxError,
    },

    /// The broker refused a consumer.
    #[error("failed to consume queue {queue}: {source}")]
    Consume {
        /// Queue being consumed.
        queue: String,
        /// Broker failure.
        source: BoxError,
    },

    /// A routing key is empty, has an empty word or contains wildcards.
    #[error("invalid routing key: {0}")]
    InvalidRoutingKey(#[source] TopicError),

    /// A routing pattern is empty or has an empty word.
    #[error("invalid routing pattern: {0}")]
    InvalidPattern(#[source] TopicError),

    /// The configured service name is empty.
    #[error("service name cannot be empty")]
    InvalidServiceName,

    /// The service has no channel pool yet.
    #[error("event service is not initialized")]
    NotInitialized,

    /// The broker refused a publish.
    #[error("failed to publish {routing_key}: {source}")]
    Publish {
        /// Routing key of the event.
        routing_key: String,
        /// Broker failure.
        source: BoxError,
    },

    /// The service was purged.
    #[error("event service has been purged")]
    Purged,

    /// Event arguments could not be encoded.
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The broker refused the exchange or queue declarations.
    #[error("failed to assert broker topology: {0}")]
    Topology(#[source] BoxError),

    /// The broker refused to remove a subscription binding.
    #[error("failed to unbind queue {queue} from {pattern}: {source}")]
    Unbind {
        /// Queue being unbound.
        queue: String,
        /// Routing pattern of the binding.
        pattern: String,
        /// Broker failure.
        source: BoxError,
    },

    /// No subscription with this id is registered.
    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),
}

/// Failure of a single handler dispatch.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload did not deserialize into the subscribed event type.
    #[error("failed to decode {key} payload: {source}")]
    Decode {
        /// Event type key.
        key: String,
        /// Deserialization failure.
        source: serde_json::Error,
    },

    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Failed(#[source] BoxError),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The handler did not settle in time.
    #[error("handler timed out after {0:?}")]
    Timeout(Duration),
}

impl HandlerError {
    /// Wraps an application error.
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Self::Failed(error.into())
    }
}
