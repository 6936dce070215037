use serde::{Deserialize, Serialize};

/// Declaration options for a queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Survives broker restarts.
    pub durable: bool,
    /// Only usable by the declaring connection, deleted when it closes.
    pub exclusive: bool,
    /// Deleted once its last consumer is cancelled.
    pub auto_delete: bool,
}

impl QueueOptions {
    /// A durable queue shared by every connection.
    #[must_use]
    pub const fn durable() -> Self {
        Self {
            durable: true,
            exclusive: false,
            auto_delete: false,
        }
    }

    /// A queue private to the declaring connection that goes away with its consumers.
    #[must_use]
    pub const fn exclusive() -> Self {
        Self {
            durable: false,
            exclusive: true,
            auto_delete: true,
        }
    }
}

/// Broker answer to a queue declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInfo {
    /// Queue name, broker-generated when declared with an empty name.
    pub name: String,
    /// Messages ready for delivery.
    pub message_count: usize,
    /// Registered consumers.
    pub consumer_count: usize,
}
