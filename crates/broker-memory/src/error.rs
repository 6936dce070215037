use island_broker::BrokerError;
use thiserror::Error;

/// Result type for in-memory broker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the in-memory broker, modelled on AMQP channel and
/// connection exceptions.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The name is reserved by the broker.
    #[error("access refused: {0}")]
    AccessRefused(String),

    /// The channel was closed.
    #[error("channel {0} is closed")]
    ChannelClosed(u64),

    /// The connection was closed.
    #[error("connection {0} is closed")]
    ConnectionClosed(u64),

    /// The exchange or queue does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A redeclaration disagrees with the existing entity, or a delivery tag is unknown.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The queue is exclusive to another connection.
    #[error("resource locked: {0}")]
    ResourceLocked(String),
}

impl BrokerError for Error {}
