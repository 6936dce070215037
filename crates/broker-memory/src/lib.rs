//! In-process implementation of the broker contracts.
//!
//! A [`MemoryBroker`] holds exchanges, queues and bindings for any number of
//! connections. Each [`MemoryChannelPool`] is one connection to it.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod broker;
mod channel;
mod channel_pool;
mod error;

pub use broker::{DeadLetter, MemoryBroker};
pub use channel::MemoryChannel;
pub use channel_pool::MemoryChannelPool;
pub use error::{Error, Result};
