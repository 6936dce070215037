//! Service-to-service event bus over a topic-routed message broker.
//!
//! An [`EventService`] gives one service instance two queues: a shared,
//! durable queue that load-balances deliveries across every instance of the
//! service, and a private queue that every instance receives a copy on.
//! Subscriptions bind routing patterns to one of them; deliveries are matched
//! against local subscribers and dispatched concurrently, each inside its own
//! [`context`] scope carrying the correlation id, with a [`TraceLog`] per
//! dispatch.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod event;
mod headers;
mod registry;
mod service;
mod subscriber;
mod topology;
mod trace_log;

/// Task-local correlation scope.
pub mod context;

/// Wire encoding of event payloads.
pub mod payload;

pub use config::{AckPolicy, EventServiceConfig};
pub use error::{Error, HandlerError, Result};
pub use event::{Event, EventType, SystemNodeStarted};
pub use headers::{CORRELATION_ID_HEADER, Endpoint, EventHeaders, ORIGIN_HEADER};
pub use island_broker::Delivery;
pub use registry::SubscriptionId;
pub use service::EventService;
pub use subscriber::{
    EventHandler, PatternSubscriber, Subscriber, SubscriptionOptions, TypeSubscriber,
};
pub use topology::{EXCHANGE_NAME, QueueTopology};
pub use trace_log::{LogTraceSink, MemoryTraceSink, TRACE_TARGET, TraceLog, TraceOutcome, TraceSink};
