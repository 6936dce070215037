use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use island_broker::{Delivery, RoutingKey, RoutingPattern, TopicError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HandlerError;
use crate::event::{Event, EventType};

/// Shared, type-erased handler function.
pub type EventHandler<T> =
    Arc<dyn Fn(T, Delivery) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

fn erase<T, F, Fut>(handler: F) -> EventHandler<T>
where
    T: Send + 'static,
    F: Fn(T, Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |event, delivery| handler(event, delivery).boxed())
}

/// Where a subscription's deliveries come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    /// Receive on this instance's private queue, so every instance gets a
    /// copy, instead of the queue shared by all instances of the service.
    pub broadcast_delivery: bool,
}

impl SubscriptionOptions {
    /// One instance of the service handles each message.
    #[must_use]
    pub const fn load_balanced() -> Self {
        Self {
            broadcast_delivery: false,
        }
    }

    /// Every instance of the service handles each message.
    #[must_use]
    pub const fn broadcast() -> Self {
        Self {
            broadcast_delivery: true,
        }
    }
}

/// A local consumer of routed deliveries.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// Pattern the subscriber is bound with.
    fn routing_pattern(&self) -> &RoutingPattern;

    /// Whether a delivery with `routing_key` is meant for this subscriber.
    fn matches(&self, routing_key: &str) -> bool {
        self.routing_pattern().matches(routing_key)
    }

    /// Handles one decoded payload.
    async fn handle(&self, payload: Value, delivery: Delivery) -> Result<(), HandlerError>;
}

/// Subscriber for one [`EventType`]; deserializes the payload before calling
/// the handler.
pub struct TypeSubscriber<E: EventType> {
    pattern: RoutingPattern,
    handler: EventHandler<E>,
}

impl<E: EventType> TypeSubscriber<E> {
    /// Creates a subscriber for `E::KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if `E::KEY` is not a valid routing key.
    pub fn new<F, Fut>(handler: F) -> Result<Self, TopicError>
    where
        F: Fn(E, Delivery) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        Ok(Self {
            pattern: RoutingKey::new(E::KEY)?.into(),
            handler: erase(handler),
        })
    }
}

impl<E: EventType> Debug for TypeSubscriber<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSubscriber")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<E: EventType> Subscriber for TypeSubscriber<E> {
    fn routing_pattern(&self) -> &RoutingPattern {
        &self.pattern
    }

    async fn handle(&self, payload: Value, delivery: Delivery) -> Result<(), HandlerError> {
        let event = serde_json::from_value::<E>(payload).map_err(|source| HandlerError::Decode {
            key: E::KEY.to_string(),
            source,
        })?;
        (self.handler)(event, delivery).await
    }
}

/// Subscriber for a wildcard pattern; the handler gets an [`Event`] keyed by
/// the delivery's routing key.
pub struct PatternSubscriber {
    pattern: RoutingPattern,
    handler: EventHandler<Event>,
}

impl PatternSubscriber {
    /// Creates a subscriber for `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` is empty or has an empty word.
    pub fn new<F, Fut>(pattern: &str, handler: F) -> Result<Self, TopicError>
    where
        F: Fn(Event, Delivery) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        Ok(Self {
            pattern: RoutingPattern::new(pattern)?,
            handler: erase(handler),
        })
    }
}

impl Debug for PatternSubscriber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternSubscriber")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Subscriber for PatternSubscriber {
    fn routing_pattern(&self) -> &RoutingPattern {
        &self.pattern
    }

    async fn handle(&self, payload: Value, delivery: Delivery) -> Result<(), HandlerError> {
        let event = Event::new(delivery.routing_key.clone(), payload);
        (self.handler)(event, delivery).await
    }
}
