use island_broker::{Channel, ChannelPool, MessageProperties, RoutingKey};
use tracing::debug;

use super::EventService;
use crate::context;
use crate::error::{Error, Result};
use crate::event::{Event, EventType};
use crate::headers::{Endpoint, EventHeaders};
use crate::payload::{self, CONTENT_TYPE};
use crate::trace_log::epoch_millis;

impl<P: ChannelPool> EventService<P> {
    /// Publishes `event` to the service's exchange, carrying the correlation
    /// id of the current [`context`] scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before initialization,
    /// [`Error::InvalidRoutingKey`] for a malformed key,
    /// [`Error::Serialize`] if the arguments do not encode, and
    /// [`Error::Publish`] if the broker refuses the message.
    pub async fn publish(&self, event: &Event) -> Result<()> {
        self.publish_to(self.inner.topology.exchange(), event).await
    }

    /// Publishes `event` to `exchange`.
    ///
    /// # Errors
    ///
    /// As [`publish`](Self::publish).
    pub async fn publish_to(&self, exchange: &str, event: &Event) -> Result<()> {
        let pool = self.inner.pool()?;
        let routing_key = RoutingKey::new(event.key())
            .map_err(Error::InvalidRoutingKey)?
            .into_string();

        let scope = context::current().unwrap_or_default();
        let headers = EventHeaders {
            correlation_id: scope.correlation_id,
            origin: Some(Endpoint {
                node: self.inner.config.node_name.clone(),
                context: scope.routing_context,
                service: self.inner.config.service_name.clone(),
                kind: scope.operation_type,
            }),
        };
        let body = payload::encode(event.args())?;
        let properties = MessageProperties::default()
            .with_content_type(CONTENT_TYPE)
            .with_timestamp(epoch_millis())
            .with_headers(headers.to_field_table());

        debug!(
            %exchange,
            %routing_key,
            correlation_id = ?headers.correlation_id,
            size = body.len(),
            "publishing event"
        );

        let (target, key) = (exchange.to_string(), routing_key.clone());
        pool.using_channel(move |channel| async move {
            channel.publish(&target, &key, body, properties).await
        })
        .await
        .map_err(|source| Error::Publish {
            routing_key,
            source: Box::new(source),
        })
    }

    /// Publishes a typed event.
    ///
    /// # Errors
    ///
    /// As [`publish`](Self::publish).
    pub async fn publish_typed<E: EventType>(&self, event: &E) -> Result<()> {
        self.publish(&Event::from_typed(event)?).await
    }
}
