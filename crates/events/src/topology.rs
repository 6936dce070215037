use island_broker::{Channel, ExchangeKind, ExchangeOptions, QueueOptions};
use uuid::Uuid;

use crate::subscriber::SubscriptionOptions;

/// Default topic exchange shared by every service.
pub const EXCHANGE_NAME: &str = "MESSAGE_BROKER_EXCHANGE";

const QUEUE_PREFIX: &str = "event";

/// Exchange and queues of one service instance.
///
/// The load-balanced queue `event.<service>` is durable and shared by every
/// instance of the service. The broadcast queue `event.<service>.node.<uuid>`
/// is exclusive to this instance and deleted with its consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueTopology {
    exchange: String,
    load_balanced_queue: String,
    broadcast_queue: String,
}

impl QueueTopology {
    /// Topology for a new instance of `service_name`.
    #[must_use]
    pub fn new(service_name: &str, exchange: impl Into<String>) -> Self {
        Self::with_node_id(service_name, exchange, Uuid::new_v4())
    }

    /// Topology with a fixed instance id.
    #[must_use]
    pub fn with_node_id(service_name: &str, exchange: impl Into<String>, node_id: Uuid) -> Self {
        Self {
            exchange: exchange.into(),
            load_balanced_queue: format!("{QUEUE_PREFIX}.{service_name}"),
            broadcast_queue: format!("{QUEUE_PREFIX}.{service_name}.node.{node_id}"),
        }
    }

    /// The topic exchange.
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Queue shared by every instance of the service.
    #[must_use]
    pub fn load_balanced_queue(&self) -> &str {
        &self.load_balanced_queue
    }

    /// Queue private to this instance.
    #[must_use]
    pub fn broadcast_queue(&self) -> &str {
        &self.broadcast_queue
    }

    /// Queue a subscription with `options` is bound on.
    #[must_use]
    pub fn queue_for(&self, options: SubscriptionOptions) -> &str {
        if options.broadcast_delivery {
            &self.broadcast_queue
        } else {
            &self.load_balanced_queue
        }
    }

    /// Declares the exchange and both queues.
    ///
    /// # Errors
    ///
    /// Returns the broker's error if any declaration is refused.
    pub async fn assert<C: Channel>(&self, channel: &C) -> Result<(), C::Error> {
        channel
            .assert_exchange(&self.exchange, ExchangeKind::Topic, ExchangeOptions::durable())
            .await?;
        channel
            .assert_queue(&self.load_balanced_queue, QueueOptions::durable())
            .await?;
        channel
            .assert_queue(&self.broadcast_queue, QueueOptions::exclusive())
            .await?;
        Ok(())
    }
}
