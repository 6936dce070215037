//! Two services exchanging events over an in-process broker.
//!
//! `accounts` publishes `user.created` inside a correlation scope, `billing`
//! opens an account for every new user and reports back with an
//! `invoice.created` event that carries the same correlation id.
//!
//! Run with `RUST_LOG=island_events=debug` for the full pipeline trace.

use std::time::Duration;

use island_broker_memory::{MemoryBroker, MemoryChannelPool};
use island_events::context::{self, ScopeKey, ScopeValues};
use island_events::{
    Delivery, Event, EventService, EventServiceConfig, EventType, HandlerError,
    SubscriptionOptions,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
struct UserCreated {
    id: u64,
    email: String,
}

impl EventType for UserCreated {
    const KEY: &'static str = "user.created";
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let broker = MemoryBroker::new();

    let billing = EventService::new(EventServiceConfig::new("billing"))
        .expect("Failed to create billing service");
    billing
        .initialize(MemoryChannelPool::connect(&broker))
        .await
        .expect("Failed to initialize billing");

    let accounts = EventService::new(EventServiceConfig::new("accounts"))
        .expect("Failed to create accounts service");
    accounts
        .initialize(MemoryChannelPool::connect(&broker))
        .await
        .expect("Failed to initialize accounts");

    let publisher = billing.clone();
    billing
        .subscribe_event(
            move |user: UserCreated, _delivery: Delivery| {
                let publisher = publisher.clone();
                async move {
                    info!(
                        user = user.id,
                        email = %user.email,
                        correlation_id = ?context::get(ScopeKey::CorrelationId),
                        "opening billing account"
                    );
                    let invoice = Event::new("invoice.created", json!({ "user": user.id }));
                    publisher.publish(&invoice).await.map_err(HandlerError::failed)
                }
            },
            SubscriptionOptions::load_balanced(),
        )
        .await
        .expect("Failed to subscribe billing");

    accounts
        .subscribe_pattern(
            "invoice.*",
            |event: Event, delivery: Delivery| async move {
                info!(
                    routing_key = %delivery.routing_key,
                    args = %event.args(),
                    correlation_id = ?context::get(ScopeKey::CorrelationId),
                    "invoice noticed"
                );
                Ok(())
            },
            SubscriptionOptions::broadcast(),
        )
        .await
        .expect("Failed to subscribe accounts");

    billing.start_consume().await.expect("Failed to start billing");
    accounts
        .start_consume()
        .await
        .expect("Failed to start accounts");

    let user = UserCreated {
        id: 7,
        email: "ada@example.com".to_string(),
    };
    context::scope(
        ScopeValues::with_correlation_id("signup-7"),
        accounts.publish_typed(&user),
    )
    .await
    .expect("Failed to publish user.created");

    tokio::time::sleep(Duration::from_millis(200)).await;

    billing.purge().await.expect("Failed to purge billing");
    accounts.purge().await.expect("Failed to purge accounts");
    info!("done");
}
