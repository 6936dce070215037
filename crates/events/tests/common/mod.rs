#![allow(dead_code)]

pub mod gated;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{Ready, ready};
use island_broker_memory::{MemoryBroker, MemoryChannelPool};
use island_events::{
    Delivery, EventService, EventServiceConfig, EventType, HandlerError, MemoryTraceSink,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{sleep, timeout};

pub const WAIT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub id: u64,
    pub created_at: DateTime<Utc>,
}

impl EventType for UserCreated {
    const KEY: &'static str = "user.created";
}

pub struct Instance {
    pub service: EventService<MemoryChannelPool>,
    pub pool: MemoryChannelPool,
    pub traces: MemoryTraceSink,
}

pub fn config(service_name: &str) -> EventServiceConfig {
    EventServiceConfig::new(service_name).with_node_name("test-node")
}

/// Initialized, not yet consuming.
pub async fn initialized(broker: &MemoryBroker, config: EventServiceConfig) -> Instance {
    let traces = MemoryTraceSink::new();
    let service = EventService::with_trace_sink(config, Arc::new(traces.clone())).unwrap();
    let pool = MemoryChannelPool::connect(broker);
    service.initialize(pool.clone()).await.unwrap();
    Instance {
        service,
        pool,
        traces,
    }
}

/// Initialized and consuming.
pub async fn started(broker: &MemoryBroker, config: EventServiceConfig) -> Instance {
    let instance = initialized(broker, config).await;
    instance.service.start_consume().await.unwrap();
    instance
}

/// Handler forwarding every event into a channel.
pub fn recorder<T: Send + 'static>() -> (
    impl Fn(T, Delivery) -> Ready<Result<(), HandlerError>> + Send + Sync + 'static,
    UnboundedReceiver<T>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |event: T, _delivery: Delivery| {
        ready(
            tx.send(event)
                .map_err(|_| HandlerError::failed("recorder dropped")),
        )
    };
    (handler, rx)
}

pub async fn recv<T>(rx: &mut UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("recorder closed")
}

pub async fn assert_nothing_received<T>(rx: &mut UnboundedReceiver<T>) {
    sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "unexpected event");
}

pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let waited = timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

/// Waits until every delivery on the broker has been acked or nacked.
pub async fn wait_settled(broker: &MemoryBroker) {
    wait_until("deliveries to settle", || broker.unacked_count() == 0).await;
}
