use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use island_broker::{Channel, ChannelPool, Consumer, Delivery};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use super::Inner;
use crate::config::AckPolicy;
use crate::context::{self, OPERATION_EVENT, ScopeValues};
use crate::error::HandlerError;
use crate::headers::{Endpoint, EventHeaders};
use crate::payload;
use crate::subscriber::Subscriber;
use crate::trace_log::TraceLog;

tokio::task_local! {
    static DISPATCHING: ();
}

/// Whether the caller runs inside a delivery's handling task.
pub(super) fn in_dispatch() -> bool {
    DISPATCHING.try_with(|()| ()).is_ok()
}

/// How a delivery's handling ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Handled,
    HandlerFailed,
    Undecodable,
}

impl<P: ChannelPool> Inner<P> {
    /// Hands every delivery of `consumer` to its own tracked task until the
    /// consumer is cancelled.
    pub(super) async fn consume_loop(
        self: Arc<Self>,
        channel: P::Channel,
        mut consumer: Consumer,
        shutdown: CancellationToken,
        in_flight: TaskTracker,
    ) {
        let queue = consumer.queue().to_string();
        debug!(%queue, consumer_tag = consumer.tag(), "consumption loop started");

        while let Some(delivery) = consumer.next().await {
            let inner = Arc::clone(&self);
            let channel = channel.clone();
            in_flight.spawn(DISPATCHING.scope((), async move {
                inner.handle_delivery(&channel, delivery).await;
            }));
        }

        if shutdown.is_cancelled() {
            debug!(%queue, "consumption loop stopped");
        } else {
            error!(%queue, "consume was canceled unexpectedly");
        }
    }

    async fn handle_delivery(&self, channel: &P::Channel, delivery: Delivery) {
        let payload = match payload::decode(
            &delivery.body,
            delivery.properties.content_type.as_deref(),
        ) {
            Ok(payload) => payload,
            Err(error) => {
                error!(routing_key = %delivery.routing_key, %error, "failed to decode event payload");
                self.settle(channel, &delivery, Outcome::Undecodable).await;
                return;
            }
        };
        let headers = EventHeaders::from_field_table(&delivery.properties.headers);

        let subscribers = self.registry.matching(&delivery.routing_key);
        debug!(
            routing_key = %delivery.routing_key,
            correlation_id = ?headers.correlation_id,
            subscribers = subscribers.len(),
            redelivered = delivery.redelivered,
            "handling event"
        );

        let results = join_all(
            subscribers
                .into_iter()
                .map(|subscriber| self.dispatch(subscriber, payload.clone(), &headers, &delivery)),
        )
        .await;

        let outcome = if results.iter().all(Result::is_ok) {
            Outcome::Handled
        } else {
            Outcome::HandlerFailed
        };
        self.settle(channel, &delivery, outcome).await;
    }

    /// Runs one subscriber inside a fresh scope and traces it.
    async fn dispatch(
        &self,
        subscriber: Arc<dyn Subscriber>,
        payload: Value,
        headers: &EventHeaders,
        delivery: &Delivery,
    ) -> Result<(), HandlerError> {
        let values = ScopeValues {
            correlation_id: headers.correlation_id.clone(),
            routing_context: Some(delivery.routing_key.clone()),
            operation_type: Some(OPERATION_EVENT.to_string()),
        };

        context::scope(values, async move {
            let mut log = TraceLog::new(
                headers.correlation_id.clone(),
                delivery.properties.timestamp.unwrap_or(0),
            );
            log.size = delivery.body.len();
            log.from.clone_from(&headers.origin);
            log.to = Some(Endpoint {
                node: self.config.node_name.clone(),
                context: Some(delivery.routing_key.clone()),
                service: self.config.service_name.clone(),
                kind: Some(OPERATION_EVENT.to_string()),
            });

            let result = self
                .invoke(subscriber.as_ref(), payload, delivery.clone())
                .await;
            match &result {
                Ok(()) => log.end(),
                Err(error) => {
                    warn!(
                        routing_key = %delivery.routing_key,
                        pattern = %subscriber.routing_pattern(),
                        %error,
                        "event handler failed"
                    );
                    log.end_with_error(error);
                }
            }
            log.shoot(self.trace_sink.as_ref());
            result
        })
        .await
    }

    async fn invoke(
        &self,
        subscriber: &dyn Subscriber,
        payload: Value,
        delivery: Delivery,
    ) -> Result<(), HandlerError> {
        let handling = AssertUnwindSafe(subscriber.handle(payload, delivery))
            .catch_unwind()
            .map(|outcome| {
                outcome.unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(&*panic))))
            });

        match self.config.handler_timeout {
            Some(limit) => tokio::time::timeout(limit, handling)
                .await
                .unwrap_or_else(|_| Err(HandlerError::Timeout(limit))),
            None => handling.await,
        }
    }

    async fn settle(&self, channel: &P::Channel, delivery: &Delivery, outcome: Outcome) {
        let tag = delivery.delivery_tag;
        let settled = match (self.config.ack_policy, outcome) {
            (AckPolicy::BestEffort, _) | (AckPolicy::RequeueOnce, Outcome::Handled) => {
                channel.ack(tag).await
            }
            (AckPolicy::RequeueOnce, Outcome::HandlerFailed) => {
                channel.nack(tag, !delivery.redelivered).await
            }
            (AckPolicy::RequeueOnce, Outcome::Undecodable) => channel.nack(tag, false).await,
        };

        match settled {
            Ok(()) => debug!(routing_key = %delivery.routing_key, delivery_tag = tag, ?outcome, "delivery settled"),
            Err(error) => error!(routing_key = %delivery.routing_key, delivery_tag = tag, %error, "failed to settle delivery"),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
