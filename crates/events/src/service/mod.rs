mod dispatch;
mod publish;

use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::sync::{Arc, OnceLock};

use island_broker::{Channel, ChannelPool, Consumer, Delivery};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::EventServiceConfig;
use crate::error::{Error, HandlerError, Result};
use crate::event::{Event, EventType, SystemNodeStarted};
use crate::registry::{SubscriberRegistry, SubscriptionId};
use crate::subscriber::{PatternSubscriber, Subscriber, SubscriptionOptions, TypeSubscriber};
use crate::topology::QueueTopology;
use crate::trace_log::{LogTraceSink, TraceSink};

enum Lifecycle<C> {
    Created,
    Initialized,
    Consuming(Consumption<C>),
    Purged,
}

struct Consumption<C> {
    channel: C,
    consumer_tags: Vec<String>,
    shutdown: CancellationToken,
    loops: Vec<JoinHandle<()>>,
    in_flight: TaskTracker,
}

struct Inner<P: ChannelPool> {
    config: EventServiceConfig,
    topology: QueueTopology,
    pool: OnceLock<P>,
    registry: SubscriberRegistry,
    // Held across every registry change and its broker binding.
    subscriptions: Mutex<()>,
    lifecycle: Mutex<Lifecycle<P::Channel>>,
    trace_sink: Arc<dyn TraceSink>,
}

impl<P: ChannelPool> Inner<P> {
    fn pool(&self) -> Result<&P> {
        self.pool.get().ok_or(Error::NotInitialized)
    }
}

/// Event bus endpoint of one service instance.
///
/// Lifecycle: [`initialize`](Self::initialize) declares the topology,
/// [`start_consume`](Self::start_consume) starts receiving, and
/// [`purge`](Self::purge) stops for good. Subscriptions can be added any
/// time between initialization and purge and only affect later deliveries.
///
/// Clones share the same instance.
pub struct EventService<P: ChannelPool> {
    inner: Arc<Inner<P>>,
}

impl<P: ChannelPool> Clone for EventService<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: ChannelPool> Debug for EventService<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventService")
            .field("service_name", &self.inner.config.service_name)
            .field("topology", &self.inner.topology)
            .finish_non_exhaustive()
    }
}

impl<P: ChannelPool> EventService<P> {
    /// Creates a service that ships trace records as `tracing` events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidServiceName`] if the service name is empty.
    pub fn new(config: EventServiceConfig) -> Result<Self> {
        Self::with_trace_sink(config, Arc::new(LogTraceSink))
    }

    /// Creates a service that ships trace records to `trace_sink`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidServiceName`] if the service name is empty.
    pub fn with_trace_sink(config: EventServiceConfig, trace_sink: Arc<dyn TraceSink>) -> Result<Self> {
        if config.service_name.is_empty() {
            return Err(Error::InvalidServiceName);
        }
        let topology = QueueTopology::new(&config.service_name, config.exchange.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                topology,
                pool: OnceLock::new(),
                registry: SubscriberRegistry::default(),
                subscriptions: Mutex::new(()),
                lifecycle: Mutex::new(Lifecycle::Created),
                trace_sink,
            }),
        })
    }

    /// Service name.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.inner.config.service_name
    }

    /// Exchange and queues of this instance.
    #[must_use]
    pub fn topology(&self) -> &QueueTopology {
        &self.inner.topology
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Declares the exchange and both queues using `pool`, which the service
    /// keeps for all later broker work.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Topology`] if the broker refuses a declaration; the
    /// service then stays uninitialized.
    pub async fn initialize(&self, pool: P) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Purged => return Err(Error::Purged),
            Lifecycle::Initialized | Lifecycle::Consuming(_) => {
                return Err(Error::AlreadyInitialized);
            }
        }

        let topology = self.inner.topology.clone();
        pool.using_channel(move |channel| async move { topology.assert(&channel).await })
            .await
            .map_err(|source| Error::Topology(Box::new(source)))?;

        if self.inner.pool.set(pool).is_err() {
            return Err(Error::AlreadyInitialized);
        }
        *lifecycle = Lifecycle::Initialized;

        info!(
            service = %self.inner.config.service_name,
            exchange = %self.inner.topology.exchange(),
            load_balanced_queue = %self.inner.topology.load_balanced_queue(),
            broadcast_queue = %self.inner.topology.broadcast_queue(),
            "event service initialized"
        );
        Ok(())
    }

    /// Starts consuming both queues and announces the instance with a
    /// [`SystemNodeStarted`] event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`], [`Error::AlreadyConsuming`] or
    /// [`Error::Purged`] when called out of order, and [`Error::Consume`] if
    /// the broker refuses a consumer.
    pub async fn start_consume(&self) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Initialized => {}
            Lifecycle::Created => return Err(Error::NotInitialized),
            Lifecycle::Consuming(_) => return Err(Error::AlreadyConsuming),
            Lifecycle::Purged => return Err(Error::Purged),
        }

        let pool = self.inner.pool()?;
        let channel = pool
            .acquire_channel()
            .await
            .map_err(|source| Error::Consume {
                queue: self.inner.topology.load_balanced_queue().to_string(),
                source: Box::new(source),
            })?;

        let queues = [
            self.inner.topology.load_balanced_queue(),
            self.inner.topology.broadcast_queue(),
        ];
        let mut consumers: Vec<Consumer> = Vec::with_capacity(queues.len());
        for queue in queues {
            match channel.consume(queue).await {
                Ok(consumer) => consumers.push(consumer),
                Err(source) => {
                    for consumer in &consumers {
                        if let Err(error) = channel.cancel(consumer.tag()).await {
                            warn!(consumer_tag = consumer.tag(), %error, "failed to cancel consumer");
                        }
                    }
                    pool.release_channel(channel).await;
                    return Err(Error::Consume {
                        queue: queue.to_string(),
                        source: Box::new(source),
                    });
                }
            }
        }

        let shutdown = CancellationToken::new();
        let in_flight = TaskTracker::new();
        let consumer_tags = consumers.iter().map(|c| c.tag().to_string()).collect();
        let loops = consumers
            .into_iter()
            .map(|consumer| {
                tokio::spawn(Arc::clone(&self.inner).consume_loop(
                    channel.clone(),
                    consumer,
                    shutdown.clone(),
                    in_flight.clone(),
                ))
            })
            .collect();

        *lifecycle = Lifecycle::Consuming(Consumption {
            channel,
            consumer_tags,
            shutdown,
            loops,
            in_flight,
        });
        drop(lifecycle);
        info!(service = %self.inner.config.service_name, "event service consuming");

        let started = SystemNodeStarted {
            name: self.inner.topology.broadcast_queue().to_string(),
            island: self.inner.config.service_name.clone(),
        };
        if let Err(error) = self.publish_typed(&started).await {
            warn!(%error, "failed to announce node start");
        }
        Ok(())
    }

    /// Subscribes `handler` to events of type `E`.
    ///
    /// # Errors
    ///
    /// See [`subscribe`](Self::subscribe); also [`Error::InvalidRoutingKey`]
    /// if `E::KEY` is not a literal routing key.
    pub async fn subscribe_event<E, F, Fut>(
        &self,
        handler: F,
        options: SubscriptionOptions,
    ) -> Result<SubscriptionId>
    where
        E: EventType,
        F: Fn(E, Delivery) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
    {
        let subscriber = TypeSubscriber::<E>::new(handler).map_err(Error::InvalidRoutingKey)?;
        self.subscribe(Arc::new(subscriber), options).await
    }

    /// Subscribes `handler` to every event whose routing key matches `pattern`.
    ///
    /// # Errors
    ///
    /// See [`subscribe`](Self::subscribe); also [`Error::InvalidPattern`] if
    /// `pattern` is empty or has an empty word.
    pub async fn subscribe_pattern<F, Fut>(
        &self,
        pattern: &str,
        handler: F,
        options: SubscriptionOptions,
    ) -> Result<SubscriptionId>
    where
        F: Fn(Event, Delivery) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
    {
        let subscriber = PatternSubscriber::new(pattern, handler).map_err(Error::InvalidPattern)?;
        self.subscribe(Arc::new(subscriber), options).await
    }

    /// Binds the subscriber's pattern on the queue picked by `options` and,
    /// once the broker confirmed, registers it locally.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] or [`Error::Purged`] when called out
    /// of order, and [`Error::Bind`] if the broker refuses the binding.
    pub async fn subscribe(
        &self,
        subscriber: Arc<dyn Subscriber>,
        options: SubscriptionOptions,
    ) -> Result<SubscriptionId> {
        let _subscriptions = self.inner.subscriptions.lock().await;
        self.ensure_open().await?;
        let pool = self.inner.pool()?;
        let queue = self.inner.topology.queue_for(options).to_string();
        let pattern = subscriber.routing_pattern().to_string();

        let exchange = self.inner.topology.exchange().to_string();
        let (bind_queue, bind_pattern) = (queue.clone(), pattern.clone());
        pool.using_channel(move |channel| async move {
            channel
                .bind_queue(&bind_queue, &exchange, &bind_pattern)
                .await
        })
        .await
        .map_err(|source| Error::Bind {
            queue: queue.clone(),
            pattern: pattern.clone(),
            source: Box::new(source),
        })?;

        let id = self.inner.registry.insert(queue.clone(), subscriber);
        debug!(%id, %queue, %pattern, "subscribed");
        Ok(id)
    }

    /// Removes a subscription. The broadcast queue binding is released once
    /// no other local subscription uses it; load-balanced bindings are shared
    /// with the other instances and stay.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSubscription`] if `id` is not registered and
    /// [`Error::Unbind`] if the broker refuses to drop the binding.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let _subscriptions = self.inner.subscriptions.lock().await;
        let registration = self
            .inner
            .registry
            .remove(id)
            .ok_or(Error::UnknownSubscription(id))?;
        let pattern = registration.subscriber.routing_pattern().to_string();
        let queue = registration.queue;
        debug!(%id, %queue, %pattern, "unsubscribed");

        if queue != self.inner.topology.broadcast_queue() || self.inner.registry.binds(&queue, &pattern) {
            return Ok(());
        }

        let pool = self.inner.pool()?;
        let exchange = self.inner.topology.exchange().to_string();
        let (unbind_queue, unbind_pattern) = (queue.clone(), pattern.clone());
        pool.using_channel(move |channel| async move {
            channel
                .unbind_queue(&unbind_queue, &exchange, &unbind_pattern)
                .await
        })
        .await
        .map_err(|source| Error::Unbind {
            queue,
            pattern,
            source: Box::new(source),
        })
    }

    /// Stops the service for good: cancels the consumers, waits for
    /// in-flight dispatches, releases the consumption channel and clears
    /// the subscriptions.
    ///
    /// A subscription change already talking to the broker completes first;
    /// later ones fail with [`Error::Purged`]. Called from a handler, purge
    /// does not wait for the in-flight dispatches, its own included.
    ///
    /// # Errors
    ///
    /// Currently infallible.
    pub async fn purge(&self) -> Result<()> {
        let previous = {
            let _subscriptions = self.inner.subscriptions.lock().await;
            let mut lifecycle = self.inner.lifecycle.lock().await;
            std::mem::replace(&mut *lifecycle, Lifecycle::Purged)
        };

        if let Lifecycle::Consuming(consumption) = previous {
            self.stop_consuming(consumption).await;
        }

        let removed = self.inner.registry.clear();
        info!(
            service = %self.inner.config.service_name,
            subscriptions = removed,
            "event service purged"
        );
        Ok(())
    }

    async fn stop_consuming(&self, consumption: Consumption<P::Channel>) {
        let Consumption {
            channel,
            consumer_tags,
            shutdown,
            loops,
            in_flight,
        } = consumption;

        shutdown.cancel();
        let mut cancelled = true;
        for tag in &consumer_tags {
            if let Err(error) = channel.cancel(tag).await {
                warn!(consumer_tag = %tag, %error, "failed to cancel consumer");
                cancelled = false;
            }
        }

        for handle in loops {
            if !cancelled {
                handle.abort();
            }
            if let Err(error) = handle.await {
                if !error.is_cancelled() {
                    warn!(%error, "consumption loop panicked");
                }
            }
        }

        in_flight.close();
        if dispatch::in_dispatch() {
            debug!(
                in_flight = in_flight.len(),
                "purged from a handler, not waiting for dispatches"
            );
        } else {
            in_flight.wait().await;
        }

        if let Ok(pool) = self.inner.pool() {
            pool.release_channel(channel).await;
        }
    }

    async fn ensure_open(&self) -> Result<()> {
        match *self.inner.lifecycle.lock().await {
            Lifecycle::Created => Err(Error::NotInitialized),
            Lifecycle::Purged => Err(Error::Purged),
            Lifecycle::Initialized | Lifecycle::Consuming(_) => Ok(()),
        }
    }
}
