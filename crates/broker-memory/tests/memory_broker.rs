use std::time::Duration;

use bytes::Bytes;
use island_broker::{
    Adapter, AdapterError, Channel, ChannelPool, Consumer, Delivery, ExchangeKind, ExchangeOptions,
    MessageProperties, QueueOptions,
};
use island_broker_memory::{Error, MemoryBroker, MemoryChannel, MemoryChannelPool};

const EXCHANGE: &str = "test.exchange";

async fn next(consumer: &mut Consumer) -> Delivery {
    tokio::time::timeout(Duration::from_secs(1), consumer.next())
        .await
        .expect("delivery timed out")
        .expect("consumer stream ended")
}

async fn assert_silent(consumer: &mut Consumer) {
    assert!(
        tokio::time::timeout(Duration::from_millis(50), consumer.next())
            .await
            .is_err(),
        "unexpected delivery"
    );
}

async fn setup(kind: ExchangeKind) -> (MemoryBroker, MemoryChannelPool, MemoryChannel) {
    let broker = MemoryBroker::new();
    let pool = MemoryChannelPool::connect(&broker);
    let channel = pool.acquire_channel().await.unwrap();
    channel
        .assert_exchange(EXCHANGE, kind, ExchangeOptions::durable())
        .await
        .unwrap();
    (broker, pool, channel)
}

async fn publish(channel: &MemoryChannel, routing_key: &str, body: &'static str) {
    channel
        .publish(
            EXCHANGE,
            routing_key,
            Bytes::from_static(body.as_bytes()),
            MessageProperties::default(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_redeclaration_must_match() {
    let (_broker, _pool, channel) = setup(ExchangeKind::Topic).await;

    channel
        .assert_exchange(EXCHANGE, ExchangeKind::Topic, ExchangeOptions::durable())
        .await
        .unwrap();
    let err = channel
        .assert_exchange(EXCHANGE, ExchangeKind::Fanout, ExchangeOptions::durable())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed(_)));

    let err = channel
        .assert_exchange("", ExchangeKind::Direct, ExchangeOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AccessRefused(_)));

    channel
        .assert_queue("jobs", QueueOptions::durable())
        .await
        .unwrap();
    let err = channel
        .assert_queue("jobs", QueueOptions::exclusive())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed(_)));

    let info = channel.assert_queue("", QueueOptions::exclusive()).await.unwrap();
    assert!(info.name.starts_with("amq.gen-"));
}

#[tokio::test]
async fn test_exclusive_queue_is_locked_to_its_connection() {
    let (broker, pool, channel) = setup(ExchangeKind::Topic).await;
    channel
        .assert_queue("private", QueueOptions::exclusive())
        .await
        .unwrap();

    let other = MemoryChannelPool::connect(&broker);
    let other_channel = other.acquire_channel().await.unwrap();
    let err = other_channel
        .assert_queue("private", QueueOptions::exclusive())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ResourceLocked(_)));
    let err = other_channel.consume("private").await.unwrap_err();
    assert!(matches!(err, Error::ResourceLocked(_)));

    pool.close();
    assert!(!broker.queue_names().contains(&"private".to_string()));
}

#[tokio::test]
async fn test_topic_routing_through_bindings() {
    let (broker, _pool, channel) = setup(ExchangeKind::Topic).await;
    channel
        .assert_queue("users", QueueOptions::durable())
        .await
        .unwrap();
    channel.bind_queue("users", EXCHANGE, "user.*").await.unwrap();
    channel.bind_queue("users", EXCHANGE, "#.created").await.unwrap();
    channel.bind_queue("users", EXCHANGE, "user.*").await.unwrap();
    assert_eq!(
        broker.bindings("users"),
        vec![
            (EXCHANGE.to_string(), "#.created".to_string()),
            (EXCHANGE.to_string(), "user.*".to_string()),
        ]
    );

    publish(&channel, "user.created", "a").await;
    publish(&channel, "order.created", "b").await;
    publish(&channel, "order.paid", "c").await;

    // One copy per queue, even when several bindings match.
    assert_eq!(broker.message_count("users"), Some(2));

    let mut consumer = channel.consume("users").await.unwrap();
    let first = next(&mut consumer).await;
    assert_eq!(first.routing_key, "user.created");
    assert_eq!(first.exchange, EXCHANGE);
    assert!(!first.redelivered);
    assert_eq!(next(&mut consumer).await.body, Bytes::from_static(b"b"));
    assert_silent(&mut consumer).await;
}

#[tokio::test]
async fn test_direct_and_fanout_exchanges() {
    let (broker, _pool, channel) = setup(ExchangeKind::Direct).await;
    channel.assert_queue("a", QueueOptions::durable()).await.unwrap();
    channel.bind_queue("a", EXCHANGE, "user.*").await.unwrap();
    publish(&channel, "user.created", "x").await;
    assert_eq!(broker.message_count("a"), Some(0));
    channel.bind_queue("a", EXCHANGE, "user.created").await.unwrap();
    publish(&channel, "user.created", "x").await;
    assert_eq!(broker.message_count("a"), Some(1));

    channel
        .assert_exchange("fan", ExchangeKind::Fanout, ExchangeOptions::durable())
        .await
        .unwrap();
    channel.assert_queue("b", QueueOptions::durable()).await.unwrap();
    channel.bind_queue("a", "fan", "ignored").await.unwrap();
    channel.bind_queue("b", "fan", "").await.unwrap();
    channel
        .publish("fan", "anything", Bytes::new(), MessageProperties::default())
        .await
        .unwrap();
    assert_eq!(broker.message_count("a"), Some(2));
    assert_eq!(broker.message_count("b"), Some(1));
}

#[tokio::test]
async fn test_default_exchange_routes_by_queue_name() {
    let (broker, _pool, channel) = setup(ExchangeKind::Topic).await;
    channel.assert_queue("direct", QueueOptions::durable()).await.unwrap();
    channel
        .publish("", "direct", Bytes::new(), MessageProperties::default())
        .await
        .unwrap();
    channel
        .publish("", "nowhere", Bytes::new(), MessageProperties::default())
        .await
        .unwrap();
    assert_eq!(broker.message_count("direct"), Some(1));

    let err = channel.bind_queue("direct", "", "direct").await.unwrap_err();
    assert!(matches!(err, Error::AccessRefused(_)));
    let err = channel
        .publish("missing", "x", Bytes::new(), MessageProperties::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_consumers_share_a_queue_round_robin() {
    let (broker, pool, channel) = setup(ExchangeKind::Topic).await;
    channel.assert_queue("work", QueueOptions::durable()).await.unwrap();
    channel.bind_queue("work", EXCHANGE, "job.#").await.unwrap();

    let second = pool.acquire_channel().await.unwrap();
    let mut first_consumer = channel.consume("work").await.unwrap();
    let mut second_consumer = second.consume("work").await.unwrap();
    assert_eq!(broker.consumer_count("work"), Some(2));

    for _ in 0..4 {
        publish(&channel, "job.run", "j").await;
    }
    for _ in 0..2 {
        let delivery = next(&mut first_consumer).await;
        channel.ack(delivery.delivery_tag).await.unwrap();
        let delivery = next(&mut second_consumer).await;
        second.ack(delivery.delivery_tag).await.unwrap();
    }
    assert_silent(&mut first_consumer).await;
    assert_eq!(broker.unacked_count(), 0);
}

#[tokio::test]
async fn test_ack_and_nack() {
    let (broker, pool, channel) = setup(ExchangeKind::Topic).await;
    channel.assert_queue("q", QueueOptions::durable()).await.unwrap();
    channel.bind_queue("q", EXCHANGE, "#").await.unwrap();
    let mut consumer = channel.consume("q").await.unwrap();

    publish(&channel, "a", "1").await;
    let delivery = next(&mut consumer).await;

    let other = pool.acquire_channel().await.unwrap();
    let err = other.ack(delivery.delivery_tag).await.unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed(_)));

    channel.nack(delivery.delivery_tag, true).await.unwrap();
    let redelivered = next(&mut consumer).await;
    assert!(redelivered.redelivered);
    assert_eq!(redelivered.body, delivery.body);

    channel.nack(redelivered.delivery_tag, false).await.unwrap();
    let err = channel.ack(redelivered.delivery_tag).await.unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed(_)));

    let dead = broker.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].queue, "q");
    assert_eq!(dead[0].routing_key, "a");
    assert_eq!(broker.unacked_count(), 0);
}

#[tokio::test]
async fn test_cancel_ends_stream_and_auto_deletes() {
    let (broker, _pool, channel) = setup(ExchangeKind::Topic).await;
    channel
        .assert_queue("node.1", QueueOptions::exclusive())
        .await
        .unwrap();
    channel.bind_queue("node.1", EXCHANGE, "#").await.unwrap();

    let mut consumer = channel.consume("node.1").await.unwrap();
    publish(&channel, "a", "1").await;
    channel.cancel(consumer.tag()).await.unwrap();

    // Already handed out before the cancel, so still drained.
    let delivery = next(&mut consumer).await;
    assert_eq!(delivery.routing_key, "a");
    assert!(consumer.next().await.is_none());

    assert!(broker.bindings("node.1").is_empty());
    assert!(!broker.queue_names().contains(&"node.1".to_string()));
    channel.ack(delivery.delivery_tag).await.unwrap();
}

#[tokio::test]
async fn test_closing_a_channel_requeues_unacked() {
    let (broker, pool, channel) = setup(ExchangeKind::Topic).await;
    channel.assert_queue("q", QueueOptions::durable()).await.unwrap();
    channel.bind_queue("q", EXCHANGE, "#").await.unwrap();

    let doomed = pool.acquire_channel().await.unwrap();
    let mut consumer = doomed.consume("q").await.unwrap();
    publish(&channel, "first", "1").await;
    publish(&channel, "second", "2").await;
    assert_eq!(next(&mut consumer).await.routing_key, "first");

    doomed.close();
    assert!(!doomed.is_open());
    assert!(matches!(
        doomed.ack(1).await.unwrap_err(),
        Error::ChannelClosed(_)
    ));
    assert_eq!(broker.message_count("q"), Some(2));
    assert_eq!(broker.consumer_count("q"), Some(0));

    let mut consumer = channel.consume("q").await.unwrap();
    let delivery = next(&mut consumer).await;
    assert_eq!(delivery.routing_key, "first");
    assert!(delivery.redelivered);
}

#[tokio::test]
async fn test_pool_reuses_released_channels() {
    let broker = MemoryBroker::new();
    let pool = MemoryChannelPool::connect(&broker);

    let channel = pool.acquire_channel().await.unwrap();
    let id = channel.id();
    pool.release_channel(channel).await;
    assert_eq!(pool.acquire_channel().await.unwrap().id(), id);

    let info = pool
        .using_channel(|channel| async move {
            channel.assert_queue("scoped", QueueOptions::durable()).await
        })
        .await
        .unwrap();
    assert_eq!(info.name, "scoped");
    assert_eq!(info.consumer_count, 0);
}

#[tokio::test]
async fn test_adapter_lifecycle() {
    let broker = MemoryBroker::new();
    let pool = MemoryChannelPool::connect(&broker);
    pool.initialize().await.unwrap();
    assert_eq!(pool.adaptee().queue_names(), Vec::<String>::new());

    pool.destroy().await.unwrap();
    assert!(!pool.is_open());
    assert!(matches!(
        pool.acquire_channel().await.unwrap_err(),
        Error::ConnectionClosed(_)
    ));
    assert!(matches!(
        pool.initialize().await.unwrap_err(),
        AdapterError::Failed { .. }
    ));
}
