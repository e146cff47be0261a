// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! End-to-end scenarios against a live broker reachable through `Configs::load()`.
//! Run with `cargo test -- --ignored`.

use amqp_pubsub::{
    channel::BrokerClient,
    configs::Configs,
    consumer::DecodeFailurePolicy,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    handler::AckType,
    publisher::{publish_json, RabbitMQPublisher},
    queue::{QueueBinding, QueueSpec},
    subscriber::{RabbitMQSubscriber, SubscribeOptions},
    topology::{AmqpTopology, Topology},
};
use lapin::{
    options::{BasicGetOptions, QueueDeclareOptions, QueueDeleteOptions},
    types::FieldTable,
};
use opentelemetry::Context;
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::mpsc, time::timeout};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PlayingState {
    #[serde(rename = "IsPaused")]
    is_paused: bool,
}

async fn connect() -> BrokerClient {
    let cfg = Configs::load().unwrap();
    BrokerClient::connect(&cfg).await.unwrap()
}

fn unique(prefix: &str) -> String {
    format!("{}.{}", prefix, Uuid::new_v4())
}

async fn direct_exchange(client: &BrokerClient) -> String {
    let name = unique("peril_direct");
    AmqpTopology::new(client.clone())
        .declare_exchange(&ExchangeDefinition::new(&name).direct().delete())
        .await
        .unwrap();
    name
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn test_published_pause_is_decoded_and_acked_once() {
    let client = connect().await;
    let exchange = direct_exchange(&client).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let binding = QueueBinding::new(&exchange, "pause", QueueSpec::transient(&unique("pause")));
    let subscription = RabbitMQSubscriber::new(client.clone())
        .subscribe_json(&binding, move |state: PlayingState| {
            tx.send(state).unwrap();
            AckType::Ack
        })
        .await
        .unwrap();

    let publisher = RabbitMQPublisher::open(&client).await.unwrap();
    let sent = PlayingState { is_paused: true };
    publish_json(publisher.as_ref(), &Context::new(), &exchange, "pause", &sent)
        .await
        .unwrap();

    let received = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(received, Some(sent));

    tokio::time::sleep(Duration::from_millis(200)).await;
    subscription.cancel();
    let stats = subscription.join().await.unwrap();
    assert_eq!(stats.acked, 1);
    assert_eq!(stats.requeued + stats.discarded + stats.undecodable, 0);

    client.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn test_requeued_message_is_redelivered_to_the_same_subscription() {
    let client = connect().await;
    let exchange = direct_exchange(&client).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let calls = Arc::new(AtomicUsize::new(0));

    let handler = {
        let calls = calls.clone();
        move |state: PlayingState| {
            tx.send(state).unwrap();
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => AckType::NackRequeue,
                _ => AckType::Ack,
            }
        }
    };

    let binding = QueueBinding::new(&exchange, "pause", QueueSpec::transient(&unique("pause")));
    let subscription = RabbitMQSubscriber::new(client.clone())
        .subscribe_json(&binding, handler)
        .await
        .unwrap();

    let publisher = RabbitMQPublisher::open(&client).await.unwrap();
    let sent = PlayingState { is_paused: false };
    publish_json(publisher.as_ref(), &Context::new(), &exchange, "pause", &sent)
        .await
        .unwrap();

    let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(first, Some(sent.clone()));
    assert_eq!(second, Some(sent));

    tokio::time::sleep(Duration::from_millis(200)).await;
    subscription.cancel();
    let stats = subscription.join().await.unwrap();
    assert_eq!(stats.requeued, 1);
    assert_eq!(stats.acked, 1);

    client.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn test_transient_queue_is_fresh_after_its_connection_closes() {
    let exchange_owner = connect().await;
    let exchange = unique("peril_direct");
    AmqpTopology::new(exchange_owner.clone())
        .declare_exchange(&ExchangeDefinition::new(&exchange).direct())
        .await
        .unwrap();
    let queue = unique("pause");

    let first = connect().await;
    AmqpTopology::new(first.clone())
        .declare_and_bind(&QueueBinding::new(&exchange, "pause", QueueSpec::transient(&queue)))
        .await
        .unwrap();
    first.close().await.unwrap();

    let second = connect().await;
    let (channel, declared) = AmqpTopology::new(second.clone())
        .declare_and_bind(&QueueBinding::new(&exchange, "resume", QueueSpec::transient(&queue)))
        .await
        .unwrap();
    assert_eq!(declared.message_count(), 0);

    let publisher = RabbitMQPublisher::open(&second).await.unwrap();
    publish_json(
        publisher.as_ref(),
        &Context::new(),
        &exchange,
        "pause",
        &PlayingState { is_paused: true },
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let leftover = channel
        .basic_get(&queue, BasicGetOptions { no_ack: true })
        .await
        .unwrap();
    assert!(leftover.is_none());

    let cleanup = exchange_owner.open_channel().await.unwrap();
    cleanup
        .exchange_delete(&exchange, Default::default())
        .await
        .unwrap();
    second.close().await.unwrap();
    exchange_owner.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn test_redeclaring_is_idempotent_and_drift_is_rejected() {
    let client = connect().await;
    let topology = AmqpTopology::new(client.clone());
    let queue = unique("game_logs");
    let binding = QueueBinding::new("amq.topic", "game_logs.*", QueueSpec::durable(&queue));

    topology.declare_and_bind(&binding).await.unwrap();
    topology.declare_and_bind(&binding).await.unwrap();

    let drifted = QueueBinding::new("amq.topic", "game_logs.*", QueueSpec::transient(&queue));
    let res = topology.declare_and_bind(&drifted).await;
    assert!(matches!(res, Err(AmqpError::DeclareQueueError(name, _)) if name == queue));

    let missing = QueueBinding::new(
        &unique("missing"),
        "pause",
        QueueSpec::transient(&unique("pause")),
    );
    let res = topology.declare_and_bind(&missing).await;
    assert!(matches!(res, Err(AmqpError::BindingExchangeToQueueError { .. })));

    let cleanup = client.open_channel().await.unwrap();
    cleanup
        .queue_delete(&queue, QueueDeleteOptions::default())
        .await
        .unwrap();
    client.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn test_unresolved_deliveries_never_exceed_the_prefetch_window() {
    let client = connect().await;
    let exchange = direct_exchange(&client).await;
    let queue = unique("pause");

    let binding = QueueBinding::new(&exchange, "pause", QueueSpec::transient(&queue));
    let subscription = RabbitMQSubscriber::new(client.clone())
        .with_options(
            SubscribeOptions::default()
                .prefetch(3)
                .on_decode_failure(DecodeFailurePolicy::LeaveUnresolved),
        )
        .subscribe_json(&binding, |_: PlayingState| AckType::Ack)
        .await
        .unwrap();

    let publisher = RabbitMQPublisher::open(&client).await.unwrap();
    for n in 0..10 {
        let garbage = format!("not a playing state #{n}");
        publish_json(publisher.as_ref(), &Context::new(), &exchange, "pause", &garbage)
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    let channel = client.open_channel().await.unwrap();
    let ready = channel
        .queue_declare(
            &queue,
            QueueDeclareOptions {
                passive: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .unwrap();
    assert_eq!(ready.message_count(), 7);

    subscription.cancel();
    let stats = subscription.join().await.unwrap();
    assert_eq!(stats.undecodable, 3);
    assert_eq!(stats.acked + stats.requeued + stats.discarded, 0);

    client.close().await.unwrap();
}
