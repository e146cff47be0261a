// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publisher
//!
//! Encodes typed values with a codec and sends them to an exchange under a
//! routing key. Messages are published non-mandatory and non-immediate and
//! no broker confirmation is awaited. Failures are returned to the caller,
//! which owns any retry policy.

use crate::{
    channel::BrokerClient,
    codec::{BinaryCodec, Codec, Envelope, JsonCodec},
    errors::AmqpError,
    otel,
};
use async_trait::async_trait;
use lapin::{options::BasicPublishOptions, types::ShortString, BasicProperties, Channel};
#[cfg(test)]
use mockall::automock;
use opentelemetry::Context;
use serde::Serialize;
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, error};
use uuid::Uuid;

/// Sends already-encoded envelopes to the broker.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn send(
        &self,
        ctx: &Context,
        exchange: &str,
        routing_key: &str,
        envelope: &Envelope,
    ) -> Result<(), AmqpError>;
}

/// Publisher writing to a dedicated channel of its own.
pub struct RabbitMQPublisher {
    channel: Channel,
}

impl RabbitMQPublisher {
    pub fn new(channel: Channel) -> Arc<RabbitMQPublisher> {
        Arc::new(RabbitMQPublisher { channel })
    }

    /// Opens a fresh channel on `client` for publishing only.
    pub async fn open(client: &BrokerClient) -> Result<Arc<RabbitMQPublisher>, AmqpError> {
        Ok(RabbitMQPublisher::new(client.open_channel().await?))
    }
}

#[async_trait]
impl Publisher for RabbitMQPublisher {
    async fn send(
        &self,
        ctx: &Context,
        exchange: &str,
        routing_key: &str,
        envelope: &Envelope,
    ) -> Result<(), AmqpError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let properties = BasicProperties::default()
            .with_content_type(ShortString::from(envelope.content_type.as_str()))
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
            .with_timestamp(timestamp)
            .with_headers(otel::inject_headers(ctx));

        match self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &envelope.body,
                properties,
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    exchange, routing_key, "error publishing message"
                );
                Err(AmqpError::PublishingError {
                    exchange: exchange.to_owned(),
                    key: routing_key.to_owned(),
                    reason: err.to_string(),
                })
            }
            _ => {
                debug!(
                    exchange,
                    routing_key,
                    content_type = %envelope.content_type,
                    "message published"
                );
                Ok(())
            }
        }
    }
}

/// Encodes `value` with `codec` and publishes it.
///
/// Returns `AmqpError::EncodingError` without touching the broker when the
/// value cannot be encoded.
pub async fn publish<P, T, C>(
    publisher: &P,
    ctx: &Context,
    exchange: &str,
    routing_key: &str,
    value: &T,
    codec: &C,
) -> Result<(), AmqpError>
where
    P: Publisher + ?Sized,
    T: Serialize + Sync,
    C: Codec,
{
    let envelope = Envelope::seal(codec, value).map_err(|err| {
        error!(error = err.to_string(), exchange, routing_key, "error encoding message");
        err
    })?;

    publisher.send(ctx, exchange, routing_key, &envelope).await
}

/// Publishes `value` as JSON.
pub async fn publish_json<P, T>(
    publisher: &P,
    ctx: &Context,
    exchange: &str,
    routing_key: &str,
    value: &T,
) -> Result<(), AmqpError>
where
    P: Publisher + ?Sized,
    T: Serialize + Sync,
{
    publish(publisher, ctx, exchange, routing_key, value, &JsonCodec).await
}

/// Publishes `value` in the binary encoding.
pub async fn publish_binary<P, T>(
    publisher: &P,
    ctx: &Context,
    exchange: &str,
    routing_key: &str,
    value: &T,
) -> Result<(), AmqpError>
where
    P: Publisher + ?Sized,
    T: Serialize + Sync,
{
    publish(publisher, ctx, exchange, routing_key, value, &BinaryCodec).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ContentType;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct PlayingState {
        #[serde(rename = "IsPaused")]
        is_paused: bool,
    }

    #[tokio::test]
    async fn test_publish_json_sends_tagged_body() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_send()
            .withf(|_, exchange, key, envelope| {
                exchange == "peril_direct"
                    && key == "pause"
                    && envelope.content_type == ContentType::Json
                    && envelope.body == br#"{"IsPaused":true}"#
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let res = publish_json(
            &publisher,
            &Context::new(),
            "peril_direct",
            "pause",
            &PlayingState { is_paused: true },
        )
        .await;

        assert_eq!(res, Ok(()));
    }

    #[tokio::test]
    async fn test_publish_binary_tags_binary_content_type() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_send()
            .withf(|_, _, key, envelope| {
                key == "game_logs.alice"
                    && envelope.content_type == ContentType::Binary
                    && BinaryCodec.decode::<PlayingState>(&envelope.body).ok()
                        == Some(PlayingState { is_paused: false })
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        publish_binary(
            &publisher,
            &Context::new(),
            "peril_topic",
            "game_logs.alice",
            &PlayingState { is_paused: false },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_encoding_failure_never_reaches_the_broker() {
        let mut publisher = MockPublisher::new();
        publisher.expect_send().never();

        let mut unrepresentable = HashMap::new();
        unrepresentable.insert((1, 1), 1);

        let res = publish_json(
            &publisher,
            &Context::new(),
            "peril_direct",
            "pause",
            &unrepresentable,
        )
        .await;

        assert!(matches!(res, Err(AmqpError::EncodingError(_))));
    }

    #[tokio::test]
    async fn test_broker_rejection_is_returned_unchanged() {
        let rejection = AmqpError::PublishingError {
            exchange: "missing".to_owned(),
            key: "pause".to_owned(),
            reason: "NOT_FOUND - no exchange 'missing'".to_owned(),
        };
        let returned = rejection.to_string();

        let mut publisher = MockPublisher::new();
        publisher
            .expect_send()
            .withf(|_, exchange, key, _| exchange == "missing" && key == "pause")
            .times(1)
            .returning(|_, _, _, _| {
                Err(AmqpError::PublishingError {
                    exchange: "missing".to_owned(),
                    key: "pause".to_owned(),
                    reason: "NOT_FOUND - no exchange 'missing'".to_owned(),
                })
            });

        let res = publish_json(
            &publisher,
            &Context::new(),
            "missing",
            "pause",
            &PlayingState { is_paused: true },
        )
        .await;

        assert_eq!(res.unwrap_err().to_string(), returned);
    }
}
