// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delivery Loop
//!
//! Drives one subscription: pulls deliveries off the consumer stream in
//! receipt order, decodes each with the subscription's codec, hands the
//! payload to the handler and resolves the delivery according to the
//! handler's verdict. A delivery is always resolved before the next one is
//! pulled, so at most one delivery is in the handler at a time and the
//! queue order is kept.
//!
//! Per-message failures (undecodable bodies, failed ack/nack calls, handler
//! panics) are logged and counted; none of them stops the loop. The loop
//! ends when the stream closes or the subscription is cancelled.

use crate::{
    codec::Codec,
    errors::AmqpError,
    handler::{AckAction, AckType, Handler},
    otel,
};
use async_trait::async_trait;
use futures_util::{FutureExt, Stream, StreamExt};
use lapin::{
    acker::Acker,
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions},
    BasicProperties,
};
#[cfg(test)]
use mockall::automock;
use opentelemetry::{
    global::{self, BoxedSpan, BoxedTracer},
    trace::{Span, Status},
};
use serde::de::DeserializeOwned;
use std::{borrow::Cow, fmt::Display, marker::PhantomData, panic::AssertUnwindSafe};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// What to do with a delivery whose body cannot be decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeFailurePolicy {
    /// Log and skip without resolving. The delivery stays unacknowledged,
    /// occupies one prefetch slot, and is only handed back by the broker
    /// when the channel closes.
    #[default]
    LeaveUnresolved,
    /// Negative-acknowledge without requeue, dead-lettering it when the
    /// queue has a dead-letter exchange.
    Discard,
}

/// Counters of what a delivery loop did over its lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStats {
    pub acked: u64,
    pub requeued: u64,
    pub discarded: u64,
    pub undecodable: u64,
    pub ack_failures: u64,
    pub handler_panics: u64,
    pub stream_errors: u64,
}

/// Resolves a single delivery on the broker.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn resolve(&self, action: AckAction) -> Result<(), AmqpError>;
}

#[async_trait]
impl Acknowledger for Acker {
    async fn resolve(&self, action: AckAction) -> Result<(), AmqpError> {
        match action {
            AckAction::Ack => self
                .ack(BasicAckOptions { multiple: false })
                .await
                .map_err(|err| AmqpError::AckMessageError(err.to_string())),
            AckAction::Nack { requeue } => self
                .nack(BasicNackOptions {
                    multiple: false,
                    requeue,
                })
                .await
                .map_err(|err| AmqpError::NackMessageError(err.to_string())),
        }
    }
}

/// A received message and the means to resolve it.
pub struct Inbound<A> {
    pub delivery_tag: u64,
    pub routing_key: String,
    pub redelivered: bool,
    pub properties: BasicProperties,
    pub data: Vec<u8>,
    pub acker: A,
}

impl From<Delivery> for Inbound<Acker> {
    fn from(delivery: Delivery) -> Self {
        Inbound {
            delivery_tag: delivery.delivery_tag,
            routing_key: delivery.routing_key.as_str().to_owned(),
            redelivered: delivery.redelivered,
            properties: delivery.properties,
            data: delivery.data,
            acker: delivery.acker,
        }
    }
}

pub(crate) struct DeliveryLoop<T, C, H> {
    queue: String,
    codec: C,
    handler: H,
    on_decode_failure: DecodeFailurePolicy,
    shutdown: CancellationToken,
    _payload: PhantomData<fn() -> T>,
}

impl<T, C, H> DeliveryLoop<T, C, H>
where
    T: DeserializeOwned + Send + 'static,
    C: Codec,
    H: Handler<T>,
{
    pub(crate) fn new(
        queue: &str,
        codec: C,
        handler: H,
        on_decode_failure: DecodeFailurePolicy,
        shutdown: CancellationToken,
    ) -> Self {
        DeliveryLoop {
            queue: queue.to_owned(),
            codec,
            handler,
            on_decode_failure,
            shutdown,
            _payload: PhantomData,
        }
    }

    /// Consumes `deliveries` until the stream ends or the loop is cancelled.
    pub(crate) async fn run<S, A, E>(self, mut deliveries: S) -> DeliveryStats
    where
        S: Stream<Item = Result<Inbound<A>, E>> + Unpin,
        A: Acknowledger,
        E: Display,
    {
        let tracer = global::tracer(otel::CONSUMER_TRACER);
        let mut stats = DeliveryStats::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!(queue = %self.queue, "subscription cancelled");
                    break;
                }
                next = deliveries.next() => next,
            };

            match next {
                Some(Ok(delivery)) => self.process(&tracer, delivery, &mut stats).await,
                Some(Err(err)) => {
                    stats.stream_errors += 1;
                    error!(error = err.to_string(), queue = %self.queue, "errors consume msg");
                }
                None => {
                    debug!(queue = %self.queue, "delivery stream closed");
                    break;
                }
            }
        }

        stats
    }

    async fn process<A: Acknowledger>(
        &self,
        tracer: &BoxedTracer,
        delivery: Inbound<A>,
        stats: &mut DeliveryStats,
    ) {
        let (_ctx, mut span) =
            otel::consumer_span(&delivery.properties, tracer, &delivery.routing_key);

        debug!(
            queue = %self.queue,
            routing_key = %delivery.routing_key,
            delivery_tag = delivery.delivery_tag,
            redelivered = delivery.redelivered,
            "received"
        );

        let payload = match self.codec.decode::<T>(&delivery.data) {
            Ok(payload) => payload,
            Err(err) => {
                stats.undecodable += 1;
                warn!(
                    error = err.to_string(),
                    queue = %self.queue,
                    routing_key = %delivery.routing_key,
                    delivery_tag = delivery.delivery_tag,
                    "failure to decode delivery"
                );
                span.record_error(&err);
                span.set_status(Status::Error {
                    description: Cow::from("failure to decode delivery"),
                });

                match self.on_decode_failure {
                    DecodeFailurePolicy::LeaveUnresolved => {}
                    DecodeFailurePolicy::Discard => {
                        self.resolve(&delivery, AckType::NackDiscard, &mut span, stats)
                            .await
                    }
                }
                return;
            }
        };

        let verdict = match AssertUnwindSafe(self.handler.handle(payload))
            .catch_unwind()
            .await
        {
            Ok(verdict) => verdict,
            Err(_) => {
                stats.handler_panics += 1;
                error!(
                    queue = %self.queue,
                    routing_key = %delivery.routing_key,
                    "handler panicked, discarding message"
                );
                AckType::NackDiscard
            }
        };

        self.resolve(&delivery, verdict, &mut span, stats).await;
    }

    async fn resolve<A: Acknowledger>(
        &self,
        delivery: &Inbound<A>,
        verdict: AckType,
        span: &mut BoxedSpan,
        stats: &mut DeliveryStats,
    ) {
        match delivery.acker.resolve(verdict.action()).await {
            Ok(()) => {
                match verdict {
                    AckType::Ack => stats.acked += 1,
                    AckType::NackRequeue => stats.requeued += 1,
                    AckType::NackDiscard => stats.discarded += 1,
                }
                debug!(
                    queue = %self.queue,
                    delivery_tag = delivery.delivery_tag,
                    verdict = %verdict,
                    "message resolved"
                );
                span.set_status(Status::Ok);
            }
            Err(err) => {
                stats.ack_failures += 1;
                error!(
                    error = err.to_string(),
                    queue = %self.queue,
                    routing_key = %delivery.routing_key,
                    verdict = %verdict,
                    "failure to resolve message"
                );
                span.record_error(&err);
                span.set_status(Status::Error {
                    description: Cow::from("failure to resolve message"),
                });
            }
        }
    }
}
