// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Subscriber
//!
//! Sets up a subscription: declares and binds its queue through the topology
//! manager, bounds the channel's prefetch window, starts a manual-ack
//! consumer and spawns the delivery loop on its own task. Every
//! subscription owns a dedicated channel. Setup failures are returned before
//! anything is spawned.

use crate::{
    channel::BrokerClient,
    codec::{BinaryCodec, Codec, JsonCodec},
    configs::{Configs, DEFAULT_PREFETCH},
    consumer::{DecodeFailurePolicy, DeliveryLoop, DeliveryStats, Inbound},
    errors::AmqpError,
    handler::Handler,
    queue::QueueBinding,
    topology::{AmqpTopology, Topology},
};
use futures_util::StreamExt;
use lapin::{
    options::{BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

/// Tuning applied to each subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Maximum number of unresolved deliveries buffered for the subscription.
    pub prefetch: u16,
    /// Consumer tag; a unique one is generated when unset.
    pub consumer_tag: Option<String>,
    pub on_decode_failure: DecodeFailurePolicy,
    /// Dead-letter exchange given to queues declared without one.
    pub dead_letter_exchange: Option<String>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        SubscribeOptions {
            prefetch: DEFAULT_PREFETCH,
            consumer_tag: None,
            on_decode_failure: DecodeFailurePolicy::default(),
            dead_letter_exchange: None,
        }
    }
}

impl SubscribeOptions {
    pub fn from_configs(cfg: &Configs) -> SubscribeOptions {
        SubscribeOptions {
            prefetch: cfg.rabbitmq.prefetch,
            dead_letter_exchange: cfg.rabbitmq.dead_letter_exchange.clone(),
            ..SubscribeOptions::default()
        }
    }

    pub fn prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn consumer_tag(mut self, tag: &str) -> Self {
        self.consumer_tag = Some(tag.to_owned());
        self
    }

    pub fn on_decode_failure(mut self, policy: DecodeFailurePolicy) -> Self {
        self.on_decode_failure = policy;
        self
    }

    pub fn dead_letter_exchange(mut self, exchange: &str) -> Self {
        self.dead_letter_exchange = Some(exchange.to_owned());
        self
    }

    /// Applies the fallback dead-letter exchange to `binding`'s queue.
    pub(crate) fn resolve_binding(&self, binding: &QueueBinding) -> QueueBinding {
        QueueBinding {
            queue: binding
                .queue
                .clone()
                .or_dead_letter_exchange(self.dead_letter_exchange.as_deref()),
            ..binding.clone()
        }
    }

    /// A zero prefetch means "unlimited" to the broker and is refused.
    pub(crate) fn validate(&self) -> Result<(), AmqpError> {
        if self.prefetch == 0 {
            return Err(AmqpError::InvalidPrefetch);
        }
        Ok(())
    }

    fn tag_for(&self, queue: &str) -> String {
        self.consumer_tag
            .clone()
            .unwrap_or_else(|| format!("{}-{}", queue, Uuid::new_v4()))
    }
}

/// A running subscription.
///
/// Runs until its delivery stream closes (connection or channel torn down)
/// or until [`Subscription::cancel`] is called. Dropping the handle does not
/// stop it.
pub struct Subscription {
    queue: String,
    shutdown: CancellationToken,
    handle: JoinHandle<DeliveryStats>,
}

impl Subscription {
    /// Name of the queue the subscription consumes.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Stops the loop before it takes the next delivery. The delivery being
    /// handled, if any, is still resolved.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Token that cancels this subscription, e.g. to tie it to process shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the loop to end and returns what it did.
    pub async fn join(self) -> Result<DeliveryStats, AmqpError> {
        self.handle.await.map_err(|err| {
            error!(error = err.to_string(), queue = %self.queue, "subscription task failed");
            AmqpError::InternalError(err.to_string())
        })
    }
}

/// Creates subscriptions on a broker connection.
#[derive(Clone)]
pub struct RabbitMQSubscriber {
    topology: AmqpTopology,
    options: SubscribeOptions,
}

impl RabbitMQSubscriber {
    pub fn new(client: BrokerClient) -> RabbitMQSubscriber {
        RabbitMQSubscriber {
            topology: AmqpTopology::new(client),
            options: SubscribeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SubscribeOptions) -> Self {
        self.options = options;
        self
    }

    /// Binds the queue, then consumes it with `codec` and `handler`.
    ///
    /// # Example
    /// ```no_run
    /// # use amqp_pubsub::{channel::BrokerClient, errors::AmqpError};
    /// # async fn run(client: BrokerClient) -> Result<(), AmqpError> {
    /// use amqp_pubsub::{
    ///     codec::JsonCodec, handler::AckType, queue::{QueueBinding, QueueSpec},
    ///     subscriber::RabbitMQSubscriber,
    /// };
    ///
    /// let queue = QueueSpec::transient("pause.alice");
    /// let binding = QueueBinding::new("peril_direct", "pause", queue);
    /// let subscription = RabbitMQSubscriber::new(client)
    ///     .subscribe(&binding, JsonCodec, |paused: bool| {
    ///         println!("paused: {paused}");
    ///         AckType::Ack
    ///     })
    ///     .await?;
    /// subscription.cancel();
    /// # Ok(())
    /// # }
    /// ```
    pub async fn subscribe<T, C, H>(
        &self,
        binding: &QueueBinding,
        codec: C,
        handler: H,
    ) -> Result<Subscription, AmqpError>
    where
        T: DeserializeOwned + Send + 'static,
        C: Codec,
        H: Handler<T>,
    {
        self.options.validate()?;

        let binding = self.options.resolve_binding(binding);
        let (channel, queue) = self.topology.declare_and_bind(&binding).await?;
        let queue_name = queue.name().as_str().to_owned();

        if let Err(err) = channel
            .basic_qos(self.options.prefetch, BasicQosOptions { global: false })
            .await
        {
            error!(error = err.to_string(), queue = %queue_name, "failure to configure qos");
            return Err(AmqpError::QoSDeclarationError(err.to_string()));
        }

        let consumer = match channel
            .basic_consume(
                &queue_name,
                &self.options.tag_for(&queue_name),
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                Err(AmqpError::ConsumerDeclarationError(
                    queue_name.clone(),
                    err.to_string(),
                ))
            }
            Ok(c) => Ok(c),
        }?;

        debug!(
            queue = %queue_name,
            exchange = %binding.exchange,
            routing_key = %binding.routing_key,
            prefetch = self.options.prefetch,
            "subscription started"
        );

        let shutdown = CancellationToken::new();
        let delivery_loop = DeliveryLoop::new(
            &queue_name,
            codec,
            handler,
            self.options.on_decode_failure,
            shutdown.clone(),
        );

        let handle = tokio::spawn(async move {
            let deliveries = Box::pin(consumer.map(|res| res.map(Inbound::from)));
            let stats = delivery_loop.run(deliveries).await;

            if let Err(err) = channel.close(200, "OK").await {
                debug!(error = err.to_string(), "channel already closed");
            }

            stats
        });

        Ok(Subscription {
            queue: queue_name,
            shutdown,
            handle,
        })
    }

    /// Subscribes with the JSON codec.
    pub async fn subscribe_json<T, H>(
        &self,
        binding: &QueueBinding,
        handler: H,
    ) -> Result<Subscription, AmqpError>
    where
        T: DeserializeOwned + Send + 'static,
        H: Handler<T>,
    {
        self.subscribe(binding, JsonCodec, handler).await
    }

    /// Subscribes with the binary codec.
    pub async fn subscribe_binary<T, H>(
        &self,
        binding: &QueueBinding,
        handler: H,
    ) -> Result<Subscription, AmqpError>
    where
        T: DeserializeOwned + Send + 'static,
        H: Handler<T>,
    {
        self.subscribe(binding, BinaryCodec, handler).await
    }
}
