// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Management
//!
//! Declares exchanges and queues and binds queues to exchanges. Declaring a
//! queue that already exists with identical parameters is a no-op on the
//! broker; declaring it with different parameters is rejected by the broker
//! and surfaced as `AmqpError::DeclareQueueError`, never reconciled here.

use crate::{
    channel::BrokerClient,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::QueueBinding,
};
use async_trait::async_trait;
use lapin::{
    options::QueueBindOptions,
    types::FieldTable,
    Channel, Queue,
};
use tracing::{debug, error};

/// Interface of the topology manager.
#[async_trait]
pub trait Topology {
    /// Declares an exchange.
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    /// Declares the binding's queue and binds it to the binding's exchange.
    ///
    /// Returns the channel the declaration ran on, which the caller then
    /// owns, together with the broker's queue descriptor.
    async fn declare_and_bind(&self, binding: &QueueBinding) -> Result<(Channel, Queue), AmqpError>;
}

/// Topology manager backed by a broker connection.
#[derive(Clone)]
pub struct AmqpTopology {
    client: BrokerClient,
}

impl AmqpTopology {
    pub fn new(client: BrokerClient) -> AmqpTopology {
        AmqpTopology { client }
    }
}

#[async_trait]
impl Topology for AmqpTopology {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        let channel = self.client.open_channel().await?;
        debug!(exchange = def.name, "creating exchange");

        match channel
            .exchange_declare(
                &def.name,
                def.kind.into(),
                def.declare_options(),
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name,
                    "error to declare the exchange"
                );
                Err(AmqpError::DeclareExchangeError(
                    def.name.clone(),
                    err.to_string(),
                ))
            }
            _ => Ok(()),
        }?;

        debug!(exchange = def.name, "exchange was created");

        if let Err(err) = channel.close(200, "OK").await {
            debug!(error = err.to_string(), "channel already closed");
        }

        Ok(())
    }

    async fn declare_and_bind(
        &self,
        binding: &QueueBinding,
    ) -> Result<(Channel, Queue), AmqpError> {
        let channel = self.client.open_channel().await?;
        let spec = &binding.queue;

        debug!(
            queue = spec.name,
            durability = ?spec.durability,
            dead_letter_exchange = ?spec.dead_letter_exchange,
            "creating queue"
        );

        let queue = match channel
            .queue_declare(&spec.name, spec.declare_options(), spec.arguments())
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    queue = spec.name,
                    "error to declare the queue"
                );
                Err(AmqpError::DeclareQueueError(
                    spec.name.clone(),
                    err.to_string(),
                ))
            }
            Ok(q) => {
                debug!(queue = spec.name, "queue was created");
                Ok(q)
            }
        }?;

        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            spec.name, binding.exchange, binding.routing_key
        );

        match channel
            .queue_bind(
                &spec.name,
                &binding.exchange,
                &binding.routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");

                Err(AmqpError::BindingExchangeToQueueError {
                    exchange: binding.exchange.clone(),
                    queue: spec.name.clone(),
                    key: binding.routing_key.clone(),
                    reason: err.to_string(),
                })
            }
            _ => Ok(()),
        }?;

        debug!(queue = spec.name, "queue was bounded");

        Ok((channel, queue))
    }
}
