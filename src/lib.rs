// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Typed publish/subscribe over an AMQP broker.
//!
//! Publish serde values to an exchange with [`publisher::publish`], or
//! subscribe a [`handler::Handler`] to a queue bound under a routing key with
//! [`subscriber::RabbitMQSubscriber`]. The handler's [`handler::AckType`]
//! verdict decides whether each delivery is acked, requeued or discarded.

mod otel;

pub mod channel;
pub mod codec;
pub mod configs;
pub mod consumer;
pub mod errors;
pub mod exchange;
pub mod handler;
pub mod publisher;
pub mod queue;
pub mod subscriber;
pub mod topology;
