// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Publish/Subscribe Layer
//!
//! The `AmqpError` enum covers every failure the layer can surface: broken
//! broker links, setup-time declaration and binding failures, per-message
//! encoding and decoding failures, publish failures and failures of the
//! acknowledgment action itself.

use thiserror::Error;

/// Represents errors that can occur while publishing or subscribing over AMQP.
///
/// Setup-time variants (`DeclareQueueError`, `BindingExchangeToQueueError`,
/// `QoSDeclarationError`, `ConsumerDeclarationError`) abort a subscription
/// attempt. Per-message variants (`DecodingError`, `AckMessageError`,
/// `NackMessageError`) are logged by the delivery loop and never stop it.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error: {0}")]
    InternalError(String),

    /// The broker could not be reached or the link broke
    #[error("failure to connect: {0}")]
    ConnectionError(String),

    /// A channel could not be opened on the connection
    #[error("failure to create a channel: {0}")]
    ChannelError(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`: {1}")]
    DeclareExchangeError(String, String),

    /// Error declaring a queue with the given name (conflict, permission, broker gone)
    #[error("failure to declare a queue `{0}`: {1}")]
    DeclareQueueError(String, String),

    /// Error binding a queue to an exchange (missing exchange, malformed key)
    #[error("failure to bind queue `{queue}` to exchange `{exchange}` with key `{key}`: {reason}")]
    BindingExchangeToQueueError {
        exchange: String,
        queue: String,
        key: String,
        reason: String,
    },

    /// Error configuring the prefetch window
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// A prefetch of zero would leave the consumer unbounded
    #[error("prefetch count must be greater than zero")]
    InvalidPrefetch,

    /// Error starting a consumer on a queue
    #[error("failure to declare consumer on `{0}`: {1}")]
    ConsumerDeclarationError(String, String),

    /// A value could not be represented by the codec
    #[error("failure to encode payload: {0}")]
    EncodingError(String),

    /// Bytes were malformed, truncated or did not match the expected type
    #[error("failure to decode payload: {0}")]
    DecodingError(String),

    /// The broker rejected a publish
    #[error("failure to publish to `{exchange}` with key `{key}`: {reason}")]
    PublishingError {
        exchange: String,
        key: String,
        reason: String,
    },

    /// Error acknowledging a message
    #[error("failure to ack message: {0}")]
    AckMessageError(String),

    /// Error negative-acknowledging a message
    #[error("failure to nack message: {0}")]
    NackMessageError(String),
}
