// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Connection and Channels
//!
//! `BrokerClient` owns the single AMQP connection of a process and hands out
//! channels on it. It is passed explicitly to the topology manager, the
//! publisher and the subscriber; nothing here is global.

use crate::{configs::Configs, errors::AmqpError};
use lapin::{types::LongString, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{debug, error};

/// Handle to a live broker connection.
///
/// Cloning is cheap: every clone shares the same underlying connection.
/// Channels opened from it are owned by whoever opened them.
#[derive(Clone)]
pub struct BrokerClient {
    connection: Arc<Connection>,
}

impl BrokerClient {
    /// Connects to the broker described by `cfg`.
    ///
    /// # Example
    /// ```no_run
    /// # async fn run() -> Result<(), amqp_pubsub::errors::AmqpError> {
    /// use amqp_pubsub::{channel::BrokerClient, configs::Configs};
    ///
    /// let cfg = Configs::load().expect("configs");
    /// let client = BrokerClient::connect(&cfg).await?;
    /// let channel = client.open_channel().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(cfg: &Configs) -> Result<BrokerClient, AmqpError> {
        BrokerClient::connect_uri(&cfg.amqp_uri(), &cfg.app.name).await
    }

    /// Connects to the broker at `uri`, naming the connection `name`.
    pub async fn connect_uri(uri: &str, name: &str) -> Result<BrokerClient, AmqpError> {
        debug!("creating amqp connection...");
        let options =
            ConnectionProperties::default().with_connection_name(LongString::from(name));

        let connection = match Connection::connect(uri, options).await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(AmqpError::ConnectionError(err.to_string()))
            }
        }?;
        debug!("amqp connected");

        Ok(BrokerClient {
            connection: Arc::new(connection),
        })
    }

    /// Opens a new logical channel on the shared connection.
    pub async fn open_channel(&self) -> Result<Channel, AmqpError> {
        debug!("creating amqp channel...");
        match self.connection.create_channel().await {
            Ok(c) => {
                debug!(channel = c.id(), "channel created");
                Ok(c)
            }
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError(err.to_string()))
            }
        }
    }

    /// Whether the underlying connection is still usable.
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// Closes the connection. Transient queues declared through it are
    /// deleted by the broker and every running subscription on it ends.
    pub async fn close(&self) -> Result<(), AmqpError> {
        debug!("closing amqp connection...");
        self.connection.close(200, "OK").await.map_err(|err| {
            error!(error = err.to_string(), "error to close the connection");
            AmqpError::ConnectionError(err.to_string())
        })
    }
}
