// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Configuration
//!
//! Settings needed to reach the broker and to tune subscriptions. Values are
//! layered: built-in defaults first, then environment variables using `__` as
//! the nesting separator (`RABBITMQ__HOST`, `RABBITMQ__PREFETCH`, `APP__NAME`).

use config::{Config, ConfigError, Environment};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;

/// Everything but RFC 3986 unreserved characters is escaped in URI userinfo and path.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Default number of unresolved deliveries a subscription may buffer.
pub const DEFAULT_PREFETCH: u16 = 10;

/// Top-level configuration for an application using the layer.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Configs {
    pub app: AppConfigs,
    pub rabbitmq: RabbitMQConfigs,
}

/// Identity of the application, used as the AMQP connection name.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct AppConfigs {
    pub name: String,
}

/// Connection details and subscription tuning for the broker.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RabbitMQConfigs {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub prefetch: u16,
    pub dead_letter_exchange: Option<String>,
}

impl Configs {
    /// Loads the configuration from defaults overlaid with environment variables.
    pub fn load() -> Result<Configs, ConfigError> {
        let builder = Config::builder()
            .set_default("app.name", "amqp-pubsub")?
            .set_default("rabbitmq.host", "localhost")?
            .set_default("rabbitmq.port", 5672_i64)?
            .set_default("rabbitmq.user", "guest")?
            .set_default("rabbitmq.password", "guest")?
            .set_default("rabbitmq.vhost", "/")?
            .set_default("rabbitmq.prefetch", i64::from(DEFAULT_PREFETCH))?
            .add_source(Environment::default().separator("__"));

        builder.build()?.try_deserialize()
    }

    /// Renders the AMQP URI for the configured broker.
    ///
    /// User, password and vhost are percent-encoded, so the default vhost
    /// `/` renders as `%2F`.
    pub fn amqp_uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            utf8_percent_encode(&self.rabbitmq.user, URI_COMPONENT),
            utf8_percent_encode(&self.rabbitmq.password, URI_COMPONENT),
            self.rabbitmq.host,
            self.rabbitmq.port,
            utf8_percent_encode(&self.rabbitmq.vhost, URI_COMPONENT)
        )
    }
}
