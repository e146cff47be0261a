// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Specifications and Bindings
//!
//! A queue is described by its name, a durability class and an optional
//! dead-letter exchange. The durability class alone fixes the
//! `(durable, auto_delete, exclusive)` triple sent to the broker; the three
//! flags cannot be combined independently.

use lapin::{
    options::QueueDeclareOptions,
    types::{AMQPValue, FieldTable, LongString, ShortString},
};
use std::collections::BTreeMap;

/// Queue argument naming the exchange that receives discarded messages
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";

/// Lifetime class of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Durability {
    /// Survives broker restarts and is shared between connections.
    Durable,
    /// Exclusive to the declaring connection, deleted when it closes.
    Transient,
}

/// The broker-level flags a durability class stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFlags {
    pub durable: bool,
    pub auto_delete: bool,
    pub exclusive: bool,
}

impl Durability {
    pub const fn flags(self) -> QueueFlags {
        match self {
            Durability::Durable => QueueFlags {
                durable: true,
                auto_delete: false,
                exclusive: false,
            },
            Durability::Transient => QueueFlags {
                durable: false,
                auto_delete: true,
                exclusive: true,
            },
        }
    }
}

/// Declaration parameters of a single queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub(crate) name: String,
    pub(crate) durability: Durability,
    pub(crate) dead_letter_exchange: Option<String>,
}

impl QueueSpec {
    pub fn new(name: &str, durability: Durability) -> QueueSpec {
        QueueSpec {
            name: name.to_owned(),
            durability,
            dead_letter_exchange: None,
        }
    }

    /// A durable, shared queue.
    pub fn durable(name: &str) -> QueueSpec {
        QueueSpec::new(name, Durability::Durable)
    }

    /// An exclusive, auto-deleted queue tied to the declaring connection.
    pub fn transient(name: &str) -> QueueSpec {
        QueueSpec::new(name, Durability::Transient)
    }

    /// Routes messages discarded from this queue to `exchange`.
    pub fn with_dead_letter_exchange(mut self, exchange: &str) -> Self {
        self.dead_letter_exchange = Some(exchange.to_owned());
        self
    }

    /// Uses `exchange` as dead-letter exchange unless one is already set.
    pub fn or_dead_letter_exchange(mut self, exchange: Option<&str>) -> Self {
        if self.dead_letter_exchange.is_none() {
            self.dead_letter_exchange = exchange.map(str::to_owned);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }

    pub fn dead_letter_exchange(&self) -> Option<&str> {
        self.dead_letter_exchange.as_deref()
    }

    pub(crate) fn declare_options(&self) -> QueueDeclareOptions {
        let flags = self.durability.flags();
        QueueDeclareOptions {
            passive: false,
            durable: flags.durable,
            exclusive: flags.exclusive,
            auto_delete: flags.auto_delete,
            nowait: false,
        }
    }

    pub(crate) fn arguments(&self) -> FieldTable {
        let mut args = BTreeMap::new();

        if let Some(dlx) = &self.dead_letter_exchange {
            args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
                AMQPValue::LongString(LongString::from(dlx.as_str())),
            );
        }

        FieldTable::from(args)
    }
}

/// A queue bound to an exchange under a routing key pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub(crate) exchange: String,
    pub(crate) routing_key: String,
    pub(crate) queue: QueueSpec,
}

impl QueueBinding {
    /// Binds `queue` to `exchange` under `routing_key` (exact key or topic pattern).
    pub fn new(exchange: &str, routing_key: &str, queue: QueueSpec) -> QueueBinding {
        QueueBinding {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            queue,
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn queue(&self) -> &QueueSpec {
        &self.queue
    }
}
