// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Handlers and Acknowledgment Verdicts
//!
//! A handler receives one decoded payload and answers with an [`AckType`].
//! The delivery loop turns that verdict into exactly one broker action:
//!
//! | verdict       | broker action                 |
//! |---------------|-------------------------------|
//! | `Ack`         | ack                           |
//! | `NackRequeue` | nack, requeue                 |
//! | `NackDiscard` | nack, no requeue (DLX if set) |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The handler's decision about a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AckType {
    #[serde(rename = "ack")]
    Ack,
    #[serde(rename = "nackRequeue")]
    NackRequeue,
    #[serde(rename = "nackDiscard")]
    NackDiscard,
}

/// Protocol action that resolves a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckAction {
    Ack,
    Nack { requeue: bool },
}

impl AckType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AckType::Ack => "ack",
            AckType::NackRequeue => "nackRequeue",
            AckType::NackDiscard => "nackDiscard",
        }
    }

    pub const fn action(self) -> AckAction {
        match self {
            AckType::Ack => AckAction::Ack,
            AckType::NackRequeue => AckAction::Nack { requeue: true },
            AckType::NackDiscard => AckAction::Nack { requeue: false },
        }
    }
}

/// Unknown verdict names resolve to `NackDiscard` so no message is left hanging.
impl From<&str> for AckType {
    fn from(value: &str) -> Self {
        match value {
            "ack" => AckType::Ack,
            "nackRequeue" => AckType::NackRequeue,
            _ => AckType::NackDiscard,
        }
    }
}

impl fmt::Display for AckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processes decoded payloads of type `T`.
///
/// Any `Fn(T) -> AckType` closure is a handler. Implement the trait directly
/// when handling needs to await, e.g. to publish a follow-up message.
#[async_trait]
pub trait Handler<T>: Send + Sync + 'static {
    async fn handle(&self, msg: T) -> AckType;
}

#[async_trait]
impl<T, F> Handler<T> for F
where
    T: Send + 'static,
    F: Fn(T) -> AckType + Send + Sync + 'static,
{
    async fn handle(&self, msg: T) -> AckType {
        self(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_verdict_maps_to_a_distinct_action() {
        let verdicts = [AckType::Ack, AckType::NackRequeue, AckType::NackDiscard];
        let actions: HashSet<AckAction> = verdicts.iter().map(|v| v.action()).collect();
        assert_eq!(actions.len(), verdicts.len());

        assert_eq!(AckType::Ack.action(), AckAction::Ack);
        assert_eq!(
            AckType::NackRequeue.action(),
            AckAction::Nack { requeue: true }
        );
        assert_eq!(
            AckType::NackDiscard.action(),
            AckAction::Nack { requeue: false }
        );
    }

    #[test]
    fn test_unknown_verdict_names_discard() {
        assert_eq!(AckType::from("ack"), AckType::Ack);
        assert_eq!(AckType::from("nackRequeue"), AckType::NackRequeue);
        assert_eq!(AckType::from("nackDiscard"), AckType::NackDiscard);
        assert_eq!(AckType::from("retry-later"), AckType::NackDiscard);
        assert_eq!(AckType::from(""), AckType::NackDiscard);
    }

    #[test]
    fn test_verdict_names_match_serde_names() {
        for verdict in [AckType::Ack, AckType::NackRequeue, AckType::NackDiscard] {
            let json = serde_json::to_string(&verdict).unwrap();
            assert_eq!(json, format!("\"{verdict}\""));
        }
    }

    #[tokio::test]
    async fn test_closures_are_handlers() {
        let handler = |paused: bool| {
            if paused {
                AckType::Ack
            } else {
                AckType::NackRequeue
            }
        };
        assert_eq!(handler.handle(true).await, AckType::Ack);
        assert_eq!(Handler::handle(&handler, false).await, AckType::NackRequeue);
    }
}
