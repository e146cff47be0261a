// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Payload Codecs
//!
//! A codec turns a typed payload into message bytes and back. Two are
//! provided:
//!
//! - [`JsonCodec`]: self-describing structured text. Fields are matched by
//!   name, so reordered fields decode fine.
//! - [`BinaryCodec`]: compact, schema-exact binary (bincode). Field names are
//!   not on the wire; encoder and decoder must be built from the same type
//!   layout. Decoding bytes produced from a different layout is not detected
//!   and may yield garbage values. Keeping the layouts in sync is the
//!   caller's obligation.
//!
//! The codec of a subscription is fixed when it is set up. The content type
//! carried by a message is informational and never used to pick a decoder.

use crate::errors::AmqpError;
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt, str::FromStr};

/// Content type of messages produced by [`JsonCodec`]
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Content type of messages produced by [`BinaryCodec`]
pub const BINARY_CONTENT_TYPE: &str = "application/x-bincode";

/// Which codec produced a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Json,
    Binary,
}

impl ContentType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ContentType::Json => JSON_CONTENT_TYPE,
            ContentType::Binary => BINARY_CONTENT_TYPE,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = AmqpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            JSON_CONTENT_TYPE => Ok(ContentType::Json),
            BINARY_CONTENT_TYPE => Ok(ContentType::Binary),
            other => Err(AmqpError::DecodingError(format!(
                "unknown content type `{other}`"
            ))),
        }
    }
}

/// Serializes payloads of any serde type to bytes and back.
pub trait Codec: Clone + Send + Sync + 'static {
    /// Tag recorded on every message this codec encodes.
    fn content_type(&self) -> ContentType;

    /// # Errors
    /// `AmqpError::EncodingError` when the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, AmqpError>;

    /// # Errors
    /// `AmqpError::DecodingError` on malformed or truncated input, or when
    /// the bytes do not fit `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, AmqpError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> ContentType {
        ContentType::Json
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, AmqpError> {
        serde_json::to_vec(value).map_err(|err| AmqpError::EncodingError(err.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, AmqpError> {
        serde_json::from_slice(data).map_err(|err| AmqpError::DecodingError(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn content_type(&self) -> ContentType {
        ContentType::Binary
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, AmqpError> {
        bincode::serialize(value).map_err(|err| AmqpError::EncodingError(err.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, AmqpError> {
        bincode::deserialize(data).map_err(|err| AmqpError::DecodingError(err.to_string()))
    }
}

/// An encoded message body together with the tag of the codec that made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub content_type: ContentType,
    pub body: Vec<u8>,
}

impl Envelope {
    /// Encodes `value` with `codec`.
    pub fn seal<T: Serialize, C: Codec>(codec: &C, value: &T) -> Result<Envelope, AmqpError> {
        Ok(Envelope {
            content_type: codec.content_type(),
            body: codec.encode(value)?,
        })
    }
}
