//! Message codec.
//!
//! Typed request and response records are serialized either as protobuf
//! (via `prost`) or as JSON (via `serde_json`). The codec of a call is chosen
//! from its Content-Type and applies to both directions.

use bytes::Bytes;
use prost::Message;
use serde::{Serialize, de::DeserializeOwned};

/// Content-Type for protobuf-encoded streams.
pub const CONTENT_TYPE_PROTO: &str = "application/connect+proto";

/// Content-Type for JSON-encoded streams.
pub const CONTENT_TYPE_JSON: &str = "application/connect+json";

/// A record that can travel over the wire with either codec.
pub trait WireMessage: Message + Serialize + DeserializeOwned + Default + Send + 'static {}

impl<T> WireMessage for T where T: Message + Serialize + DeserializeOwned + Default + Send + 'static {}

/// Message encoding errors.
#[derive(Clone, Debug, thiserror::Error)]
pub enum CodecError {
    #[error("protobuf encoding failed: {0}")]
    ProtoEncode(String),
    #[error("protobuf decoding failed: {0}")]
    ProtoDecode(String),
    #[error("JSON encoding failed: {0}")]
    JsonEncode(String),
    #[error("JSON decoding failed: {0}")]
    JsonDecode(String),
}

/// Wire encoding of messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Codec {
    #[default]
    Proto,
    Json,
}

impl Codec {
    /// Select the codec from a Content-Type header value.
    ///
    /// Parameters after `;` are ignored. Returns `None` for unsupported types.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type.split(';').next().unwrap_or("").trim();
        match essence {
            CONTENT_TYPE_PROTO => Some(Codec::Proto),
            CONTENT_TYPE_JSON => Some(Codec::Json),
            _ => None,
        }
    }

    /// Content-Type used for requests and responses with this codec.
    pub fn content_type(&self) -> &'static str {
        match self {
            Codec::Proto => CONTENT_TYPE_PROTO,
            Codec::Json => CONTENT_TYPE_JSON,
        }
    }

    /// Short name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Proto => "proto",
            Codec::Json => "json",
        }
    }

    /// Encode a message.
    pub fn encode<T>(&self, msg: &T) -> Result<Bytes, CodecError>
    where
        T: Message + Serialize,
    {
        match self {
            Codec::Proto => {
                let mut buf = Vec::with_capacity(msg.encoded_len());
                msg.encode(&mut buf)
                    .map_err(|e| CodecError::ProtoEncode(e.to_string()))?;
                Ok(Bytes::from(buf))
            }
            Codec::Json => serde_json::to_vec(msg)
                .map(Bytes::from)
                .map_err(|e| CodecError::JsonEncode(e.to_string())),
        }
    }

    /// Decode a message.
    pub fn decode<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: Message + DeserializeOwned + Default,
    {
        match self {
            Codec::Proto => T::decode(bytes).map_err(|e| CodecError::ProtoDecode(e.to_string())),
            Codec::Json => {
                serde_json::from_slice(bytes).map_err(|e| CodecError::JsonDecode(e.to_string()))
            }
        }
    }
}
