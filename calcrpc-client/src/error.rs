//! Client-side error types.
//!
//! This module provides [`ClientError`], the error type for calls, and
//! [`ClientBuildError`] for client construction.

use std::path::PathBuf;

use calcrpc_core::{ChannelError, Code, EnvelopeError, Status};

/// Ways a call can fail on the client side.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// The call ended with a non-ok status, reported by the server or
    /// produced locally (deadline, cancellation).
    #[error("{0}")]
    Status(Status),

    /// Transport-level error (connection failed, stream reset, etc.).
    #[error("transport error: {0}")]
    Transport(String),

    /// Message encoding error.
    #[error("encode error: {0}")]
    Encode(String),

    /// Message decoding error.
    #[error("decode error: {0}")]
    Decode(String),

    /// Protocol error (malformed frames, unexpected data, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Get the status code.
    ///
    /// For non-Status variants, returns an appropriate code:
    /// - Transport: `Unavailable`
    /// - Encode/Decode/Protocol: `Internal`
    pub fn code(&self) -> Code {
        match self {
            ClientError::Status(status) => status.code(),
            ClientError::Transport(_) => Code::Unavailable,
            ClientError::Encode(_) | ClientError::Decode(_) | ClientError::Protocol(_) => {
                Code::Internal
            }
        }
    }

    /// Get the error message.
    pub fn message(&self) -> Option<&str> {
        match self {
            ClientError::Status(status) => status.message(),
            ClientError::Transport(msg)
            | ClientError::Encode(msg)
            | ClientError::Decode(msg)
            | ClientError::Protocol(msg) => Some(msg),
        }
    }

    /// Reduce to a status.
    pub fn into_status(self) -> Status {
        match self {
            ClientError::Status(status) => status,
            other => Status::new(other.code(), other.to_string()),
        }
    }
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        ClientError::Status(status)
    }
}

impl From<EnvelopeError> for ClientError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::MessageTooLarge { .. } => {
                ClientError::Status(Status::resource_exhausted(err.to_string()))
            }
            other => ClientError::Protocol(other.to_string()),
        }
    }
}

impl From<ChannelError> for ClientError {
    fn from(err: ChannelError) -> Self {
        ClientError::Status(err.into_status())
    }
}

/// Errors raised while building a client.
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to load CA certificates from {path}: {reason}")]
    CaFile { path: PathBuf, reason: String },

    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] rustls::Error),
}
