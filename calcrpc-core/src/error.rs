//! Status codes and error types.
//!
//! This module provides the error types shared by the client and the server:
//! - [`Code`]: Protocol status codes
//! - [`Status`]: The terminal status of a call (code plus message)
//! - [`RpcError`]: How a call can fail, before it is reduced to a [`Status`]
//! - [`EnvelopeError`]: Envelope framing errors

use serde::{Deserialize, Serialize, Serializer};

/// RPC status codes, matching the codes defined by the Connect and gRPC protocols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    Ok = 0,
    #[serde(alias = "cancelled")]
    Canceled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Get the string representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Status - terminal status of a call
// ============================================================================

/// Terminal status of an RPC call.
///
/// A status is either `Ok` or a failure carrying a code and a human-readable
/// message. It is the only error representation that crosses the wire.
///
/// ```
/// use calcrpc_core::{Code, Status};
///
/// let status = Status::invalid_argument("received a negative number: -4");
/// assert_eq!(status.code(), Code::InvalidArgument);
/// assert_eq!(status.to_string(), "invalid_argument: received a negative number: -4");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: Option<String>,
}

impl Status {
    /// Create a new status with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// Create a new status with just a code.
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            message: None,
        }
    }

    /// The successful status.
    pub fn ok() -> Self {
        Self::from_code(Code::Ok)
    }

    /// Get the status code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the status message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Whether this status reports success.
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    /// Create a canceled status.
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Canceled, message)
    }

    /// Create an invalid argument status.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Create a deadline exceeded status.
    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// Create a resource exhausted status.
    pub fn resource_exhausted<S: Into<String>>(message: S) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    /// Create an unimplemented status.
    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    /// Create an internal status.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Create an unavailable status.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unavailable, message)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code.as_str())?;
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {}

/// JSON body of a failed status inside an end-of-stream frame.
#[derive(Serialize, Deserialize)]
pub struct ErrorResponseBody {
    pub code: Code,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Serialize for Status {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ErrorResponseBody {
            code: self.code,
            message: self.message.clone(),
        }
        .serialize(serializer)
    }
}

impl From<ErrorResponseBody> for Status {
    fn from(body: ErrorResponseBody) -> Self {
        Self {
            code: body.code,
            message: body.message,
        }
    }
}

// ============================================================================
// RpcError - failure taxonomy
// ============================================================================

/// Generic description used when a handler fault is reported to the caller.
pub const INTERNAL_FAULT_MESSAGE: &str = "internal error";

/// Ways an RPC call can fail.
///
/// Every variant reduces to exactly one [`Status`] via [`RpcError::into_status`].
/// Handler faults never leak their description to the peer; it is only
/// available locally (for logging) through `Display`.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RpcError {
    /// Malformed message or premature close. Fatal to the session.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Input rejected by the handler.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unexpected failure inside a handler.
    #[error("handler fault: {0}")]
    Handler(String),

    /// A status reported as-is.
    #[error("{0}")]
    Status(Status),
}

impl RpcError {
    /// Create a validation error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        RpcError::InvalidArgument(message.into())
    }

    /// Create a handler fault.
    pub fn handler<S: Into<String>>(message: S) -> Self {
        RpcError::Handler(message.into())
    }

    /// The status code this error maps to.
    pub fn code(&self) -> Code {
        match self {
            RpcError::Protocol(_) | RpcError::Handler(_) => Code::Internal,
            RpcError::InvalidArgument(_) => Code::InvalidArgument,
            RpcError::Status(status) => status.code(),
        }
    }

    /// Reduce this error to the status reported to the peer.
    pub fn into_status(self) -> Status {
        match self {
            RpcError::Protocol(msg) => Status::internal(format!("protocol error: {msg}")),
            RpcError::InvalidArgument(msg) => Status::invalid_argument(msg),
            RpcError::Handler(_) => Status::internal(INTERNAL_FAULT_MESSAGE),
            RpcError::Status(status) => status,
        }
    }
}

impl From<Status> for RpcError {
    fn from(status: Status) -> Self {
        RpcError::Status(status)
    }
}

impl From<EnvelopeError> for RpcError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::MessageTooLarge { .. } => {
                RpcError::Status(Status::resource_exhausted(err.to_string()))
            }
            other => RpcError::Protocol(other.to_string()),
        }
    }
}

/// Envelope framing errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// Incomplete envelope header.
    #[error("incomplete envelope header: expected {expected} bytes, got {actual}")]
    IncompleteHeader { expected: usize, actual: usize },

    /// Invalid or unsupported frame flags.
    #[error("invalid frame flags: 0x{0:02x}")]
    InvalidFlags(u8),

    /// A frame announced more bytes than the receive limit allows.
    #[error("message size {size} bytes exceeds maximum allowed size of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// The stream ended in the middle of a frame.
    #[error("stream ended with {0} bytes of an incomplete frame")]
    Truncated(usize),

    /// The end-of-stream payload could not be parsed.
    #[error("malformed end-of-stream frame: {0}")]
    MalformedEndStream(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_as_str() {
        assert_eq!(Code::Ok.as_str(), "ok");
        assert_eq!(Code::InvalidArgument.as_str(), "invalid_argument");
        assert_eq!(Code::DeadlineExceeded.as_str(), "deadline_exceeded");
    }

    #[test]
    fn test_status_display() {
        let status = Status::invalid_argument("bad input");
        assert_eq!(status.to_string(), "invalid_argument: bad input");

        let status = Status::from_code(Code::Internal);
        assert_eq!(status.to_string(), "internal");
    }

    #[test]
    fn test_status_serialize() {
        let status = Status::deadline_exceeded("too slow");
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["code"], "deadline_exceeded");
        assert_eq!(json["message"], "too slow");

        let json = serde_json::to_value(Status::from_code(Code::Internal)).unwrap();
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_status_from_error_body() {
        let body: ErrorResponseBody =
            serde_json::from_str(r#"{"code":"cancelled","message":"gone"}"#).unwrap();
        let status = Status::from(body);
        assert_eq!(status.code(), Code::Canceled);
        assert_eq!(status.message(), Some("gone"));
    }

    #[test]
    fn test_rpc_error_mapping() {
        assert_eq!(
            RpcError::invalid_argument("negative").into_status(),
            Status::invalid_argument("negative")
        );
        assert_eq!(
            RpcError::Status(Status::deadline_exceeded("deadline exceeded"))
                .into_status()
                .code(),
            Code::DeadlineExceeded
        );
        assert_eq!(
            RpcError::Protocol("bad frame".into()).into_status().code(),
            Code::Internal
        );
    }

    #[test]
    fn test_handler_fault_does_not_leak_details() {
        let err = RpcError::handler("db password rejected for user admin");
        assert_eq!(err.code(), Code::Internal);

        let status = err.into_status();
        assert_eq!(status.message(), Some(INTERNAL_FAULT_MESSAGE));
    }

    #[test]
    fn test_envelope_error_mapping() {
        let err = RpcError::from(EnvelopeError::MessageTooLarge { size: 10, max: 5 });
        assert_eq!(err.code(), Code::ResourceExhausted);

        let err = RpcError::from(EnvelopeError::InvalidFlags(0x01));
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(err.to_string(), "protocol error: invalid frame flags: 0x01");
    }
}
