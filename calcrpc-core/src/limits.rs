//! Message size limits.
//!
//! - **Receive limit**: largest incoming message accepted. Checked against the
//!   envelope length before the payload is buffered.
//! - **Send limit**: largest outgoing message produced. Checked after encoding.

use crate::error::Status;

/// Configuration for message size limits.
///
/// By default, no limits are applied.
///
/// ```rust
/// use calcrpc_core::MessageLimits;
///
/// let limits = MessageLimits::new()
///     .receive_max_bytes(4 * 1024 * 1024)
///     .send_max_bytes(1024 * 1024);
/// assert!(limits.check_send(512).is_ok());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageLimits {
    receive_max_bytes: Option<usize>,
    send_max_bytes: Option<usize>,
}

impl MessageLimits {
    /// Create new limits with no restrictions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum size for incoming messages.
    pub fn receive_max_bytes(mut self, max: usize) -> Self {
        self.receive_max_bytes = Some(max);
        self
    }

    /// Set the maximum size for outgoing messages.
    pub fn send_max_bytes(mut self, max: usize) -> Self {
        self.send_max_bytes = Some(max);
        self
    }

    /// Returns the maximum receive message size, or `None` if unlimited.
    pub fn get_receive_max_bytes(&self) -> Option<usize> {
        self.receive_max_bytes
    }

    /// Returns the maximum send message size, or `None` if unlimited.
    pub fn get_send_max_bytes(&self) -> Option<usize> {
        self.send_max_bytes
    }

    /// Check an encoded outgoing message against the send limit.
    pub fn check_send(&self, size: usize) -> Result<(), Status> {
        if let Some(max) = self.send_max_bytes
            && size > max
        {
            return Err(Status::resource_exhausted(format!(
                "message size {} bytes exceeds maximum allowed size of {} bytes",
                size, max
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;

    #[test]
    fn test_default_is_unlimited() {
        let limits = MessageLimits::default();
        assert_eq!(limits.get_receive_max_bytes(), None);
        assert_eq!(limits.get_send_max_bytes(), None);
        assert!(limits.check_send(usize::MAX).is_ok());
    }

    #[test]
    fn test_check_send() {
        let limits = MessageLimits::new().send_max_bytes(100);
        assert!(limits.check_send(100).is_ok());

        let err = limits.check_send(101).unwrap_err();
        assert_eq!(err.code(), Code::ResourceExhausted);
        assert_eq!(
            err.message(),
            Some("message size 101 bytes exceeds maximum allowed size of 100 bytes")
        );
    }
}
