//! Server configuration - server-wide static settings.
//!
//! Set once at startup, used to build the session of every call.

use std::time::Duration;

use calcrpc_core::MessageLimits;

/// Default number of messages buffered per call direction.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Server-wide configuration for dispatching calls.
///
/// ```rust
/// use std::time::Duration;
/// use calcrpc::ServerConfig;
/// use calcrpc_core::MessageLimits;
///
/// let config = ServerConfig::new()
///     .timeout(Duration::from_secs(30))
///     .message_limits(MessageLimits::new().receive_max_bytes(1024 * 1024))
///     .channel_capacity(8);
/// assert_eq!(config.get_channel_capacity(), 8);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    timeout: Option<Duration>,
    limits: MessageLimits,
    channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            limits: MessageLimits::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upper bound for every call. A shorter client deadline still wins.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set message size limits.
    pub fn message_limits(mut self, limits: MessageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set how many messages each direction of a call may buffer.
    ///
    /// Values below 1 are raised to 1.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn get_limits(&self) -> MessageLimits {
        self.limits
    }

    pub fn get_channel_capacity(&self) -> usize {
        self.channel_capacity
    }
}
