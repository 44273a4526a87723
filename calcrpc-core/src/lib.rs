//! Core protocol types for calcrpc.
//!
//! This crate provides the pieces shared by the server (`calcrpc`) and the
//! client (`calcrpc-client`) crates.
//!
//! ## Modules
//!
//! - [`error`]: Status codes, statuses and error types
//! - [`codec`]: Protobuf and JSON message encoding
//! - [`envelope`]: Streaming envelope framing
//! - [`timeout`]: Deadline header parsing and formatting
//! - [`limits`]: Message size limits
//! - [`session`]: Call sessions and their lifecycle
//! - [`channel`]: Bounded per-direction message channels

pub mod channel;
mod codec;
mod envelope;
mod error;
mod limits;
pub mod session;
mod timeout;

pub use channel::{ChannelError, StreamReceiver, StreamSender, channel};
pub use codec::*;
pub use envelope::*;
pub use error::*;
pub use limits::*;
pub use session::{CallPattern, CallSession, SessionHandle, SessionState};
pub use timeout::*;
