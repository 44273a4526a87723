//! Client runtime for calcrpc services.
//!
//! [`RpcClient`] issues calls in all four patterns over a pooled hyper
//! transport (HTTP/1.1, h2c or TLS via rustls). Each call is a session with
//! its own deadline: the deadline is sent to the server as
//! `connect-timeout-ms` and also enforced locally, so an unresponsive server
//! still yields `DeadlineExceeded`.
//!
//! ## Example
//!
//! ```no_run
//! # #[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
//! # struct Num { #[prost(int64, tag = "1")] #[serde(default)] value: i64 }
//! use calcrpc_client::RpcClient;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RpcClient::builder("http://localhost:50051")
//!     .http2_prior_knowledge()
//!     .build()?;
//!
//! // Bidi: the two halves are independent.
//! let (mut requests, mut responses) = client.bidi_stream::<Num, Num>("calc.Calc/Max")?;
//! tokio::spawn(async move {
//!     for value in [3, 1, 7] {
//!         if requests.send(&Num { value }).await.is_err() {
//!             break;
//!         }
//!     }
//! });
//! while let Some(max) = responses.message().await? {
//!     println!("max: {}", max.value);
//! }
//! # Ok(())
//! # }
//! ```

mod builder;
mod client;
mod error;
mod streaming;
pub mod transport;

pub use builder::ClientBuilder;
pub use client::{ClientStreamCall, DEFAULT_CHANNEL_CAPACITY, RpcClient};
pub use error::{ClientBuildError, ClientError};
pub use streaming::{RequestSender, Streaming};

pub use calcrpc_core::{Code, Status};
