//! # calcrpc
//!
//! Server runtime for calcrpc services on top of axum.
//!
//! Handlers are plain async functions in one of four shapes (unary,
//! server-streaming, client-streaming, bidi-streaming). They are registered
//! with a [`Dispatcher`], which runs every call as its own session: the
//! handler executes in an isolated task, request and response messages flow
//! through bounded channels, and the deadline interrupts any blocked send or
//! receive.
//!
//! ```rust,no_run
//! use calcrpc::prelude::*;
//! # #[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
//! # struct Ping { #[prost(string, tag = "1")] #[serde(default)] text: String }
//!
//! # async fn run() -> Result<(), calcrpc::ServeError> {
//! let dispatcher = Dispatcher::builder()
//!     .route("/ping.PingService/Ping", unary(|_ctx, req: Ping| async move { Ok(req) }))
//!     .build();
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:50051").await?;
//! calcrpc::serve(listener, calcrpc::router(dispatcher), std::future::pending()).await
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod handler;
pub mod serve;
pub mod server;

pub use config::ServerConfig;
pub use dispatcher::{ActiveCall, Dispatcher, DispatcherBuilder};
pub use handler::{
    CallContext, Method, ResponseSender, Streaming, bidi_stream, client_stream, server_stream,
    unary,
};
pub use serve::{ServeError, load_server_tls, serve, serve_tls};
pub use server::router;

// Re-export crates used by service code
pub use calcrpc_core;
pub use futures;
pub use prost;
pub use serde;

pub mod prelude {
    //! The types most service code needs.
    pub use crate::dispatcher::Dispatcher;
    pub use crate::handler::{
        CallContext, ResponseSender, Streaming, bidi_stream, client_stream, server_stream, unary,
    };
    pub use calcrpc_core::{Code, RpcError, Status};
}
