//! Greeting and calculator services on calcrpc.
//!
//! Each service module holds its handlers, a `register` function adding its
//! procedures to a [`DispatcherBuilder`](calcrpc::DispatcherBuilder), and a
//! typed client.

pub mod calculator;
pub mod config;
pub mod greet;
pub mod proto;

use calcrpc::{Dispatcher, ServerConfig};

pub use calculator::CalculatorClient;
pub use greet::{GreetClient, GreetConfig};

/// Dispatcher serving both services.
pub fn dispatcher(server: ServerConfig, greet: GreetConfig) -> Dispatcher {
    let builder = Dispatcher::builder().config(server);
    let builder = calculator::register(builder);
    greet::register(builder, greet).build()
}

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
