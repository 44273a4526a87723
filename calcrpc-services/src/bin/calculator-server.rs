//! Serves the calculator and greet services.
//!
//! Run with: cargo run --bin calculator-server
//!
//! Set `CALCRPC_TLS_CERT` and `CALCRPC_TLS_KEY` to serve over TLS, and
//! `CALCRPC_ADDR` to change the bind address (default `0.0.0.0:50051`).

use anyhow::Context;
use calcrpc::ServerConfig;
use calcrpc_services::GreetConfig;
use calcrpc_services::config::ServerSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    calcrpc_services::init_tracing();

    let settings = ServerSettings::from_env()?;
    let dispatcher = calcrpc_services::dispatcher(ServerConfig::default(), GreetConfig::default());
    for procedure in dispatcher.procedures() {
        tracing::info!(procedure, "registered");
    }
    let router = calcrpc::router(dispatcher);

    let listener = tokio::net::TcpListener::bind(settings.addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.addr))?;

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down");
    };

    match settings.tls {
        Some(files) => {
            let tls = calcrpc::load_server_tls(&files.cert, &files.key)?;
            calcrpc::serve_tls(listener, router, tls, shutdown).await?;
        }
        None => calcrpc::serve(listener, router, shutdown).await?,
    }
    Ok(())
}
