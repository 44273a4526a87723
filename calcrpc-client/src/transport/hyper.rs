//! Hyper-based HTTP transport.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;
use tower_service::Service;

use super::body::TransportBody;
use super::connector::{build_https_connector, default_tls_config, tls_config_from_ca_file};
use crate::{ClientBuildError, ClientError};

type HyperClient = Client<HttpsConnector<HttpConnector>, TransportBody>;

/// HTTP transport using hyper_util's legacy client.
///
/// Pools connections and negotiates HTTP/2 via ALPN over TLS. For cleartext
/// streaming calls, enable [`http2_only`](HyperTransportBuilder::http2_only)
/// so that requests use HTTP/2 with prior knowledge (h2c).
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
    http2_only: bool,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("http2_only", &self.http2_only)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }

    /// Send an HTTP request and wait for the response head.
    ///
    /// Connection failures map to [`ClientError::Transport`] (`Unavailable`).
    pub async fn request(
        &self,
        request: http::Request<TransportBody>,
    ) -> Result<http::Response<Incoming>, ClientError> {
        self.client
            .request(request)
            .await
            .map_err(|e| ClientError::Transport(format!("request failed: {}", describe(&e))))
    }

    pub fn is_http2_only(&self) -> bool {
        self.http2_only
    }
}

/// Flatten an error and its sources into one line.
fn describe(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// Builder for [`HyperTransport`].
pub struct HyperTransportBuilder {
    tls_config: Option<ClientConfig>,
    ca_file: Option<PathBuf>,
    http2_only: bool,
    pool_idle_timeout: Option<Duration>,
    pool_max_idle_per_host: usize,
    h2_keep_alive_interval: Option<Duration>,
    h2_keep_alive_timeout: Option<Duration>,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransportBuilder {
    pub fn new() -> Self {
        Self {
            tls_config: None,
            ca_file: None,
            http2_only: false,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            h2_keep_alive_interval: None,
            h2_keep_alive_timeout: None,
        }
    }

    /// Use a custom TLS configuration. Takes precedence over [`ca_file`](Self::ca_file).
    pub fn tls_config(mut self, config: ClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Trust only the CA certificates in this PEM file.
    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    /// Use HTTP/2 only, with prior knowledge on cleartext connections.
    pub fn http2_only(mut self, enabled: bool) -> Self {
        self.http2_only = enabled;
        self
    }

    /// Set the connection pool idle timeout.
    ///
    /// Default: 90 seconds.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of idle connections per host.
    ///
    /// Default: 32.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Send HTTP/2 PING frames at this interval.
    pub fn h2_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.h2_keep_alive_interval = Some(interval);
        self
    }

    /// How long to wait for a PING response before closing the connection.
    pub fn h2_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.h2_keep_alive_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<HyperTransport, ClientBuildError> {
        let tls_config = match (self.tls_config, self.ca_file) {
            (Some(config), _) => config,
            (None, Some(path)) => tls_config_from_ca_file(path)?,
            (None, None) => default_tls_config()?,
        };
        let connector = build_https_connector(tls_config);

        let mut builder = Client::builder(TokioExecutor::new());
        builder.pool_timer(TokioTimer::new());
        if let Some(timeout) = self.pool_idle_timeout {
            builder.pool_idle_timeout(timeout);
        }
        builder.pool_max_idle_per_host(self.pool_max_idle_per_host);

        if self.http2_only {
            builder.http2_only(true);
        }
        if let Some(interval) = self.h2_keep_alive_interval {
            builder.timer(TokioTimer::new());
            builder.http2_keep_alive_interval(interval);
        }
        if let Some(timeout) = self.h2_keep_alive_timeout {
            builder.http2_keep_alive_timeout(timeout);
        }

        Ok(HyperTransport {
            client: builder.build(connector),
            http2_only: self.http2_only,
        })
    }
}

impl std::fmt::Debug for HyperTransportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransportBuilder")
            .field("tls_config", &self.tls_config.is_some())
            .field("ca_file", &self.ca_file)
            .field("http2_only", &self.http2_only)
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .field("h2_keep_alive_interval", &self.h2_keep_alive_interval)
            .field("h2_keep_alive_timeout", &self.h2_keep_alive_timeout)
            .finish()
    }
}

impl Service<http::Request<TransportBody>> for HyperTransport {
    type Response = http::Response<Incoming>;
    type Error = ClientError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // hyper_util legacy::Client is always ready
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<TransportBody>) -> Self::Future {
        let transport = self.clone();
        Box::pin(async move { transport.request(req).await })
    }
}
