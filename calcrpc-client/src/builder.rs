//! Fluent configuration for [`RpcClient`].

use std::path::PathBuf;
use std::time::Duration;

use calcrpc_core::{Codec, MessageLimits};

use crate::client::{DEFAULT_CHANNEL_CAPACITY, RpcClient};
use crate::transport::HyperTransport;
use crate::ClientBuildError;

/// Builder for creating an [`RpcClient`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use calcrpc_client::RpcClient;
///
/// # fn run() -> Result<(), calcrpc_client::ClientBuildError> {
/// let client = RpcClient::builder("http://localhost:50051")
///     .use_proto()
///     .http2_prior_knowledge()
///     .timeout(Duration::from_secs(5))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: String,
    codec: Codec,
    timeout: Option<Duration>,
    http2_prior_knowledge: bool,
    tls_ca_file: Option<PathBuf>,
    channel_capacity: usize,
    limits: MessageLimits,
    transport: Option<HyperTransport>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base_url", &self.base_url)
            .field("codec", &self.codec.name())
            .field("timeout", &self.timeout)
            .field("http2_prior_knowledge", &self.http2_prior_knowledge)
            .field("tls_ca_file", &self.tls_ca_file)
            .field("channel_capacity", &self.channel_capacity)
            .field("limits", &self.limits)
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

impl ClientBuilder {
    /// Create a builder for the server at `base_url`, e.g. `http://localhost:50051`.
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            codec: Codec::Proto,
            timeout: None,
            http2_prior_knowledge: false,
            tls_ca_file: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            limits: MessageLimits::default(),
            transport: None,
        }
    }

    /// Use protobuf encoding. This is the default.
    pub fn use_proto(mut self) -> Self {
        self.codec = Codec::Proto;
        self
    }

    /// Use JSON encoding.
    pub fn use_json(mut self) -> Self {
        self.codec = Codec::Json;
        self
    }

    /// Deadline applied to every call, measured from the start of the call.
    ///
    /// It is enforced locally and sent to the server as `connect-timeout-ms`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Speak HTTP/2 without negotiation on cleartext connections (h2c).
    ///
    /// Needed for bidi streaming against a plain `http://` server.
    pub fn http2_prior_knowledge(mut self) -> Self {
        self.http2_prior_knowledge = true;
        self
    }

    /// Verify the server certificate against the CA certificates in this PEM file.
    pub fn tls_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls_ca_file = Some(path.into());
        self
    }

    /// Number of messages buffered in each direction of a call.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Reject response messages larger than `max` bytes.
    pub fn receive_max_bytes(mut self, max: usize) -> Self {
        self.limits = self.limits.receive_max_bytes(max);
        self
    }

    /// Refuse to send request messages larger than `max` bytes.
    pub fn send_max_bytes(mut self, max: usize) -> Self {
        self.limits = self.limits.send_max_bytes(max);
        self
    }

    /// Use a preconfigured transport. `http2_prior_knowledge` and
    /// `tls_ca_file` are ignored when one is given.
    pub fn with_transport(mut self, transport: HyperTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<RpcClient, ClientBuildError> {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        let uri: http::Uri = base_url.parse().map_err(|e: http::uri::InvalidUri| {
            ClientBuildError::InvalidUrl {
                url: self.base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            _ => {
                return Err(ClientBuildError::InvalidUrl {
                    url: self.base_url,
                    reason: "scheme must be http or https".into(),
                });
            }
        }
        if uri.host().is_none() {
            return Err(ClientBuildError::InvalidUrl {
                url: self.base_url,
                reason: "missing host".into(),
            });
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let mut builder =
                    HyperTransport::builder().http2_only(self.http2_prior_knowledge);
                if let Some(path) = self.tls_ca_file {
                    builder = builder.ca_file(path);
                }
                builder.build()?
            }
        };

        tracing::debug!(
            base_url = %base_url,
            codec = self.codec.name(),
            http2_only = transport.is_http2_only(),
            "client built"
        );

        Ok(RpcClient::from_parts(
            base_url,
            transport,
            self.codec,
            self.timeout,
            self.limits,
            self.channel_capacity,
        ))
    }
}
