//! HTTP transport layer for the client.
//!
//! [`HyperTransport`] wraps hyper_util's legacy client:
//!
//! - HTTP/1.1 and HTTP/2, negotiated via ALPN over TLS
//! - HTTP/2 with prior knowledge (h2c) for cleartext streaming
//! - TLS with rustls (ring provider), trusting system roots or a CA file
//! - Connection pooling

mod body;
mod connector;
mod hyper;

pub use body::TransportBody;
pub use connector::{build_https_connector, default_tls_config, tls_config_from_ca_file};
pub use hyper::{HyperTransport, HyperTransportBuilder};

// Re-export rustls types that users might need for TLS configuration
pub use rustls::ClientConfig as TlsClientConfig;
