//! Settings for the binaries, read from environment variables.
//!
//! | variable | used by | default |
//! |---|---|---|
//! | `CALCRPC_ADDR` | server | `0.0.0.0:50051` |
//! | `CALCRPC_TLS_CERT`, `CALCRPC_TLS_KEY` | server | unset (cleartext) |
//! | `CALCRPC_SERVER_URL` | clients | `http://localhost:50051`, or `https://` when a CA is set |
//! | `CALCRPC_TLS_CA` | clients | unset (cleartext h2c) |

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

pub const ADDR_VAR: &str = "CALCRPC_ADDR";
pub const SERVER_URL_VAR: &str = "CALCRPC_SERVER_URL";
pub const TLS_CERT_VAR: &str = "CALCRPC_TLS_CERT";
pub const TLS_KEY_VAR: &str = "CALCRPC_TLS_KEY";
pub const TLS_CA_VAR: &str = "CALCRPC_TLS_CA";

pub const DEFAULT_ADDR: &str = "0.0.0.0:50051";

/// Certificate chain and private key of the server, PEM encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub tls: Option<TlsFiles>,
}

impl ServerSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let addr_value = lookup(ADDR_VAR).unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr = addr_value
            .parse()
            .with_context(|| format!("invalid {ADDR_VAR} {addr_value:?}"))?;

        let tls = match (lookup(TLS_CERT_VAR), lookup(TLS_KEY_VAR)) {
            (Some(cert), Some(key)) => Some(TlsFiles {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => bail!("{TLS_CERT_VAR} and {TLS_KEY_VAR} must be set together"),
        };

        Ok(Self { addr, tls })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub ca_file: Option<PathBuf>,
}

impl ClientSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let ca_file = lookup(TLS_CA_VAR).map(PathBuf::from);
        let server_url = lookup(SERVER_URL_VAR).unwrap_or_else(|| {
            let scheme = if ca_file.is_some() { "https" } else { "http" };
            format!("{scheme}://localhost:50051")
        });
        Self {
            server_url,
            ca_file,
        }
    }

    /// Client builder for these settings.
    ///
    /// Cleartext connections use HTTP/2 with prior knowledge so that every
    /// call pattern works.
    pub fn client_builder(&self) -> calcrpc_client::ClientBuilder {
        let builder = calcrpc_client::RpcClient::builder(&self.server_url);
        match &self.ca_file {
            Some(path) => builder.tls_ca_file(path),
            None => builder.http2_prior_knowledge(),
        }
    }
}
