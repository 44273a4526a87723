//! Connector and TLS configuration for the HTTP transport.
//!
//! All TLS configs use the ring crypto provider. Server certificates are
//! verified against either the system roots or a CA bundle loaded from a
//! PEM file (for servers with a privately issued certificate).

use std::path::Path;
use std::sync::Arc;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::ClientConfig;
use rustls::pki_types::CertificateDer;
use rustls::pki_types::pem::PemObject;

use crate::ClientBuildError;

fn config_with_roots(roots: rustls::RootCertStore) -> Result<ClientConfig, ClientBuildError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    Ok(ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// TLS configuration trusting the platform's native root certificates.
pub fn default_tls_config() -> Result<ClientConfig, ClientBuildError> {
    let mut roots = rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    if !native.errors.is_empty() {
        // Some certificates may still have loaded.
        tracing::debug!("errors loading native certs: {:?}", native.errors);
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    tracing::debug!(added, ignored, "loaded native root certificates");
    config_with_roots(roots)
}

/// TLS configuration trusting only the CA certificates in a PEM file.
pub fn tls_config_from_ca_file(path: impl AsRef<Path>) -> Result<ClientConfig, ClientBuildError> {
    let path = path.as_ref();
    let ca_error = |reason: String| ClientBuildError::CaFile {
        path: path.to_path_buf(),
        reason,
    };

    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|e| ca_error(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ca_error(e.to_string()))?;
    if certs.is_empty() {
        return Err(ca_error("no certificates found".into()));
    }

    let mut roots = rustls::RootCertStore::empty();
    for cert in certs {
        roots.add(cert)?;
    }
    config_with_roots(roots)
}

/// Build a connector that speaks TLS for `https://` and plain TCP for `http://`.
///
/// ALPN offers `h2` and `http/1.1`.
pub fn build_https_connector(tls_config: ClientConfig) -> HttpsConnector<HttpConnector> {
    HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_all_versions()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_ca_file() {
        let err = tls_config_from_ca_file("/nonexistent/ca.crt").unwrap_err();
        assert!(matches!(err, ClientBuildError::CaFile { .. }));
    }

    #[test]
    fn test_empty_ca_file() {
        let path = std::env::temp_dir().join(format!("calcrpc-empty-ca-{}.crt", std::process::id()));
        std::fs::write(&path, "").unwrap();

        let err = tls_config_from_ca_file(&path).unwrap_err();
        assert!(matches!(err, ClientBuildError::CaFile { ref reason, .. } if reason.contains("no certificates")));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_default_config_has_no_alpn_until_connector() {
        let config = default_tls_config().unwrap();
        assert!(config.alpn_protocols.is_empty());
    }
}
