//! Serving a router over TCP, in cleartext or with TLS.
//!
//! Cleartext serving accepts HTTP/1.1 and HTTP/2 with prior knowledge (h2c)
//! on the same port. TLS serving negotiates `h2` or `http/1.1` via ALPN.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// Pause before accepting again after a listener-level error such as `EMFILE`.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Errors that stop a server.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load {path}: {source}")]
    Pem {
        path: PathBuf,
        #[source]
        source: rustls::pki_types::pem::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] rustls::Error),
}

/// Serve `router` in cleartext until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "serving HTTP/1.1 and h2c");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!(%addr, "server stopped");
    Ok(())
}

/// Serve `router` over TLS until `shutdown` resolves.
///
/// In-flight connections are drained before this returns.
pub async fn serve_tls<F>(
    listener: TcpListener,
    router: Router,
    tls: Arc<rustls::ServerConfig>,
    shutdown: F,
) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "serving over TLS");

    let acceptor = TlsAcceptor::from(tls);
    let builder = auto::Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    let mut shutdown = std::pin::pin!(shutdown);

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = &mut shutdown => break,
        };
        let (stream, peer) = match accepted {
            Ok(conn) => conn,
            Err(err) => {
                let delay = accept_backoff(&err);
                tracing::warn!(error = %err, ?delay, "accept failed");
                if !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = &mut shutdown => break,
                    }
                }
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let builder = builder.clone();
        let service = TowerToHyperService::new(router.clone());
        let watcher = graceful.watcher();

        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::debug!(%peer, error = %err, "TLS handshake failed");
                    return;
                }
            };
            let conn = builder.serve_connection(TokioIo::new(stream), service);
            if let Err(err) = watcher.watch(conn).await {
                tracing::debug!(%peer, error = %err, "connection closed with error");
            }
        });
    }

    graceful.shutdown().await;
    tracing::info!(%addr, "server stopped");
    Ok(())
}

// Errors tied to a single incoming connection are retried at once; anything
// else (descriptor exhaustion, out of memory) would fail again immediately.
fn accept_backoff(err: &std::io::Error) -> Duration {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::ConnectionAborted
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionRefused
        | ErrorKind::Interrupted => Duration::ZERO,
        _ => ACCEPT_BACKOFF,
    }
}

/// Build a TLS server configuration from PEM certificate chain and key files.
///
/// ALPN advertises `h2` first, then `http/1.1`.
pub fn load_server_tls(
    cert_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
) -> Result<Arc<rustls::ServerConfig>, ServeError> {
    let cert_path = cert_path.as_ref();
    let key_path = key_path.as_ref();
    let pem_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ServeError::Pem { path, source }
    };

    let certs = CertificateDer::pem_file_iter(cert_path)
        .map_err(pem_error(cert_path))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(pem_error(cert_path))?;
    if certs.is_empty() {
        return Err(ServeError::NoCertificates(cert_path.to_path_buf()));
    }
    let key = PrivateKeyDer::from_pem_file(key_path).map_err(pem_error(key_path))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_backoff() {
        use std::io::{Error, ErrorKind};

        assert_eq!(
            accept_backoff(&Error::from(ErrorKind::ConnectionAborted)),
            Duration::ZERO
        );
        // EMFILE
        assert_eq!(accept_backoff(&Error::from_raw_os_error(24)), ACCEPT_BACKOFF);
        assert_eq!(accept_backoff(&Error::from(ErrorKind::OutOfMemory)), ACCEPT_BACKOFF);
    }

    #[test]
    fn test_missing_cert_file() {
        let err = load_server_tls("/nonexistent/server.crt", "/nonexistent/server.pem").unwrap_err();
        assert!(matches!(err, ServeError::Pem { ref path, .. } if path.ends_with("server.crt")));
    }

    #[test]
    fn test_empty_cert_file() {
        let dir = std::env::temp_dir().join(format!("calcrpc-serve-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let cert = dir.join("empty.crt");
        std::fs::write(&cert, "").unwrap();

        let err = load_server_tls(&cert, dir.join("missing.pem")).unwrap_err();
        assert!(matches!(err, ServeError::NoCertificates(_)));

        std::fs::remove_dir_all(&dir).ok();
    }
}
