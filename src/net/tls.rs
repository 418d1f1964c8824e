//! TLS termination with certificates chosen per handshake.
//!
//! The ClientHello is read before any certificate is committed to, so the SNI name can
//! be looked up (and, on first use, provisioned) asynchronously without blocking the
//! accept loop or other handshakes.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::Acceptor;
use rustls::ServerConfig;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::LazyConfigAcceptor;

use crate::certs::{CertificateCache, CertificateError};

/// Why a handshake was abandoned. The connection is dropped in every case.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("failed to read ClientHello: {0}")]
    ClientHello(io::Error),
    #[error("ClientHello carried no server name")]
    MissingServerName,
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error("handshake failed: {0}")]
    Handshake(io::Error),
    #[error("handshake timed out")]
    Timeout,
}

impl HandshakeError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            HandshakeError::ClientHello(_) => "client_hello",
            HandshakeError::MissingServerName => "no_sni",
            HandshakeError::Certificate(CertificateError::UnknownHost(_)) => "unknown_host",
            HandshakeError::Certificate(CertificateError::Issuance(_)) => "issuance",
            HandshakeError::Handshake(_) => "handshake",
            HandshakeError::Timeout => "timeout",
        }
    }
}

/// Build the rustls configuration for one certificate chain.
pub fn server_config(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<Arc<ServerConfig>, rustls::Error> {
    let mut config = ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(chain, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// Complete a server handshake on `stream`, returning the stream and the SNI name.
///
/// Reading the ClientHello and finishing the handshake are each bounded by
/// `handshake_timeout`; waiting for a certificate is bounded by the cache's issue timeout.
pub async fn accept(
    stream: TcpStream,
    certs: &CertificateCache,
    handshake_timeout: Duration,
) -> Result<(TlsStream<TcpStream>, String), HandshakeError> {
    let start = tokio::time::timeout(handshake_timeout, LazyConfigAcceptor::new(Acceptor::default(), stream))
        .await
        .map_err(|_| HandshakeError::Timeout)?
        .map_err(HandshakeError::ClientHello)?;

    let server_name = start
        .client_hello()
        .server_name()
        .map(str::to_owned)
        .ok_or(HandshakeError::MissingServerName)?;

    let cert = certs.get_certificate(&server_name).await?;

    let tls = tokio::time::timeout(handshake_timeout, start.into_stream(cert.server_config()))
        .await
        .map_err(|_| HandshakeError::Timeout)?
        .map_err(HandshakeError::Handshake)?;

    Ok((tls, server_name))
}
