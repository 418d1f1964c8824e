//! A provisioned certificate, ready to terminate TLS.

use std::io::BufReader;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rustls::pki_types::CertificateDer;
use rustls::ServerConfig;

use crate::certs::authority::{IssuanceError, IssuedCertificate};
use crate::net::tls::server_config;

/// Certificate for one hostname plus the rustls configuration that serves it.
///
/// Built once per issuance; every handshake for the hostname shares the same
/// `ServerConfig`.
#[derive(Debug)]
pub struct Certificate {
    hostname: String,
    chain: Vec<CertificateDer<'static>>,
    not_before: SystemTime,
    not_after: SystemTime,
    server_config: Arc<ServerConfig>,
}

impl Certificate {
    /// Parse authority output into a servable certificate.
    pub fn from_issued(hostname: &str, issued: &IssuedCertificate) -> Result<Self, IssuanceError> {
        let invalid = |reason: String| IssuanceError::Invalid {
            hostname: hostname.to_string(),
            reason,
        };

        let chain = rustls_pemfile::certs(&mut BufReader::new(issued.cert_chain_pem.as_bytes()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(e.to_string()))?;
        if chain.is_empty() {
            return Err(invalid("no certificate in chain".to_string()));
        }

        let key = rustls_pemfile::private_key(&mut BufReader::new(issued.private_key_pem.as_bytes()))
            .map_err(|e| invalid(e.to_string()))?
            .ok_or_else(|| invalid("no private key".to_string()))?;

        if issued.not_after <= issued.not_before {
            return Err(invalid("empty validity window".to_string()));
        }

        let server_config = server_config(chain.clone(), key).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            hostname: hostname.to_string(),
            chain,
            not_before: issued.not_before,
            not_after: issued.not_after,
            server_config,
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// DER chain, leaf first.
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    pub fn not_before(&self) -> SystemTime {
        self.not_before
    }

    pub fn not_after(&self) -> SystemTime {
        self.not_after
    }

    pub fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.server_config)
    }

    /// True once `not_after` has passed.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.not_after
    }

    /// True when less than `renew_before` of validity remains.
    pub fn needs_renewal(&self, now: SystemTime, renew_before: Duration) -> bool {
        match self.not_after.duration_since(now) {
            Ok(remaining) => remaining <= renew_before,
            Err(_) => true,
        }
    }
}
