//! Certificate authority capability.
//!
//! The cache only needs "issue a certificate for hostname H". Anything that can do that
//! (an ACME client answering HTTP-01 challenges through
//! [`ChallengeStore`](crate::certs::ChallengeStore), a self-signed minter, a test double)
//! implements [`CertificateAuthority`].

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use rcgen::{CertificateParams, DnType, KeyPair};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// Error returned when a certificate could not be provisioned.
///
/// Cloneable so that every handshake waiting on the same issuance receives it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssuanceError {
    #[error("certificate authority rejected {hostname}: {reason}")]
    Rejected { hostname: String, reason: String },
    #[error("issuance for {0} timed out")]
    Timeout(String),
    #[error("certificate issued for {hostname} is unusable: {reason}")]
    Invalid { hostname: String, reason: String },
    #[error("issuance for {0} was aborted")]
    Aborted(String),
}

/// Certificate material returned by an authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedCertificate {
    /// Leaf first, then intermediates (PEM).
    pub cert_chain_pem: String,
    /// Private key for the leaf (PEM, PKCS#8).
    pub private_key_pem: String,
    pub not_before: SystemTime,
    pub not_after: SystemTime,
}

/// Something that can obtain a certificate for a single hostname.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// `hostname` is canonical. The certificate must be valid for every name in
    /// [`certificate_names`], since clients may connect with either form.
    async fn issue(&self, hostname: &str) -> Result<IssuedCertificate, IssuanceError>;
}

/// Names a certificate for canonical `hostname` has to cover: the host and its `www.` alias.
pub fn certificate_names(hostname: &str) -> Vec<String> {
    vec![hostname.to_string(), format!("www.{hostname}")]
}

/// Mints self-signed certificates locally.
///
/// Browsers will not trust these; they let the proxy run end to end in development and
/// in tests without a reachable CA.
#[derive(Debug, Clone)]
pub struct SelfSignedAuthority {
    validity: Duration,
}

impl SelfSignedAuthority {
    pub fn new(validity: Duration) -> Self {
        Self { validity }
    }
}

#[async_trait]
impl CertificateAuthority for SelfSignedAuthority {
    async fn issue(&self, hostname: &str) -> Result<IssuedCertificate, IssuanceError> {
        let now = SystemTime::now();
        let not_before = now.checked_sub(Duration::from_secs(60)).unwrap_or(now);
        let not_after = now + self.validity;

        // Key generation is CPU bound.
        let host = hostname.to_string();
        tokio::task::spawn_blocking(move || mint(&host, not_before, not_after))
            .await
            .map_err(|e| IssuanceError::Rejected {
                hostname: hostname.to_string(),
                reason: e.to_string(),
            })?
    }
}

/// Generate a key pair and a self-signed certificate for `hostname`.
pub(crate) fn mint(
    hostname: &str,
    not_before: SystemTime,
    not_after: SystemTime,
) -> Result<IssuedCertificate, IssuanceError> {
    let rejected = |e: rcgen::Error| IssuanceError::Rejected {
        hostname: hostname.to_string(),
        reason: e.to_string(),
    };

    let mut params = CertificateParams::new(certificate_names(hostname)).map_err(rejected)?;
    params.distinguished_name.push(DnType::CommonName, hostname);
    params.not_before = OffsetDateTime::from(not_before);
    params.not_after = OffsetDateTime::from(not_after);

    let key_pair = KeyPair::generate().map_err(rejected)?;
    let cert = params.self_signed(&key_pair).map_err(rejected)?;

    Ok(IssuedCertificate {
        cert_chain_pem: cert.pem(),
        private_key_pem: key_pair.serialize_pem(),
        not_before,
        not_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_self_signed_issue() {
        let authority = SelfSignedAuthority::new(Duration::from_secs(3600));
        let issued = authority.issue("a.test").await.unwrap();

        assert!(issued.cert_chain_pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(issued.private_key_pem.contains("PRIVATE KEY"));
        assert!(issued.not_before < issued.not_after);

        let lifetime = issued.not_after.duration_since(SystemTime::now()).unwrap();
        assert!(lifetime <= Duration::from_secs(3600));
        assert!(lifetime > Duration::from_secs(3500));
    }

    #[test]
    fn test_minted_certificate_covers_www_alias() {
        let now = SystemTime::now();
        let issued = mint("a.test", now, now + Duration::from_secs(3600)).unwrap();

        let der = rustls_pemfile::certs(&mut issued.cert_chain_pem.as_bytes())
            .next()
            .unwrap()
            .unwrap();
        let contains = |name: &[u8]| der.windows(name.len()).any(|w| w == name);

        assert!(contains(b"a.test"));
        assert!(contains(b"www.a.test"));
    }

    #[test]
    fn test_certificate_names() {
        assert_eq!(certificate_names("a.test"), vec!["a.test", "www.a.test"]);
    }

    #[test]
    fn test_issuance_error_messages() {
        let err = IssuanceError::Timeout("a.test".into());
        assert_eq!(err.to_string(), "issuance for a.test timed out");
    }
}
