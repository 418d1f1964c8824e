//! On-demand certificate subsystem.
//!
//! # Data Flow
//! ```text
//! TLS ClientHello (SNI)
//!     → cache.rs (canonicalize, switchboard check, single-flight lookup)
//!     → store.rs (cold-start hint from disk)
//!     → authority.rs (issue when nothing usable is cached)
//!     → certificate.rs (parse PEM, build rustls ServerConfig)
//!     → Handshake continues with the hostname's config
//! ```
//!
//! HTTP-01 tokens published by an authority are served from [`ChallengeStore`] on the
//! plaintext listener.

pub mod authority;
pub mod cache;
pub mod certificate;
pub mod challenge;
pub mod store;

pub use authority::{certificate_names, CertificateAuthority, IssuanceError, IssuedCertificate, SelfSignedAuthority};
pub use cache::{CachePolicy, CertStatus, CertificateCache, CertificateError};
pub use certificate::Certificate;
pub use challenge::ChallengeStore;
pub use store::DiskStore;
