//! Host-based TLS reverse proxy with on-demand certificates.

// Core subsystems
pub mod certs;
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use certs::CertificateCache;
pub use config::ProxyConfig;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
pub use routing::{SharedSwitchboard, Switchboard};
