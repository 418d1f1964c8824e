//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (plaintext and TLS bind addresses).
    pub listener: ListenerConfig,

    /// On-demand certificate settings.
    pub tls: TlsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Hostname → backend port table.
    pub switchboard: BTreeMap<String, u16>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Plaintext bind address (challenges and redirects).
    pub http_address: String,

    /// TLS bind address (proxied traffic).
    pub https_address: String,

    /// Maximum concurrent TLS connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            http_address: "0.0.0.0:80".to_string(),
            https_address: "0.0.0.0:443".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Certificate provisioning configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Directory for the on-disk certificate store. Disabled when unset.
    pub cache_dir: Option<PathBuf>,

    /// Renew certificates this many days before they expire.
    pub renew_before_days: u64,

    /// Validity of certificates minted by the self-signed authority.
    pub validity_days: u64,

    /// How long a failed issuance is remembered before it is retried.
    pub negative_cache_secs: u64,

    /// Upper bound on a single issuance.
    pub issue_timeout_secs: u64,

    /// Upper bound on reading the ClientHello and finishing the handshake.
    pub handshake_timeout_secs: u64,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cache_dir: Some(PathBuf::from("certs")),
            renew_before_days: 30,
            validity_days: 90,
            negative_cache_secs: 60,
            issue_timeout_secs: 90,
            handshake_timeout_secs: 10,
        }
    }
}

const SECS_PER_DAY: u64 = 24 * 60 * 60;

impl TlsConfig {
    pub fn renew_before(&self) -> Duration {
        Duration::from_secs(self.renew_before_days.saturating_mul(SECS_PER_DAY))
    }

    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.validity_days.saturating_mul(SECS_PER_DAY))
    }

    pub fn negative_cache(&self) -> Duration {
        Duration::from_secs(self.negative_cache_secs)
    }

    pub fn issue_timeout(&self) -> Duration {
        Duration::from_secs(self.issue_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

/// Timeout configuration for backend calls and shutdown.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for the backend to produce response headers, in seconds.
    pub request_secs: u64,

    /// Grace period for open connections on shutdown, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            drain_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
