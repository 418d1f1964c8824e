//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate switchboard entries with the same canonicalization used at lookup time
//! - Validate value ranges (timeouts > 0, ports valid, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashMap;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::routing::host::{canonicalize, is_valid_hostname};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("switchboard is empty")]
    EmptySwitchboard,
    #[error("invalid hostname {0:?}")]
    InvalidHostname(String),
    #[error("backend port for {0:?} must be in 1..=65535")]
    InvalidPort(String),
    #[error("{first:?} and {second:?} both canonicalize to {canonical:?}")]
    DuplicateHostname {
        first: String,
        second: String,
        canonical: String,
    },
    #[error("{field}: {value:?} is not a socket address")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("{field} must be at most {max}")]
    TooLarge { field: &'static str, max: u64 },
    #[error("tls.renew_before_days must be smaller than tls.validity_days")]
    RenewalWindow,
}

/// Upper bound for certificate lifetimes and renewal windows, in days.
pub const MAX_DAYS: u64 = 3650;
/// Upper bound for how long a failed issuance is remembered, in seconds.
pub const MAX_NEGATIVE_CACHE_SECS: u64 = 24 * 60 * 60;

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_switchboard(config, &mut errors);
    validate_addresses(config, &mut errors);

    let positive = [
        ("listener.max_connections", config.listener.max_connections as u64),
        ("tls.validity_days", config.tls.validity_days),
        ("tls.issue_timeout_secs", config.tls.issue_timeout_secs),
        ("tls.handshake_timeout_secs", config.tls.handshake_timeout_secs),
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    let bounded = [
        ("tls.validity_days", config.tls.validity_days, MAX_DAYS),
        ("tls.renew_before_days", config.tls.renew_before_days, MAX_DAYS),
        ("tls.negative_cache_secs", config.tls.negative_cache_secs, MAX_NEGATIVE_CACHE_SECS),
    ];
    for (field, value, max) in bounded {
        if value > max {
            errors.push(ValidationError::TooLarge { field, max });
        }
    }

    if config.tls.validity_days > 0 && config.tls.renew_before_days >= config.tls.validity_days {
        errors.push(ValidationError::RenewalWindow);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_switchboard(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    if config.switchboard.is_empty() {
        errors.push(ValidationError::EmptySwitchboard);
        return;
    }

    let mut seen: HashMap<String, &str> = HashMap::new();
    for (raw, port) in &config.switchboard {
        let canonical = canonicalize(raw);
        if !is_valid_hostname(&canonical) {
            errors.push(ValidationError::InvalidHostname(raw.clone()));
            continue;
        }
        if *port == 0 {
            errors.push(ValidationError::InvalidPort(raw.clone()));
        }
        if let Some(first) = seen.insert(canonical.clone(), raw) {
            errors.push(ValidationError::DuplicateHostname {
                first: first.to_string(),
                second: raw.clone(),
                canonical,
            });
        }
    }
}

fn validate_addresses(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    let mut addresses = vec![
        ("listener.http_address", &config.listener.http_address),
        ("listener.https_address", &config.listener.https_address),
    ];
    if config.observability.metrics_enabled {
        addresses.push(("observability.metrics_address", &config.observability.metrics_address));
    }

    for (field, value) in addresses {
        if value.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                field,
                value: value.clone(),
            });
        }
    }
}
