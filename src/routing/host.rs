//! Hostname canonicalization.
//!
//! # Responsibilities
//! - Reduce any inbound Host header or SNI name to the key used by the switchboard
//! - Validate hostnames accepted into the switchboard
//!
//! # Design Decisions
//! - Host matching is case-insensitive (per HTTP spec)
//! - `www.` prefixes are stripped so `www.example.com` and `example.com` share an entry
//! - The same function is used when building keys and when resolving requests

const WWW_PREFIX: &str = "www.";

/// Canonicalize a hostname.
///
/// Trims whitespace, drops a `:port` suffix and a trailing root dot, lowercases, and
/// strips every leading `www.` label. The result is stable under repeated application.
pub fn canonicalize(raw: &str) -> String {
    let host = strip_port(raw.trim());
    let host = host.strip_suffix('.').unwrap_or(host);
    let mut host = host.to_ascii_lowercase();

    while host.starts_with(WWW_PREFIX) {
        host.drain(..WWW_PREFIX.len());
    }

    host
}

/// Drop a trailing `:port` from a Host header value.
///
/// Bracketed IPv6 literals keep their brackets; a bare IPv6 literal is returned as is.
pub fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &host[..end + 2],
            None => host,
        };
    }

    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

/// Returns true if `host` is a canonical DNS name usable as a switchboard key.
///
/// Labels are 1..=63 ASCII alphanumerics or hyphens, not starting or ending with a
/// hyphen; the whole name is at most 253 bytes.
pub fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }

    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    })
}
