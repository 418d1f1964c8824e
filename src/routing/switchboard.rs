//! Hostname to backend port lookup.
//!
//! # Responsibilities
//! - Store the canonical hostname → backend port table
//! - Resolve inbound hostnames to a backend port or an explicit miss
//! - Publish replacement tables atomically on reload
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) host lookup via HashMap
//! - Reload swaps the whole table through `ArcSwap`; readers never see a partial map

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use thiserror::Error;

use crate::routing::host::{canonicalize, is_valid_hostname};

/// Error building a switchboard from configured entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchboardError {
    #[error("invalid hostname {0:?}")]
    InvalidHost(String),
    #[error("backend port for {0} must be in 1..=65535")]
    InvalidPort(String),
    #[error("{hostname} is configured more than once (after canonicalization)")]
    DuplicateHost { hostname: String },
}

/// A single routing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchboardEntry {
    /// Canonical hostname.
    pub hostname: String,
    /// Backend port on localhost.
    pub backend_port: u16,
}

/// Immutable routing table.
#[derive(Debug, Clone, Default)]
pub struct Switchboard {
    routes: HashMap<String, u16>,
}

impl Switchboard {
    /// Build a switchboard, canonicalizing every configured hostname.
    ///
    /// Fails on the first invalid hostname, zero port, or two names that canonicalize
    /// to the same key (e.g. `a.test` and `www.a.test`).
    pub fn from_entries<I, S>(entries: I) -> Result<Self, SwitchboardError>
    where
        I: IntoIterator<Item = (S, u16)>,
        S: AsRef<str>,
    {
        let mut routes = HashMap::new();

        for (raw, port) in entries {
            let hostname = canonicalize(raw.as_ref());
            if !is_valid_hostname(&hostname) {
                return Err(SwitchboardError::InvalidHost(raw.as_ref().to_string()));
            }
            if port == 0 {
                return Err(SwitchboardError::InvalidPort(hostname));
            }
            if routes.insert(hostname.clone(), port).is_some() {
                return Err(SwitchboardError::DuplicateHost { hostname });
            }
        }

        Ok(Self { routes })
    }

    /// Resolve an inbound hostname (Host header or SNI) to its backend port.
    pub fn resolve(&self, hostname: &str) -> Option<u16> {
        self.routes.get(&canonicalize(hostname)).copied()
    }

    /// Returns true if the already-canonical `hostname` has an entry.
    pub fn contains(&self, hostname: &str) -> bool {
        self.routes.contains_key(hostname)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// All entries, sorted by hostname.
    pub fn entries(&self) -> Vec<SwitchboardEntry> {
        let mut entries: Vec<_> = self
            .routes
            .iter()
            .map(|(hostname, port)| SwitchboardEntry {
                hostname: hostname.clone(),
                backend_port: *port,
            })
            .collect();
        entries.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        entries
    }
}

/// Process-wide handle to the current switchboard.
///
/// Cloning shares the same underlying slot; `replace` is visible to every clone.
#[derive(Debug, Clone)]
pub struct SharedSwitchboard {
    inner: Arc<ArcSwap<Switchboard>>,
}

impl SharedSwitchboard {
    pub fn new(switchboard: Switchboard) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(switchboard)),
        }
    }

    /// Snapshot of the current table. Cheap, lock-free.
    pub fn load(&self) -> Guard<Arc<Switchboard>> {
        self.inner.load()
    }

    /// Atomically publish a new table.
    pub fn replace(&self, switchboard: Switchboard) {
        let hosts = switchboard.len();
        self.inner.store(Arc::new(switchboard));
        tracing::info!(hosts, "Switchboard replaced");
    }
}
