//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Bind both listeners before serving any traffic
//! - Apply hot-reloaded switchboards
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Logging is initialized by the caller, before this runs

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::certs::{CachePolicy, CertificateCache, ChallengeStore, DiskStore, SelfSignedAuthority};
use crate::config::{ConfigWatcher, ProxyConfig};
use crate::http::ProxyServer;
use crate::lifecycle::Shutdown;
use crate::net::ListenerError;
use crate::observability::metrics;
use crate::routing::{SharedSwitchboard, Switchboard, SwitchboardError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid switchboard: {0}")]
    Switchboard(#[from] SwitchboardError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("failed to watch configuration: {0}")]
    Watch(#[from] notify::Error),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where the configuration came from, and whether to follow changes to it.
#[derive(Debug, Clone)]
pub struct ReloadOptions {
    pub config_path: PathBuf,
    pub watch: bool,
}

/// Build the switchboard for a configuration.
pub fn build_switchboard(config: &ProxyConfig) -> Result<Switchboard, SwitchboardError> {
    Switchboard::from_entries(config.switchboard.iter().map(|(host, port)| (host.as_str(), *port)))
}

/// Run the proxy until SIGINT or SIGTERM.
pub async fn run(config: ProxyConfig, reload: ReloadOptions) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let switchboard = SharedSwitchboard::new(build_switchboard(&config)?);
    for entry in switchboard.load().entries() {
        tracing::info!(hostname = %entry.hostname, backend_port = entry.backend_port, "Route registered");
    }

    let store = config.tls.cache_dir.clone().map(DiskStore::new);
    if let Some(store) = &store {
        tracing::info!(dir = ?store.dir(), "Certificate store enabled");
    }
    let certs = CertificateCache::new(
        Arc::new(SelfSignedAuthority::new(config.tls.validity())),
        switchboard.clone(),
        CachePolicy::from_config(&config.tls),
        store,
    );

    let server = ProxyServer::bind(&config, switchboard.clone(), certs.clone(), ChallengeStore::new()).await?;

    // Dropping the watcher stops notifications, so it lives until shutdown.
    let _watcher = if reload.watch {
        Some(watch_config(&reload.config_path, switchboard, certs)?)
    } else {
        None
    };

    let shutdown = Shutdown::new(Duration::from_secs(config.timeouts.drain_secs));
    shutdown.trigger_on_signal();

    server.run(&shutdown).await?;
    Ok(())
}

fn watch_config(
    path: &Path,
    switchboard: SharedSwitchboard,
    certs: CertificateCache,
) -> Result<notify::RecommendedWatcher, notify::Error> {
    let (watcher, mut updates) = ConfigWatcher::new(path);
    let handle = watcher.run()?;
    tracing::info!(path = ?path, "Watching configuration for changes");

    tokio::spawn(async move {
        while let Some(config) = updates.recv().await {
            apply_reload(&config, &switchboard, &certs);
        }
    });

    Ok(handle)
}

/// Publish the new switchboard, then forget certificates for hosts that left it.
///
/// A config that loads but cannot form a switchboard leaves the current one serving.
pub fn apply_reload(config: &ProxyConfig, switchboard: &SharedSwitchboard, certs: &CertificateCache) {
    match build_switchboard(config) {
        Ok(next) => {
            switchboard.replace(next);
            certs.retain_routed(&switchboard.load());
        }
        Err(e) => tracing::warn!(error = %e, "Reloaded switchboard rejected, keeping current"),
    }
}
