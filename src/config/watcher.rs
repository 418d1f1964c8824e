//! Configuration file watcher for hot reload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;

/// Watches the configuration file and forwards every version that loads and validates.
///
/// The parent directory is watched rather than the file itself: editors that save by
/// writing a temporary file and renaming it over the original would otherwise detach
/// the watch after the first save.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching in notify's background thread.
    ///
    /// The returned watcher must be kept alive for events to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, update_tx } = self;
        let file_name: Option<OsString> = path.file_name().map(ToOwned::to_owned);
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let reload_path = path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = (event.kind.is_modify() || event.kind.is_create())
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name().map(ToOwned::to_owned) == file_name);
                    if !relevant {
                        return;
                    }

                    tracing::info!(path = ?reload_path, "Config file changed, reloading");
                    match load_config(&reload_path) {
                        Ok(config) => {
                            let _ = update_tx.send(config);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Rejected config change, keeping current switchboard");
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INITIAL: &str = "[switchboard]\n\"a.test\" = 9001\n";
    const UPDATED: &str = "[switchboard]\n\"a.test\" = 9001\n\"c.test\" = 9003\n";
    const INVALID: &str = "[switchboard]\n\"a.test\" = 0\n";

    /// Wait for a reload that contains `hostname`, skipping partial-write reloads.
    async fn next_with(updates: &mut mpsc::UnboundedReceiver<ProxyConfig>, hostname: &str) -> ProxyConfig {
        loop {
            let config = updates.recv().await.expect("watcher channel closed");
            if config.switchboard.contains_key(hostname) {
                return config;
            }
        }
    }

    #[tokio::test]
    async fn test_forwards_valid_reloads_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchboard.toml");
        std::fs::write(&path, INITIAL).unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let _handle = watcher.run().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::write(&path, UPDATED).unwrap();
        let config = tokio::time::timeout(Duration::from_secs(5), next_with(&mut updates, "c.test"))
            .await
            .expect("no reload after a valid change");
        assert_eq!(config.switchboard["c.test"], 9003);

        // Let trailing events from that write settle, then discard them.
        tokio::time::sleep(Duration::from_millis(500)).await;
        while updates.try_recv().is_ok() {}

        std::fs::write(&path, INVALID).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ignores_other_files_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchboard.toml");
        std::fs::write(&path, INITIAL).unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let _handle = watcher.run().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::write(dir.path().join("other.toml"), UPDATED).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(updates.try_recv().is_err());
    }
}
