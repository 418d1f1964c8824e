//! Shutdown sequencing for both listeners.
//!
//! ```text
//! SIGINT/SIGTERM → trigger → accept loops stop, connections told to finish
//!                → drain: wait for tracked TLS connections, up to the deadline
//! ```

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::lifecycle::signals;
use crate::net::ConnectionTracker;

/// Broadcasts the stop request and bounds how long open connections may linger.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    drain_timeout: Duration,
}

impl Shutdown {
    pub fn new(drain_timeout: Duration) -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx, drain_timeout }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Trigger once the process receives SIGINT or SIGTERM.
    pub fn trigger_on_signal(&self) -> JoinHandle<()> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            signals::wait_for_signal().await;
            shutdown.trigger();
        })
    }

    /// Wait for every tracked connection to close, at most the drain timeout.
    ///
    /// Returns false if connections were still open at the deadline.
    pub async fn drain(&self, tracker: &ConnectionTracker) -> bool {
        let open = tracker.active_count();
        if open == 0 {
            return true;
        }

        tracing::info!(open, timeout = ?self.drain_timeout, "Draining connections");
        match tokio::time::timeout(self.drain_timeout, tracker.wait_for_shutdown()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    open = tracker.active_count(),
                    "Drain timeout elapsed, closing remaining connections"
                );
                false
            }
        }
    }
}
