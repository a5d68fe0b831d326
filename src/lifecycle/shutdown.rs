//! Shutdown coordination.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::WatchHandle;
use crate::fleet::FleetManager;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Ordered teardown: refuse new reloads, stop the reload monitor and wait
    /// for its in-progress reloads, stop the watcher, then drain every
    /// service within `grace`.
    pub async fn drain(
        &self,
        watcher: Option<WatchHandle>,
        reloader: Option<JoinHandle<()>>,
        fleet: &Arc<FleetManager>,
        grace: Duration,
    ) {
        fleet.close();
        self.trigger();

        if let Some(reloader) = reloader {
            if let Err(e) = reloader.await {
                tracing::error!(error = %e, "Hot reload monitor failed");
            }
        }

        if let Some(watcher) = watcher {
            watcher.stop();
        }

        fleet.shutdown(grace).await;
        tracing::info!("All mock servers stopped");
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
