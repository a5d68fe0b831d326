//! Per-path trailing-edge debounce.
//!
//! Every event re-arms its path's timer. A path fires once it has been quiet
//! for a full window, carrying the most recent event seen for it. Each armed
//! timer is its own task, so paths never wait on each other.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::config::change::ConfigChangeEvent;

struct Pending {
    generation: u64,
    event: ConfigChangeEvent,
}

/// Coalesces bursts of events per path.
#[derive(Clone)]
pub struct Debouncer {
    window: Duration,
    pending: Arc<DashMap<PathBuf, Pending>>,
    settled_tx: mpsc::UnboundedSender<ConfigChangeEvent>,
}

impl Debouncer {
    /// Create a debouncer and the receiver of settled events.
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<ConfigChangeEvent>) {
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        (
            Self {
                window,
                pending: Arc::new(DashMap::new()),
                settled_tx,
            },
            settled_rx,
        )
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of paths with an armed timer.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Record an event and (re-)arm its path's timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, event: ConfigChangeEvent) {
        let path = event.path.clone();
        let generation = {
            let mut entry = self.pending.entry(path.clone()).or_insert(Pending {
                generation: 0,
                event: event.clone(),
            });
            entry.generation += 1;
            entry.event = event;
            entry.generation
        };

        let pending = Arc::clone(&self.pending);
        let settled_tx = self.settled_tx.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            // Only the timer armed by the latest event may fire.
            let settled = pending.remove_if(&path, |_, p| p.generation == generation);
            if let Some((_, p)) = settled {
                tracing::debug!(path = %path.display(), kind = p.event.change.kind(), "Change settled");
                let _ = settled_tx.send(p.event);
            }
        });
    }
}
