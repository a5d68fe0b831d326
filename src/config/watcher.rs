//! Configuration tree watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use notify::event::{EventKind, ModifyKind};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::change::{classify, is_watched_file, ConfigChangeEvent};
use crate::config::debounce::Debouncer;

/// Default quiet period before a change is reported.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// A watcher that monitors a configuration tree for changes.
pub struct ChangeWatcher {
    root: PathBuf,
    debounce: Duration,
}

impl ChangeWatcher {
    pub fn new(root: &Path, debounce: Duration) -> Self {
        Self {
            root: root.to_path_buf(),
            debounce,
        }
    }

    /// Start watching the tree.
    ///
    /// Returns a handle that keeps the watch alive and a receiver of settled,
    /// classified changes. Must be called from within a Tokio runtime.
    pub fn run(
        self,
    ) -> Result<(WatchHandle, mpsc::UnboundedReceiver<ConfigChangeEvent>), notify::Error> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = raw_tx.send(res);
            },
            Config::default(),
        )?;

        // Recursive mode also picks up directories created after this call.
        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        let (debouncer, settled_rx) = Debouncer::new(self.debounce);
        let root = self.root.clone();
        let task = tokio::spawn(async move {
            while let Some(res) = raw_rx.recv().await {
                match res {
                    Ok(event) => handle_raw_event(&root, &debouncer, event),
                    Err(e) => tracing::error!(error = %e, "Config watch error"),
                }
            }
        });

        tracing::info!(
            root = %self.root.display(),
            debounce_ms = self.debounce.as_millis() as u64,
            "Config watcher started"
        );

        Ok((
            WatchHandle {
                watcher: Some(watcher),
                task,
            },
            settled_rx,
        ))
    }
}

fn handle_raw_event(root: &Path, debouncer: &Debouncer, event: Event) {
    let deleted = match event.kind {
        EventKind::Create(_) => false,
        EventKind::Modify(ModifyKind::Metadata(_)) => return,
        EventKind::Modify(_) => false,
        EventKind::Remove(_) => true,
        _ => return,
    };

    for path in event.paths {
        if !is_watched_file(&path) || path.is_dir() {
            continue;
        }
        // A rename away or a delete racing the notification both end up here.
        let deleted = deleted || !path.exists();
        let change = classify(root, &path);
        tracing::trace!(path = %path.display(), kind = change.kind(), deleted, "Raw config event");
        debouncer.submit(ConfigChangeEvent {
            path,
            change,
            deleted,
            timestamp: SystemTime::now(),
        });
    }
}

/// Keeps a running watch alive; dropping or stopping it ends the watch.
pub struct WatchHandle {
    watcher: Option<RecommendedWatcher>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Stop delivering events.
    pub fn stop(mut self) {
        self.shutdown();
        tracing::info!("Config watcher stopped");
    }

    fn shutdown(&mut self) {
        // Dropping the notify watcher closes the raw channel, which ends the task.
        self.watcher.take();
        self.task.abort();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
