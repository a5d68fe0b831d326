//! Dispatch of settled configuration changes to the fleet.
//!
//! Each reload runs in its own task so a slow drain of one service never
//! holds up events for another. The usecase to load is resolved by the fleet
//! once the reload holds the service's gate, never at dispatch time.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use crate::config::{ConfigChange, ConfigChangeEvent};
use crate::fleet::FleetManager;

/// What a change event turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadAction {
    Global,
    /// Reload on the active usecase; with `changed_usecase` set, only if it
    /// is the active one.
    Service {
        service: String,
        changed_usecase: Option<String>,
    },
    Ignore,
}

impl ReloadAction {
    /// Decide what to do about one settled change.
    pub fn plan(event: &ConfigChangeEvent) -> Self {
        if event.deleted {
            tracing::info!(path = %event.path.display(), "Config file deleted, ignoring");
            return ReloadAction::Ignore;
        }

        match &event.change {
            ConfigChange::Global => ReloadAction::Global,
            ConfigChange::Service { service } => ReloadAction::Service {
                service: service.clone(),
                changed_usecase: None,
            },
            ConfigChange::MockSet { service, usecase } => ReloadAction::Service {
                service: service.clone(),
                changed_usecase: Some(usecase.clone()),
            },
            ConfigChange::Unknown => {
                tracing::debug!(path = %event.path.display(), "Ignoring unrecognized config file");
                ReloadAction::Ignore
            }
        }
    }
}

/// Routes change events to fleet reloads.
pub struct HotReloader {
    fleet: Arc<FleetManager>,
    reloads: JoinSet<()>,
}

impl HotReloader {
    pub fn new(fleet: Arc<FleetManager>) -> Self {
        Self {
            fleet,
            reloads: JoinSet::new(),
        }
    }

    /// Reloads spawned and not yet reaped.
    pub fn pending(&self) -> usize {
        self.reloads.len()
    }

    /// Spawn the reload for one event.
    pub fn dispatch(&mut self, event: ConfigChangeEvent) {
        // Reap finished reloads so the set only holds live ones.
        while self.reloads.try_join_next().is_some() {}

        tracing::info!(
            path = %event.path.display(),
            kind = event.change.kind(),
            "Config change detected"
        );

        let fleet = Arc::clone(&self.fleet);
        match ReloadAction::plan(&event) {
            ReloadAction::Global => {
                self.reloads.spawn(async move {
                    // Failures are logged by the fleet.
                    let _ = fleet.reload_global().await;
                });
            }
            ReloadAction::Service {
                service,
                changed_usecase,
            } => {
                self.reloads.spawn(async move {
                    let _ = fleet.reload_active(&service, changed_usecase.as_deref()).await;
                });
            }
            ReloadAction::Ignore => {}
        }
    }

    /// Consume events until the channel closes or shutdown is signalled,
    /// then wait for the reloads already in progress.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<ConfigChangeEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }

        // Reloads bail out once the fleet is closed; the ones mid-drain finish
        // within the grace period.
        tracing::info!(pending = self.reloads.len(), "Hot reload monitor stopping");
        while let Some(joined) = self.reloads.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Reload task failed");
            }
        }
        tracing::info!("Hot reload monitor stopped");
    }
}
