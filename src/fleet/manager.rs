//! The set of running mock services and its reconciliation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use tokio::task::JoinSet;

use crate::config::{ConfigStore, FleetSettings, GlobalConfig};
use crate::fleet::{FleetError, ReconcileReport, StartupReport};
use crate::http::{RuntimeError, RuntimeState, ServiceRuntime};
use crate::observability::metrics;

/// Point-in-time view of one fleet member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub name: String,
    pub usecase: String,
    pub port: u16,
    pub state: RuntimeState,
    pub in_flight: u64,
}

/// The three views of the fleet, kept consistent under one lock.
#[derive(Default)]
struct FleetState {
    by_name: HashMap<String, Arc<ServiceRuntime>>,
    by_port: HashMap<u16, String>,
    runtimes: Vec<Arc<ServiceRuntime>>,
}

impl FleetState {
    fn detach(&mut self, name: &str) -> Option<Arc<ServiceRuntime>> {
        let runtime = self.by_name.remove(name)?;
        self.runtimes.retain(|r| !Arc::ptr_eq(r, &runtime));

        let port = runtime.port();
        if self.by_port.get(&port).is_some_and(|owner| owner == name) {
            self.by_port.remove(&port);
            // Hand the port back to an earlier claimant, if any.
            if let Some(other) = self.runtimes.iter().rev().find(|r| r.port() == port) {
                self.by_port.insert(port, other.name().to_string());
            }
        }
        Some(runtime)
    }
}

/// Owns every [`ServiceRuntime`] and swaps them as configuration changes.
pub struct FleetManager {
    store: ConfigStore,
    settings: FleetSettings,
    state: Mutex<FleetState>,
    /// Last global config that loaded and validated.
    global: ArcSwapOption<GlobalConfig>,
    /// Serializes reloads of the same service.
    gates: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    /// Set once shutdown begins; no runtime is started afterwards.
    closed: AtomicBool,
}

impl FleetManager {
    pub fn new(store: ConfigStore, settings: FleetSettings) -> Self {
        Self {
            store,
            settings,
            state: Mutex::new(FleetState::default()),
            global: ArcSwapOption::empty(),
            gates: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn settings(&self) -> &FleetSettings {
        &self.settings
    }

    fn state(&self) -> MutexGuard<'_, FleetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(&self.gates.entry(name.to_string()).or_default())
    }

    /// Refuse every later reload. Runtimes already registered keep serving
    /// until [`FleetManager::shutdown`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn publish_size(&self) {
        metrics::set_running_services(self.len());
    }

    /// The last successfully loaded global config.
    pub fn global(&self) -> Option<Arc<GlobalConfig>> {
        self.global.load_full()
    }

    /// Usecase the last loaded global config assigns to `service`.
    pub fn usecase_for(&self, service: &str) -> Option<String> {
        self.global()
            .and_then(|global| global.usecase_for(service).map(str::to_string))
    }

    pub fn runtime(&self, name: &str) -> Option<Arc<ServiceRuntime>> {
        self.state().by_name.get(name).cloned()
    }

    /// Service currently registered for `port`.
    pub fn port_owner(&self, port: u16) -> Option<String> {
        self.state().by_port.get(&port).cloned()
    }

    /// Names of fleet members in registration order.
    pub fn names(&self) -> Vec<String> {
        self.state()
            .runtimes
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state().runtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best-effort status view; may lag behind a swap in progress.
    pub fn status(&self) -> Vec<ServiceStatus> {
        let runtimes = self.state().runtimes.clone();
        runtimes
            .iter()
            .map(|r| ServiceStatus {
                name: r.name().to_string(),
                usecase: r.usecase().to_string(),
                port: r.port(),
                state: r.state(),
                in_flight: r.in_flight(),
            })
            .collect()
    }

    /// Register `runtime`, detaching any runtime already registered under
    /// its name. The detached runtime is returned still running; stopping it
    /// is the caller's job.
    pub fn add_or_replace(&self, runtime: Arc<ServiceRuntime>) -> Option<Arc<ServiceRuntime>> {
        let name = runtime.name().to_string();
        let port = runtime.port();

        let mut state = self.state();
        let previous = state.detach(&name);
        if previous.is_some() {
            tracing::debug!(service = %name, "Replacing existing runtime");
        }

        if let Some(owner) = state.by_port.get(&port).filter(|owner| **owner != name) {
            tracing::warn!(
                port,
                service = %name,
                current_owner = %owner,
                "Port already registered by another service; last registration wins"
            );
        }
        state.by_port.insert(port, name.clone());
        state.by_name.insert(name, Arc::clone(&runtime));
        state.runtimes.push(runtime);
        previous
    }

    /// Detach `name` from every view. The runtime is returned unstopped.
    pub fn remove(&self, name: &str) -> Option<Arc<ServiceRuntime>> {
        let removed = self.state().detach(name);
        self.publish_size();
        removed
    }

    /// Initial population: load every referenced service, skip the ones that
    /// fail, then start the rest.
    pub async fn populate(&self, global: GlobalConfig) -> StartupReport {
        let global = Arc::new(global);
        self.global.store(Some(Arc::clone(&global)));

        let mut report = StartupReport::default();
        let mut registered = Vec::new();
        for service in &global.services {
            tracing::info!(service = %service.name, usecase = %service.usecase, "Loading service");
            match self.store.load_service_spec(&service.name, &service.usecase) {
                Ok(spec) => {
                    let runtime = Arc::new(ServiceRuntime::new(spec, self.settings.bind_ip));
                    if let Some(previous) = self.add_or_replace(Arc::clone(&runtime)) {
                        if let Err(e) = previous.stop(self.settings.grace_period).await {
                            tracing::warn!(service = %service.name, error = %e, "Replaced runtime did not drain cleanly");
                        }
                    }
                    registered.push(runtime);
                }
                Err(e) => {
                    tracing::error!(service = %service.name, error = %e, "Skipping service");
                    report.skipped.push((service.name.clone(), e));
                }
            }
        }

        for runtime in registered {
            match runtime.start() {
                Ok(_) => report.started.push(runtime.name().to_string()),
                Err(e) => {
                    tracing::error!(service = %runtime.name(), port = runtime.port(), error = %e, "Failed to start service");
                    self.detach_if_current(&runtime);
                    report.failed.push((runtime.name().to_string(), e));
                }
            }
        }

        self.publish_size();
        report
    }

    /// Reload one service on `usecase`.
    ///
    /// Any load or validation error leaves the running service untouched.
    /// Once the new config is accepted the old runtime is stopped and a new
    /// one started; if that bind fails the service stays down.
    pub async fn reload_service(&self, name: &str, usecase: &str) -> Result<(), FleetError> {
        let gate = self.gate(name);
        let _reloading = gate.lock().await;
        self.reload_locked(name, usecase).await
    }

    /// Reload `name` on whatever usecase the global config assigns it at the
    /// moment the reload actually runs.
    ///
    /// With `changed_usecase` set, the reload only happens when that usecase
    /// is the active one. Returns the usecase reloaded, or `None` when there
    /// was nothing to do.
    pub async fn reload_active(
        &self,
        name: &str,
        changed_usecase: Option<&str>,
    ) -> Result<Option<String>, FleetError> {
        let gate = self.gate(name);
        let _reloading = gate.lock().await;

        let Some(active) = self.usecase_for(name) else {
            tracing::info!(service = name, "Service not referenced by global config, ignoring change");
            return Ok(None);
        };
        if let Some(changed) = changed_usecase.filter(|changed| *changed != active) {
            tracing::debug!(service = name, usecase = changed, active = %active, "Change to an inactive usecase, ignoring");
            return Ok(None);
        }

        self.reload_locked(name, &active).await?;
        Ok(Some(active))
    }

    /// Body of a service reload. The caller holds the service's gate.
    async fn reload_locked(&self, name: &str, usecase: &str) -> Result<(), FleetError> {
        if self.is_closed() {
            return Err(FleetError::Closed);
        }

        tracing::info!(service = name, usecase, "Reloading service");
        let spec = match self.store.load_service_spec(name, usecase) {
            Ok(spec) => spec,
            Err(e) => {
                tracing::warn!(service = name, usecase, error = %e, "Reload rejected, keeping current runtime");
                metrics::record_reload("service", false);
                return Err(e.into());
            }
        };

        let existing = self.runtime(name);
        if let Some(old) = &existing {
            if let Err(e) = old.stop(self.settings.grace_period).await {
                tracing::warn!(service = name, error = %e, "Old runtime did not drain cleanly");
            }
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        if self.is_closed() {
            if let Some(old) = &existing {
                self.detach_if_current(old);
            }
            self.publish_size();
            tracing::info!(service = name, "Shutdown in progress, replacement not started");
            return Err(FleetError::Closed);
        }

        let runtime = Arc::new(ServiceRuntime::new(spec, self.settings.bind_ip));
        match runtime.start() {
            Ok(_) => {
                self.add_or_replace(runtime);
                self.publish_size();
                metrics::record_reload("service", true);
                tracing::info!(service = name, usecase, "Service reloaded");
                Ok(())
            }
            Err(e) => {
                if let Some(old) = &existing {
                    self.detach_if_current(old);
                }
                self.publish_size();
                metrics::record_reload("service", false);
                tracing::error!(service = name, error = %e, "Replacement failed to start, service is down");
                Err(e.into())
            }
        }
    }

    /// Converge the fleet on the current global config.
    ///
    /// An unreadable or invalid global config leaves the fleet untouched.
    /// Services no longer listed are stopped first so their ports are free
    /// for the reloads that follow.
    pub async fn reload_global(&self) -> Result<ReconcileReport, FleetError> {
        if self.is_closed() {
            return Err(FleetError::Closed);
        }
        tracing::info!("Reloading global configuration");
        let global = match self.store.load_validated_global() {
            Ok(global) => Arc::new(global),
            Err(e) => {
                tracing::error!(error = %e, "Global reload rejected, keeping current fleet");
                metrics::record_reload("global", false);
                return Err(e.into());
            }
        };
        self.global.store(Some(Arc::clone(&global)));

        let desired: HashSet<&str> = global.services.iter().map(|s| s.name.as_str()).collect();
        let stale: Vec<String> = self
            .names()
            .into_iter()
            .filter(|name| !desired.contains(name.as_str()))
            .collect();

        let mut report = ReconcileReport::default();
        for name in stale {
            tracing::info!(service = %name, "Service removed from global config, stopping");
            if self.retire(&name).await {
                report.removed.push(name);
            }
        }

        for service in &global.services {
            match self.reload_service(&service.name, &service.usecase).await {
                Ok(()) => report.reloaded.push(service.name.clone()),
                Err(e) => report.failed.push((service.name.clone(), e)),
            }
        }

        metrics::record_reload("global", true);
        tracing::info!(
            reloaded = report.reloaded.len(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Global configuration reloaded"
        );
        Ok(report)
    }

    /// Stop every runtime concurrently, each bounded by `grace`.
    pub async fn shutdown(&self, grace: Duration) {
        self.close();
        let runtimes = {
            let mut state = self.state();
            state.by_name.clear();
            state.by_port.clear();
            std::mem::take(&mut state.runtimes)
        };
        self.publish_size();

        tracing::info!(services = runtimes.len(), "Shutting down all mock servers");
        let mut stopping = JoinSet::new();
        for runtime in runtimes {
            stopping.spawn(async move {
                let result = runtime.stop(grace).await;
                (runtime, result)
            });
        }
        while let Some(joined) = stopping.join_next().await {
            match joined {
                Ok((runtime, Err(e))) => tracing::warn!(service = %runtime.name(), error = %e, "Forced shutdown"),
                Ok((_, Ok(()))) => {}
                Err(e) => tracing::error!(error = %e, "Shutdown task failed"),
            }
        }
    }

    async fn retire(&self, name: &str) -> bool {
        let gate = self.gate(name);
        let _reloading = gate.lock().await;

        let Some(runtime) = self.remove(name) else {
            self.release_gate(name);
            return false;
        };
        match runtime.stop(self.settings.grace_period).await {
            Err(e @ RuntimeError::ShutdownTimeout { .. }) => {
                tracing::warn!(service = name, error = %e, "Removed service was force-closed");
            }
            Err(e) => tracing::warn!(service = name, error = %e, "Error stopping removed service"),
            Ok(()) => {}
        }

        self.release_gate(name);
        true
    }

    /// Drop the gate of a departed service unless another reload is already
    /// queued on it. Called with the gate held, hence the two references.
    fn release_gate(&self, name: &str) {
        self.gates.remove_if(name, |_, gate| Arc::strong_count(gate) <= 2);
    }

    /// Detach `runtime` only if it is still the registered one for its name.
    fn detach_if_current(&self, runtime: &Arc<ServiceRuntime>) {
        let mut state = self.state();
        let current = state
            .by_name
            .get(runtime.name())
            .is_some_and(|r| Arc::ptr_eq(r, runtime));
        if current {
            state.detach(runtime.name());
        }
    }
}
