//! Startup orchestration.
//!
//! # Responsibilities
//! - Check the configuration directory exists
//! - Load and validate the global config (fatal on failure)
//! - Populate the fleet, skipping services that fail to load
//!
//! # Design Decisions
//! - Global config errors are fatal: there is nothing to run
//! - Service errors are not: the process aborts only when nothing runs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{ConfigStore, FleetSettings, LoadError};
use crate::fleet::{FleetManager, StartupReport};

/// Error type for process startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration directory '{}' does not exist", .0.display())]
    MissingRoot(PathBuf),

    #[error("'{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error(transparent)]
    Global(#[from] LoadError),

    #[error("no valid mock servers configured, check your configuration")]
    NoServices,
}

/// Ensure `root` is an existing directory.
pub fn check_config_dir(root: &Path) -> Result<(), StartupError> {
    if !root.exists() {
        return Err(StartupError::MissingRoot(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(StartupError::NotADirectory(root.to_path_buf()));
    }
    Ok(())
}

/// Build and start the initial fleet.
///
/// Must be called from within a Tokio runtime.
pub async fn bootstrap(
    store: ConfigStore,
    settings: FleetSettings,
) -> Result<(Arc<FleetManager>, StartupReport), StartupError> {
    check_config_dir(store.root())?;

    tracing::info!(path = %store.global_path().display(), "Loading global configuration");
    let global = store.load_validated_global()?;

    let fleet = Arc::new(FleetManager::new(store, settings));
    let report = fleet.populate(global).await;
    if report.started.is_empty() {
        return Err(StartupError::NoServices);
    }

    for status in fleet.status() {
        tracing::info!(service = %status.name, usecase = %status.usecase, port = status.port, "Serving");
    }
    Ok((fleet, report))
}
