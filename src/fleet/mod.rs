//! Fleet management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     GlobalConfig → populate() → ServiceRuntime per valid service → start
//!
//! Reload:
//!     change event → reload_service() / reload_global()
//!     → ConfigStore (load + validate)
//!     → stop old runtime → settle → build + start new → commit maps
//! ```
//!
//! # Design Decisions
//! - One mutex guards `name → runtime`, `port → name` and the runtime list
//! - Bind and drain I/O never run while that mutex is held
//! - A bad reload never takes down a previously good service
//! - Failures are scoped per service; one broken service never blocks others

pub mod manager;

use crate::config::LoadError;
use crate::http::RuntimeError;

pub use manager::{FleetManager, ServiceStatus};

/// Error type for fleet operations.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("fleet is shutting down")]
    Closed,
}

/// Outcome of a full reconciliation against the global config.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Services (re)started on their desired usecase.
    pub reloaded: Vec<String>,
    /// Services stopped because the global config no longer lists them.
    pub removed: Vec<String>,
    /// Services whose reload failed, with the reason.
    pub failed: Vec<(String, FleetError)>,
}

/// Outcome of the initial population.
#[derive(Debug, Default)]
pub struct StartupReport {
    pub started: Vec<String>,
    /// Services skipped because their config or mocks did not load.
    pub skipped: Vec<(String, LoadError)>,
    /// Services that loaded but could not bind.
    pub failed: Vec<(String, RuntimeError)>,
}
