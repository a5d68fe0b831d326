//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config tree (YAML + JSON)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceSpec (validated, immutable)
//!     → handed to the fleet to build a runtime
//!
//! On change:
//!     watcher.rs receives raw filesystem events
//!     → change.rs (filter & classify)
//!     → debounce.rs (coalesce bursts per path)
//!     → ConfigChangeEvent to the hot reloader
//! ```
//!
//! # Design Decisions
//! - Loaded config is immutable; changes rebuild the affected service
//! - All fields have defaults so minimal files parse
//! - Validation separates syntactic (serde) from semantic checks

pub mod change;
pub mod debounce;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use change::{ConfigChange, ConfigChangeEvent};
pub use loader::{ConfigError, ConfigStore, LoadError};
pub use schema::{
    DelayConfig, FleetSettings, GlobalConfig, MockEntry, RequestSpec, ResponseSpec, ServiceConfig,
    ServiceReference, ServiceSpec,
};
pub use validation::{ValidationIssue, ValidationReport};
pub use watcher::{ChangeWatcher, WatchHandle};
