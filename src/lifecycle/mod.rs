//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Check config dir → Load global → Populate fleet → Start listeners
//!
//! Hot reload (hot_reload.rs):
//!     Settled change → plan → spawn fleet reload
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → close fleet → wait for reloads → stop watcher → drain fleet
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: no reload may start once draining begins
//! - Shutdown has a deadline: stragglers are force-closed

pub mod hot_reload;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use hot_reload::{HotReloader, ReloadAction};
pub use shutdown::Shutdown;
pub use startup::{bootstrap, StartupError};
