//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Service port
//!     → listener.rs (bind with address reuse)
//!     → HTTP layer accept loop
//!     → inflight.rs (per-request tracking, force-close on drain deadline)
//! ```
//!
//! # Design Decisions
//! - One listener per service, never shared
//! - Every request tracked so shutdown knows what is still running

pub mod inflight;
pub mod listener;

pub use inflight::{InFlightGuard, InFlightTracker};
pub use listener::BindError;
