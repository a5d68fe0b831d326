//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, body)
//!     → router.rs (ordered lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → delay.rs (latency for the matched response)
//!     → Return: matched response or NoMatch
//!
//! Router Compilation (per service load):
//!     MockEntry[] in file order
//!     → Compile matchers
//!     → Freeze as immutable MockRouter
//! ```
//!
//! # Design Decisions
//! - Routers compiled at load time, immutable at runtime
//! - Exact path matching only
//! - First match wins (file order)

pub mod delay;
pub mod matcher;
pub mod router;

pub use router::{MockMatch, MockRouter};
