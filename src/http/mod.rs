//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection on a service port
//!     → server.rs (Axum setup, per-service runtime)
//!     → request.rs (request ID)
//!     → [mock router decides the response]
//!     → response.rs (headers, status, JSON body)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{RuntimeError, RuntimeState, ServiceRuntime};
