//! Configuration-driven HTTP mock server library.

pub mod config;
pub mod fleet;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::{ConfigStore, FleetSettings, GlobalConfig};
pub use fleet::FleetManager;
pub use http::ServiceRuntime;
pub use lifecycle::Shutdown;
