//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber
//! - Pick the log level from `RUST_LOG` or the verbose flag

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directives.
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "mock_harbor=debug,tower_http=debug"
    } else {
        "mock_harbor=info,tower_http=warn"
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `verbose`.
pub fn init(verbose: bool) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives(verbose).into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
