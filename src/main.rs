//! mock-harbor: a fleet of HTTP mock servers driven by a config tree.
//!
//! # Architecture Overview
//!
//! ```text
//!   <config-dir>/                        ┌───────────────────────────────────┐
//!     config.yaml ──────┐                │            FLEET MANAGER          │
//!     <svc>/config.yaml ├─▶ ConfigStore ─┼─▶ ServiceRuntime (port A) ◀── HTTP│
//!     <svc>/usecases/…  │   + validate   │   ServiceRuntime (port B) ◀── HTTP│
//!                       │                │   ...                             │
//!                       ▼                └───────────────▲───────────────────┘
//!                 ChangeWatcher ──(debounced)──▶ HotReloader
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use mock_harbor::config::{ChangeWatcher, ConfigStore, FleetSettings};
use mock_harbor::lifecycle::{bootstrap, signals, HotReloader, Shutdown};
use mock_harbor::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "mock-harbor", version, about = "Config-driven HTTP mock server fleet")]
struct Args {
    /// Root of the configuration tree.
    #[arg(long, default_value = "configs")]
    config_dir: PathBuf,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Disable watching the configuration tree.
    #[arg(long)]
    no_hot_reload: bool,

    /// Quiet period before a file change triggers a reload.
    #[arg(long, default_value_t = 500)]
    debounce_ms: u64,

    /// How long draining listeners may take before being force-closed.
    #[arg(long, default_value_t = 5)]
    grace_secs: u64,

    /// Address every mock listener binds to.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    metrics_address: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mock-harbor starting");

    if let Some(addr) = args.metrics_address {
        metrics::init_metrics(addr);
    }

    let root = args
        .config_dir
        .canonicalize()
        .unwrap_or_else(|_| args.config_dir.clone());
    let settings = FleetSettings {
        bind_ip: args.bind,
        grace_period: Duration::from_secs(args.grace_secs),
        ..FleetSettings::default()
    };
    let grace = settings.grace_period;

    tracing::info!(
        config_dir = %root.display(),
        bind = %args.bind,
        hot_reload = !args.no_hot_reload,
        "Configuration loaded"
    );

    let (fleet, report) = bootstrap(ConfigStore::new(&root), settings).await?;
    tracing::info!(
        started = report.started.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Fleet started"
    );

    let shutdown = Shutdown::new();
    let (watcher, reloader) = if args.no_hot_reload {
        (None, None)
    } else {
        let (handle, events) =
            ChangeWatcher::new(&root, Duration::from_millis(args.debounce_ms)).run()?;
        let reloader = HotReloader::new(fleet.clone());
        let reloader = tokio::spawn(reloader.run(events, shutdown.subscribe()));
        tracing::info!(path = %root.display(), "Hot reload enabled");
        (Some(handle), Some(reloader))
    };

    signals::shutdown_signal().await;
    tracing::info!("Shutdown signal received, draining");

    shutdown.drain(watcher, reloader, &fleet, grace).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
