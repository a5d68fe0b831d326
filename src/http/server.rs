//! Per-service HTTP runtime.
//!
//! # Responsibilities
//! - Own one listener bound to one service port
//! - Serve the service's immutable mock router
//! - Wire up middleware (request ID, tracing, in-flight tracking)
//! - Stop with a bounded graceful drain, force-closing what is left
//!
//! # Lifecycle
//! ```text
//! Created ──start()──▶ Running ──stop()──▶ Stopping ──▶ Stopped
//!    └───────────────────stop()──────────────────────────▲
//! ```
//!
//! A runtime is never mutated under load: a new mock set means a new
//! runtime swapped in by the fleet.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware,
    response::Response,
    Router,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::ServiceSpec;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::http::response::{mock_response, no_match};
use crate::net::inflight::{track_in_flight, InFlightTracker};
use crate::net::listener::{self, BindError};
use crate::observability::metrics;
use crate::routing::MockRouter;

/// Largest request body read for matching.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// How long force-closed requests get to unwind after the drain deadline.
const FORCE_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Error type for runtime lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("service '{service}' cannot start from state {state}")]
    NotStartable { service: String, state: RuntimeState },

    #[error("service '{service}' did not drain within {timeout:?}, force-closed {in_flight} request(s)")]
    ShutdownTimeout {
        service: String,
        timeout: Duration,
        in_flight: u64,
    },
}

/// Observable lifecycle state of a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuntimeState::Created => "created",
            RuntimeState::Running => "running",
            RuntimeState::Stopping => "stopping",
            RuntimeState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

struct Running {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
    tracker: InFlightTracker,
}

enum Lifecycle {
    Created,
    Running(Running),
    Stopping,
    Stopped,
}

impl Lifecycle {
    fn state(&self) -> RuntimeState {
        match self {
            Lifecycle::Created => RuntimeState::Created,
            Lifecycle::Running(_) => RuntimeState::Running,
            Lifecycle::Stopping => RuntimeState::Stopping,
            Lifecycle::Stopped => RuntimeState::Stopped,
        }
    }
}

/// Shared state injected into the mock handler.
#[derive(Clone)]
struct MockState {
    service: Arc<str>,
    router: Arc<MockRouter>,
}

/// One live mock service: a router snapshot and the listener serving it.
pub struct ServiceRuntime {
    name: String,
    usecase: String,
    bind_addr: SocketAddr,
    router: Arc<MockRouter>,
    lifecycle: Mutex<Lifecycle>,
}

impl ServiceRuntime {
    /// Build a runtime from a validated spec. Nothing is bound yet.
    pub fn new(spec: ServiceSpec, bind_ip: IpAddr) -> Self {
        let router = Arc::new(MockRouter::new(&spec.mocks, spec.config.delay.clone()));
        Self {
            name: spec.name,
            usecase: spec.usecase,
            bind_addr: SocketAddr::new(bind_ip, spec.port),
            router,
            lifecycle: Mutex::new(Lifecycle::Created),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usecase(&self) -> &str {
        &self.usecase
    }

    pub fn port(&self) -> u16 {
        self.bind_addr.port()
    }

    pub fn router(&self) -> &Arc<MockRouter> {
        &self.router
    }

    pub fn state(&self) -> RuntimeState {
        self.lifecycle().state()
    }

    /// Address actually bound, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.lifecycle() {
            Lifecycle::Running(running) => Some(running.local_addr),
            _ => None,
        }
    }

    /// Requests currently being served.
    pub fn in_flight(&self) -> u64 {
        match &*self.lifecycle() {
            Lifecycle::Running(running) => running.tracker.in_flight(),
            _ => 0,
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build_router(&self, tracker: InFlightTracker) -> Router {
        let state = MockState {
            service: Arc::from(self.name.as_str()),
            router: Arc::clone(&self.router),
        };

        Router::new()
            .fallback(serve_mock)
            .with_state(state)
            .layer(middleware::from_fn_with_state(tracker, track_in_flight))
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer()),
            )
    }

    /// Bind the port and start serving.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<SocketAddr, RuntimeError> {
        let mut lifecycle = self.lifecycle();
        if !matches!(*lifecycle, Lifecycle::Created) {
            return Err(RuntimeError::NotStartable {
                service: self.name.clone(),
                state: lifecycle.state(),
            });
        }

        let listener = listener::bind(&self.name, self.bind_addr.ip(), self.bind_addr.port())?;
        let local_addr = listener.local_addr().unwrap_or(self.bind_addr);

        let tracker = InFlightTracker::new();
        let app = self.build_router(tracker.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let service = self.name.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = &result {
                tracing::error!(service = %service, error = %e, "Mock server failed");
            }
            result
        });

        *lifecycle = Lifecycle::Running(Running {
            local_addr,
            shutdown_tx,
            task,
            tracker,
        });

        tracing::info!(
            service = %self.name,
            usecase = %self.usecase,
            address = %local_addr,
            mocks = self.router.len(),
            "Mock server started"
        );
        Ok(local_addr)
    }

    /// Stop accepting, drain in-flight requests for up to `timeout`, then
    /// force-close the rest.
    ///
    /// Returns [`RuntimeError::ShutdownTimeout`] when the drain deadline was
    /// missed; the listener is closed either way.
    pub async fn stop(&self, timeout: Duration) -> Result<(), RuntimeError> {
        let running = {
            let mut lifecycle = self.lifecycle();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopping) {
                Lifecycle::Running(running) => running,
                Lifecycle::Created | Lifecycle::Stopped => {
                    *lifecycle = Lifecycle::Stopped;
                    return Ok(());
                }
                // Someone else is already stopping it.
                Lifecycle::Stopping => return Ok(()),
            }
        };

        tracing::info!(
            service = %self.name,
            in_flight = running.tracker.in_flight(),
            "Stopping mock server"
        );
        let started = Instant::now();
        let Running {
            shutdown_tx,
            mut task,
            tracker,
            ..
        } = running;
        let _ = shutdown_tx.send(());

        let result = match tokio::time::timeout(timeout, &mut task).await {
            Ok(_) => Ok(()),
            Err(_) => {
                let in_flight = tracker.in_flight();
                tracker.force_close();
                if tokio::time::timeout(FORCE_CLOSE_GRACE, &mut task).await.is_err() {
                    task.abort();
                    let _ = task.await;
                }
                Err(RuntimeError::ShutdownTimeout {
                    service: self.name.clone(),
                    timeout,
                    in_flight,
                })
            }
        };

        *self.lifecycle() = Lifecycle::Stopped;
        tracing::info!(
            service = %self.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            served = tracker.served(),
            "Mock server stopped"
        );
        result
    }
}

impl fmt::Debug for ServiceRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRuntime")
            .field("name", &self.name)
            .field("usecase", &self.usecase)
            .field("bind_addr", &self.bind_addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Fallback handler: match the request against the mock table.
async fn serve_mock(State(state): State<MockState>, request: Request) -> Response {
    let start_time = Instant::now();
    let request_id = request.request_id().to_string();
    let (parts, body) = request.into_parts();
    let method = parts.method.as_str();
    let path = parts.uri.path();

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(service = %state.service, error = %e, "Failed to read request body");
            Default::default()
        }
    };

    let Some(matched) = state.router.match_request(method, path, &body) else {
        tracing::info!(
            service = %state.service,
            request_id = %request_id,
            method,
            path,
            "No matching mock found"
        );
        metrics::record_request(&state.service, method, 404, start_time);
        return no_match();
    };

    tracing::debug!(
        service = %state.service,
        request_id = %request_id,
        method,
        path,
        mock_index = matched.index,
        delay_ms = matched.delay.as_millis() as u64,
        "Mock matched"
    );

    if !matched.delay.is_zero() {
        tokio::time::sleep(matched.delay).await;
    }

    let response = mock_response(matched.response);
    metrics::record_request(&state.service, method, response.status().as_u16(), start_time);
    response
}
