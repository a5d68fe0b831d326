//! In-flight request tracking for bounded graceful shutdown.
//!
//! # Responsibilities
//! - Count requests currently being served by one listener
//! - Generate request sequence numbers for tracing
//! - Broadcast a force-close signal once the drain deadline passes

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::watch;

/// Tracks in-flight requests of one service listener.
#[derive(Debug, Clone)]
pub struct InFlightTracker {
    active: Arc<AtomicU64>,
    served: Arc<AtomicU64>,
    force_tx: Arc<watch::Sender<bool>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        let (force_tx, _) = watch::channel(false);
        Self {
            active: Arc::new(AtomicU64::new(0)),
            served: Arc::new(AtomicU64::new(0)),
            force_tx: Arc::new(force_tx),
        }
    }

    /// Record a new request. Returns a guard that decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            active: Arc::clone(&self.active),
            seq: self.served.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }

    /// Requests currently being served.
    pub fn in_flight(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Requests accepted since the listener started.
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    /// Abort every request still running.
    pub fn force_close(&self) {
        self.force_tx.send_replace(true);
    }

    pub fn is_force_closed(&self) -> bool {
        *self.force_tx.borrow()
    }

    fn force_signal(&self) -> watch::Receiver<bool> {
        self.force_tx.subscribe()
    }
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a request's lifetime.
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<AtomicU64>,
    seq: u64,
}

impl InFlightGuard {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(request_seq = self.seq, "Request finished");
    }
}

/// Middleware counting the request and racing it against force-close.
pub async fn track_in_flight(
    State(tracker): State<InFlightTracker>,
    request: Request,
    next: Next,
) -> Response {
    let _guard = tracker.track();
    if tracker.is_force_closed() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Service is shutting down").into_response();
    }

    tokio::select! {
        response = next.run(request) => response,
        _ = force_closed(tracker.force_signal()) => {
            tracing::debug!("Request force-closed during shutdown");
            let mut response = Response::new(Body::from("Service is shutting down"));
            *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
            response
        }
    }
}

/// Resolves once force-close is signalled; never resolves otherwise.
async fn force_closed(mut force: watch::Receiver<bool>) {
    loop {
        let closed = *force.borrow_and_update();
        if closed {
            return;
        }
        if force.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
