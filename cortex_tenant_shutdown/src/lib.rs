//! Manage the proxy's drain-then-stop shutdown
//!
//! Shutdown happens in two phases, coordinated by a [`Lifecycle`]:
//!
//! 1. **Drain**: [`begin_drain`][Lifecycle::begin_drain] flips the draining flag, after which the
//!    liveness probe (`/alive`) reports the instance unavailable so that a load balancer can take
//!    it out of rotation. The proxy keeps serving for the configured grace interval.
//! 2. **Stop**: once the grace interval has passed the frontend [`CancellationToken`] is
//!    cancelled, and the HTTP server stops accepting connections while letting requests that are
//!    already in flight finish.
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wait for a `SIGTERM` or `SIGINT` to stop the process on UNIX systems
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate()).expect("failed to register signal handler");
    let mut int = signal(SignalKind::interrupt()).expect("failed to register signal handler");

    tokio::select! {
        _ = term.recv() => info!("Received SIGTERM"),
        _ = int.recv() => info!("Received SIGINT"),
    }
}

/// Wait for a `ctrl+c` to stop the process on Windows systems
#[cfg(windows)]
pub async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received SIGINT");
}

/// Process-wide drain state shared by the liveness probe and the shutdown sequence.
#[derive(Debug)]
pub struct Lifecycle {
    draining: AtomicBool,
    grace: Duration,
    frontend_shutdown: CancellationToken,
}

impl Lifecycle {
    /// Create a [`Lifecycle`] that waits `grace` between starting to drain and cancelling
    /// `frontend_shutdown`.
    pub fn new(grace: Duration, frontend_shutdown: CancellationToken) -> Self {
        Self {
            draining: AtomicBool::new(false),
            grace,
            frontend_shutdown,
        }
    }

    /// Create a [`Lifecycle`] with no grace interval and its own frontend token.
    pub fn new_testing() -> Self {
        Self::new(Duration::ZERO, CancellationToken::new())
    }

    /// Returns true once [`begin_drain`][Self::begin_drain] has been called.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// The token cancelled when the drain completes.
    pub fn frontend_shutdown(&self) -> &CancellationToken {
        &self.frontend_shutdown
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Start draining, wait out the grace interval and then signal the frontend to stop.
    ///
    /// Only the first call performs the drain. Later calls wait for that drain to finish.
    pub async fn begin_drain(&self) {
        if self.draining.swap(true, Ordering::AcqRel) {
            self.frontend_shutdown.cancelled().await;
            return;
        }

        warn!(grace = ?self.grace, "draining, liveness probe now reports unavailable");
        tokio::time::sleep(self.grace).await;

        info!("drain complete, stopping HTTP frontend");
        self.frontend_shutdown.cancel();
    }
}
