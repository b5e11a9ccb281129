//! Graceful shutdown signalling and health state.
//!
//! Health state transitions are lock-free via `ArcSwap`; the shutdown
//! signal is a watch channel that the serve loop and background tasks
//! select on. In-flight request draining itself is axum's job -- this
//! controller only tracks what the probes should report.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

/// Server health state: Starting -> Ready -> Draining -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Initializing; not yet accepting requests.
    Starting,
    /// Fully operational.
    Ready,
    /// Shutdown signalled; in-flight requests draining.
    Draining,
    /// Fully stopped.
    Stopped,
}

impl HealthState {
    /// Lowercase wire form for health output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Coordinates shutdown across the serve loop and health probes.
#[derive(Debug)]
pub struct ShutdownController {
    signal: watch::Sender<bool>,
    state: ArcSwap<HealthState>,
}

impl ShutdownController {
    /// Creates a controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal,
            state: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    /// Marks the server ready to accept requests.
    pub fn set_ready(&self) {
        self.state.store(Arc::new(HealthState::Ready));
    }

    /// Signals shutdown and transitions to `Draining`.
    pub fn trigger(&self) {
        self.state.store(Arc::new(HealthState::Draining));
        // Receivers may already be gone during teardown.
        let _ = self.signal.send(true);
    }

    /// Marks draining complete.
    pub fn set_stopped(&self) {
        self.state.store(Arc::new(HealthState::Stopped));
    }

    /// Current health state.
    #[must_use]
    pub fn state(&self) -> HealthState {
        **self.state.load()
    }

    /// A receiver that resolves once shutdown is triggered.
    #[must_use]
    pub fn receiver(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
