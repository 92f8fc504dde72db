//! Graceful shutdown controller with open-stream tracking.
//!
//! Uses `ArcSwap` for lock-free health state transitions and an atomic
//! counter with RAII guards so drain can wait for attached event-stream
//! consumers to receive their terminal event before the listener closes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

/// Server health state, transitioned by the shutdown controller.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Server is initializing (not yet accepting requests).
    Starting,
    /// Server is fully operational and accepting requests.
    Ready,
    /// Server is draining: calls are being cancelled and open streams are
    /// flushing their terminal events. No new calls are admitted.
    Draining,
    /// Server has fully stopped (every open stream has closed).
    Stopped,
}

/// Coordinates graceful shutdown across the server.
///
/// The drain sequence layers three waits:
/// 1. `trigger_shutdown()` moves to `Draining` and signals the listener
/// 2. the caller cancels all live calls and waits for their units to exit
/// 3. `wait_for_drain()` blocks until attached stream consumers have
///    received the resulting terminal events and disconnected
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    open_streams: Arc<AtomicU64>,
    health_state: Arc<ArcSwap<HealthState>>,
}

impl ShutdownController {
    /// Creates a new shutdown controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shutdown_signal: tx,
            open_streams: Arc::new(AtomicU64::new(0)),
            health_state: Arc::new(ArcSwap::from_pointee(HealthState::Starting)),
        }
    }

    /// Transitions to the `Ready` state, indicating the server can accept requests.
    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    /// Returns a receiver that will be notified when shutdown is triggered.
    ///
    /// The accept loop selects on this receiver to stop taking new
    /// connections while existing ones finish.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_signal.subscribe()
    }

    /// Initiates graceful shutdown.
    ///
    /// Transitions to `Draining` state and signals all shutdown receivers.
    /// Readiness probes start failing from this point.
    pub fn trigger_shutdown(&self) {
        self.health_state.store(Arc::new(HealthState::Draining));
        // Ignore send errors -- receivers may have been dropped
        let _ = self.shutdown_signal.send(true);
    }

    /// Returns the current health state.
    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// Returns a shared handle to the health state for use by handlers.
    #[must_use]
    pub fn health_state_handle(&self) -> Arc<ArcSwap<HealthState>> {
        Arc::clone(&self.health_state)
    }

    /// Creates an RAII guard that tracks one attached event stream.
    ///
    /// The open-stream counter is incremented on creation and decremented
    /// when the guard is dropped, even if the consumer disconnects abruptly.
    #[must_use]
    pub fn stream_guard(&self) -> StreamGuard {
        self.open_streams.fetch_add(1, Ordering::Relaxed);
        StreamGuard {
            open_streams: Arc::clone(&self.open_streams),
        }
    }

    /// Returns the number of currently attached event streams.
    #[must_use]
    pub fn open_stream_count(&self) -> u64 {
        self.open_streams.load(Ordering::Relaxed)
    }

    /// Waits for every attached stream to close, up to the given timeout.
    ///
    /// Returns `true` if all streams drained (transitions to `Stopped`).
    /// Returns `false` if the timeout expired (state remains `Draining`).
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.open_streams.load(Ordering::Relaxed) == 0 {
                self.health_state.store(Arc::new(HealthState::Stopped));
                return true;
            }

            if tokio::time::Instant::now() >= deadline {
                return false;
            }

            // Poll at 10ms intervals to avoid busy-waiting
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that decrements the open-stream counter when dropped.
///
/// Drop runs during unwinding too, so a panicking stream body still
/// releases its slot.
#[derive(Debug)]
pub struct StreamGuard {
    open_streams: Arc<AtomicU64>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.open_streams.fetch_sub(1, Ordering::Relaxed);
    }
}
