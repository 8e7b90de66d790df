//! Process-wide graceful shutdown.
//!
//! The handler covers Ctrl+C, SIGTERM and SIGHUP. It only records the
//! request and wakes the server; camera teardown happens on the normal
//! exit path so it runs however termination was requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Global flag for shutdown requests across the application
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check if a termination signal has been received.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Wakes the server when shutdown is requested.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown programmatically.
    pub fn trigger(&self) {
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Set up the termination handler.
///
/// This should be called once at program startup.
pub fn install() -> Result<ShutdownSignal, ctrlc::Error> {
    let signal = ShutdownSignal::new();
    let handler_signal = signal.clone();
    ctrlc::set_handler(move || {
        log::info!("Received termination signal, shutting down...");
        handler_signal.trigger();
    })?;
    Ok(signal)
}
