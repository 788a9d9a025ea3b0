//! Signal handling for graceful daemon shutdown.
//!
//! Registers SIGTERM and SIGINT handlers that set an atomic flag the main
//! loop polls once per tick. Signal handlers must be async-signal-safe, so
//! they only touch atomics.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared state between the signal handlers and the main loop.
#[derive(Debug, Default)]
pub struct SignalState {
    shutdown_requested: AtomicBool,
    signal_count: AtomicU32,
}

impl SignalState {
    /// Create a new signal state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Relaxed)
    }

    /// Request shutdown (can be called from any thread).
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Relaxed);
    }

    fn record_signal(&self) {
        self.signal_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Total number of signals received.
    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::Relaxed)
    }
}

/// Handle for signal management.
#[derive(Clone)]
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    /// Create a handler and register the Unix signal handlers.
    ///
    /// On non-Unix platforms only manual shutdown is supported.
    pub fn new() -> std::io::Result<Self> {
        let handler = Self {
            state: Arc::new(SignalState::new()),
        };

        #[cfg(unix)]
        handler.register_unix_handlers()?;

        Ok(handler)
    }

    #[cfg(unix)]
    fn register_unix_handlers(&self) -> std::io::Result<()> {
        use std::os::raw::c_int;

        static SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);

        let state = Arc::clone(&self.state);

        // A poll thread moves the static flag into the shared state; the
        // handler itself only stores an atomic.
        std::thread::spawn(move || loop {
            if SHUTDOWN_FLAG.swap(false, Ordering::Relaxed) {
                info!("shutdown signal received");
                state.request_shutdown();
                state.record_signal();
            }
            if state.shutdown_requested() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        });

        unsafe {
            libc::signal(libc::SIGTERM, shutdown_handler as libc::sighandler_t);
            libc::signal(libc::SIGINT, shutdown_handler as libc::sighandler_t);
        }

        extern "C" fn shutdown_handler(_: c_int) {
            SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
        }

        debug!("Unix signal handlers registered");
        Ok(())
    }

    /// Check if shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.state.shutdown_requested()
    }

    /// Manually request shutdown.
    pub fn request_shutdown(&self) {
        info!("manual shutdown requested");
        self.state.request_shutdown();
    }

    /// The signal state, for inspection.
    pub fn state(&self) -> &SignalState {
        &self.state
    }
}
