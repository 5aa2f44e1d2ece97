//! Signal Handling for Graceful Shutdown
//!
//! SIGINT/SIGTERM/SIGQUIT stop the runner from launching further tests. The
//! test currently running receives the signal through the process group and
//! its partial output is still reconciled.
//!
//! The signal thread is a daemon; it dies with the main thread.

use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Set once a shutdown signal arrived
pub static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Install signal handlers for graceful shutdown
pub fn install_signal_handlers() -> io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGQUIT])?;

    thread::Builder::new()
        .name("zharness-signals".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                let name = match sig {
                    SIGINT => "SIGINT",
                    SIGTERM => "SIGTERM",
                    _ => "SIGQUIT",
                };
                tracing::warn!("received {}, not starting further tests", name);
                SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
            }
        })?;

    Ok(())
}

/// Check if shutdown was requested (called between tests)
#[inline]
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_flag() {
        assert!(!shutdown_requested());
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        assert!(shutdown_requested());
        SHUTDOWN_REQUESTED.store(false, Ordering::SeqCst);
    }
}
