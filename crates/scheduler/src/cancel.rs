//! Interrupt tokens for running tasks
//!
//! A task that is already Processing cannot be stopped from outside; the
//! scheduler raises a request on the task's token and the routine is expected
//! to poll it. Cancel always wins over pause.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const NONE: u8 = 0;
const PAUSE: u8 = 1;
const CANCEL: u8 = 2;

/// Pending interrupt request on a running task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    None,
    Pause,
    Cancel,
}

/// Cooperative interrupt token for a single dispatch of a task
///
/// Every dispatch gets a fresh token, so a request raised against an earlier
/// attempt never leaks into a resumed or retried one.
///
/// # Example
///
/// ```
/// use mediaflow_scheduler::{CancellationToken, Interrupt};
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.request_pause();
/// assert!(worker_token.is_pause_requested());
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// assert_eq!(worker_token.interrupt(), Interrupt::Cancel);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<AtomicU8>,
}

impl CancellationToken {
    /// Create a token with no pending request
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; overrides a pending pause.
    pub fn cancel(&self) {
        self.state.store(CANCEL, Ordering::Release);
    }

    /// Request a pause.
    ///
    /// Returns `false` when cancellation was already requested.
    pub fn request_pause(&self) -> bool {
        match self
            .state
            .compare_exchange(NONE, PAUSE, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == PAUSE,
        }
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCEL
    }

    /// Whether a pause was requested and no cancel overrides it
    pub fn is_pause_requested(&self) -> bool {
        self.state.load(Ordering::Acquire) == PAUSE
    }

    /// True when either a pause or a cancel is pending
    pub fn is_interrupted(&self) -> bool {
        self.state.load(Ordering::Acquire) != NONE
    }

    /// The pending request, if any
    pub fn interrupt(&self) -> Interrupt {
        match self.state.load(Ordering::Acquire) {
            CANCEL => Interrupt::Cancel,
            PAUSE => Interrupt::Pause,
            _ => Interrupt::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_token_starts_clear() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(!token.is_pause_requested());
        assert!(!token.is_interrupted());
        assert_eq!(token.interrupt(), Interrupt::None);
    }

    #[test]
    fn test_cancel_overrides_pause() {
        let token = CancellationToken::new();
        assert!(token.request_pause());
        token.cancel();
        assert_eq!(token.interrupt(), Interrupt::Cancel);
        assert!(!token.request_pause());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_repeated_pause_request() {
        let token = CancellationToken::new();
        assert!(token.request_pause());
        assert!(token.request_pause());
        assert_eq!(token.interrupt(), Interrupt::Pause);
    }

    #[test]
    fn test_clones_share_state_across_threads() {
        let token = CancellationToken::new();
        let worker = token.clone();

        let handle = thread::spawn(move || {
            while !worker.is_cancelled() {
                thread::yield_now();
            }
            true
        });

        token.cancel();
        assert!(handle.join().unwrap());
    }
}
