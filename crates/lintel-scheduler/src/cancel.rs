//! Cooperative cancellation signal

use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A shared flag that asks a command to stop its work.
///
/// Every clone observes the same state. Once raised, the signal cannot be
/// lowered. Raising it is idempotent and safe at any point of the command's
/// lifetime, including after the command has finished.
///
/// Long-running work (the analysis itself) is expected to poll
/// [CancelMonitor::is_cancelled] and return early when it flips; nothing is
/// ever forcibly interrupted.
#[derive(Clone, Default)]
pub struct CancelMonitor {
    inner: Arc<CancelState>,
}

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    requests: AtomicUsize,
}

impl CancelMonitor {
    /// Creates a monitor in the "not cancelled" state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal.
    pub fn cancel(&self) {
        self.inner.requests.fetch_add(1, Ordering::AcqRel);
        self.inner.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once [cancel](Self::cancel) was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Number of times the signal was raised, across all clones.
    pub fn cancel_requests(&self) -> usize {
        self.inner.requests.load(Ordering::Acquire)
    }

    /// Returns true if both monitors share the same state.
    pub fn same_as(&self, other: &CancelMonitor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Debug for CancelMonitor {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self.is_cancelled() {
            true => formatter.write_str("CancelMonitor(cancelled)"),
            false => formatter.write_str("CancelMonitor(active)"),
        }
    }
}
