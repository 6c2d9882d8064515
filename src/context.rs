use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Deadline and cancellation scope for a single store call.
///
/// Clones share the cancellation flag, so a caller can hand one clone to the
/// store and cancel through another from a different thread.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// A context that never expires on its own.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is none.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fails fast when the context is already done.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.is_expired() {
            return Err(Error::Timeout);
        }
        Ok(())
    }

    /// Turns an interrupted statement, or a lock wait cut short by the
    /// deadline, into the kind that caused it.
    pub(crate) fn refine(&self, err: Error) -> Error {
        match err {
            Error::Cancelled if !self.is_cancelled() && self.is_expired() => Error::Timeout,
            err if err.is_busy() => match self.check() {
                Err(done) => done,
                Ok(()) => err,
            },
            other => other,
        }
    }

    /// Returns a probe the SQLite progress handler can poll.
    pub(crate) fn probe(&self) -> impl FnMut() -> bool + Send + std::panic::RefUnwindSafe + 'static {
        let deadline = self.deadline;
        let cancelled = Arc::clone(&self.cancelled);
        move || {
            cancelled.load(Ordering::Acquire) || deadline.is_some_and(|d| Instant::now() >= d)
        }
    }
}
