//! Coalescing wake-up signal.

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A single-slot, edge-triggered wake-up.
///
/// Raising the signal while a wake is already pending has no effect, so a
/// burst of raises is observed as one wake.
#[derive(Debug, Default)]
pub struct Signal {
    pending: AtomicBool,
    notify: Notify,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises a wake unless one is already pending.
    pub fn signal(&self) {
        if !self.pending.swap(true, Ordering::AcqRel) {
            self.notify.notify_waiters();
        }
    }

    /// Consumes the pending wake, if any, without waiting.
    pub fn try_take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Waits for a wake and consumes it.
    ///
    /// When several tasks wait at once, each wake is handed to exactly one.
    pub async fn wait(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            // Register before checking so a raise in between is not missed.
            notified.as_mut().enable();
            if self.try_take() {
                return;
            }
            notified.await;
        }
    }
}
