//! Reusable completion barrier.

use super::lock;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::error;

#[derive(Debug, Default)]
struct GroupState {
    count: usize,
    waiters: Vec<oneshot::Sender<()>>,
}

/// Tracks outstanding units of work and wakes every waiter once none remain.
///
/// Unlike a one-shot barrier, a group can be reused: after the count drops to
/// zero and the waiters are released, later [`add`](Self::add) and
/// [`wait`](Self::wait) calls start a fresh cycle.
///
/// Cloning yields another handle to the same group.
#[derive(Debug, Clone, Default)]
pub struct TaskGroup {
    state: Arc<Mutex<GroupState>>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one outstanding unit of work.
    pub fn add(&self) {
        lock(&self.state).count += 1;
    }

    /// Completes one unit of work, releasing all waiters if it was the last.
    ///
    /// Calling this with nothing outstanding is a caller bug: it is logged and
    /// the count stays at zero.
    pub fn done(&self) {
        let mut state = lock(&self.state);
        if state.count == 0 {
            error!("TaskGroup::done called with no outstanding work");
            return;
        }
        state.count -= 1;
        if state.count == 0 {
            for waiter in state.waiters.drain(..) {
                // A waiter that stopped listening needs no wake-up.
                let _ = waiter.send(());
            }
        }
    }

    /// Waits until no work is outstanding.
    ///
    /// The waiter is registered when this is called, not when the returned
    /// future is first polled, so it is released by any `done` that happens
    /// afterwards. Resolves immediately if nothing is outstanding.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let parked = {
            let mut state = lock(&self.state);
            if state.count == 0 {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Some(rx)
            }
        };

        async move {
            if let Some(rx) = parked {
                // Senders are only dropped after being fired.
                let _ = rx.await;
            }
        }
    }

    /// Number of outstanding units of work.
    pub fn outstanding(&self) -> usize {
        lock(&self.state).count
    }
}
