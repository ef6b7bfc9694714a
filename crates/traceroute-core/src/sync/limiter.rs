//! Bounded admission gate for concurrent probes.

use super::lock;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{trace, warn};

#[derive(Debug)]
struct LimiterState {
    admitted: usize,
    waiting: VecDeque<oneshot::Sender<()>>,
}

#[derive(Debug)]
struct LimiterInner {
    capacity: usize,
    state: Mutex<LimiterState>,
}

impl LimiterInner {
    /// Gives one unit back, handing it straight to the oldest live waiter.
    fn release(&self) {
        let mut state = lock(&self.state);
        while let Some(next) = state.waiting.pop_front() {
            if next.send(()).is_ok() {
                return;
            }
            trace!("Skipping abandoned admission");
        }
        match state.admitted.checked_sub(1) {
            Some(admitted) => state.admitted = admitted,
            None => warn!("ParallelLimiter::finished called without a matching admission"),
        }
    }
}

/// Limits how many probes run at once.
///
/// Every [`start`](Self::start) returns an [`Admission`] that resolves once a
/// unit of capacity is available. Admissions are granted strictly in the
/// order `start` was called. Each resolved admission must be paired with one
/// [`finished`](Self::finished) call.
///
/// Cloning yields another handle to the same gate.
#[derive(Debug, Clone)]
pub struct ParallelLimiter {
    inner: Arc<LimiterInner>,
}

impl ParallelLimiter {
    /// Creates a gate admitting at most `capacity` holders at a time.
    ///
    /// With a capacity of zero nothing is admitted until a unit is released.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(LimiterInner {
                capacity,
                state: Mutex::new(LimiterState {
                    admitted: 0,
                    waiting: VecDeque::new(),
                }),
            }),
        }
    }

    /// Requests admission.
    ///
    /// The request takes its place in line immediately, before the returned
    /// handle is first polled.
    pub fn start(&self) -> Admission {
        let (tx, rx) = oneshot::channel();
        let mut state = lock(&self.inner.state);
        if state.admitted < self.inner.capacity {
            state.admitted += 1;
            // The receiver is still held below, so this cannot fail.
            let _ = tx.send(());
        } else {
            state.waiting.push_back(tx);
        }
        drop(state);

        Admission {
            rx,
            limiter: Arc::clone(&self.inner),
            observed: false,
        }
    }

    /// Releases one unit of capacity.
    ///
    /// If requests are queued, the unit passes directly to the oldest one
    /// instead of being freed and contended for.
    pub fn finished(&self) {
        self.inner.release();
    }

    /// Maximum number of concurrent holders.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of units currently handed out.
    pub fn admitted(&self) -> usize {
        lock(&self.inner.state).admitted
    }

    /// Number of queued requests, including ones whose handle was dropped but
    /// not yet skipped.
    pub fn waiting(&self) -> usize {
        lock(&self.inner.state).waiting.len()
    }
}

/// A pending or granted admission from a [`ParallelLimiter`].
///
/// Resolves exactly once. Dropping a handle whose admission was granted but
/// never observed returns the unit to the limiter; dropping a queued handle
/// gives up its place in line.
#[derive(Debug)]
#[must_use = "an admission does nothing unless awaited"]
pub struct Admission {
    rx: oneshot::Receiver<()>,
    limiter: Arc<LimiterInner>,
    observed: bool,
}

impl Future for Admission {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.observed {
            return Poll::Ready(());
        }
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(())) => {
                self.observed = true;
                Poll::Ready(())
            }
            // Queued senders live in the limiter this handle keeps alive, so a
            // closed channel is never observed here.
            Poll::Ready(Err(_)) | Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if self.observed {
            return;
        }
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            trace!("Returning unobserved admission");
            self.limiter.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_admits_up_to_capacity() {
        let limiter = ParallelLimiter::new(2);

        limiter.start().await;
        limiter.start().await;
        assert_eq!(limiter.admitted(), 2);

        let third = limiter.start();
        assert_eq!(limiter.waiting(), 1);
        assert!(timeout(Duration::from_millis(20), third).await.is_err());
    }

    #[tokio::test]
    async fn test_finished_hands_unit_to_waiter() {
        let limiter = ParallelLimiter::new(1);
        limiter.start().await;

        let waiter = limiter.start();
        limiter.finished();

        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be admitted");
        assert_eq!(limiter.admitted(), 1);
        assert_eq!(limiter.waiting(), 0);

        limiter.finished();
        assert_eq!(limiter.admitted(), 0);
    }

    #[tokio::test]
    async fn test_admission_order_is_fifo() {
        let limiter = ParallelLimiter::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        limiter.start().await;

        let mut handles = Vec::new();
        for id in 0..5 {
            let admission = limiter.start();
            let limiter = limiter.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                admission.await;
                order.lock().unwrap().push(id);
                limiter.finished();
            }));
        }
        // Spawned tasks may be polled in any order; admission follows start().
        tokio::task::yield_now().await;
        limiter.finished();

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(limiter.admitted(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_capacity_never_exceeded() {
        const CAPACITY: usize = 3;
        let limiter = ParallelLimiter::new(CAPACITY);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let admission = limiter.start();
            let limiter = limiter.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                admission.await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                limiter.finished();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= CAPACITY, "peak concurrency was {peak}");
        assert_eq!(limiter.admitted(), 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_parks_everything() {
        let limiter = ParallelLimiter::new(0);
        let admission = limiter.start();
        assert_eq!(limiter.admitted(), 0);
        assert!(timeout(Duration::from_millis(20), admission).await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_waiter_is_skipped() {
        let limiter = ParallelLimiter::new(1);
        limiter.start().await;

        let abandoned = limiter.start();
        let next = limiter.start();
        drop(abandoned);

        limiter.finished();
        timeout(Duration::from_secs(1), next)
            .await
            .expect("live waiter should be admitted");
        assert_eq!(limiter.admitted(), 1);
    }

    #[tokio::test]
    async fn test_unobserved_admission_returns_unit() {
        let limiter = ParallelLimiter::new(1);

        let granted = limiter.start();
        assert_eq!(limiter.admitted(), 1);
        drop(granted);
        assert_eq!(limiter.admitted(), 0);

        limiter.start().await;
        assert_eq!(limiter.admitted(), 1);
    }

    #[test]
    fn test_unbalanced_finished_saturates() {
        let limiter = ParallelLimiter::new(2);
        limiter.finished();
        assert_eq!(limiter.admitted(), 0);
    }
}
