//! Coordination primitives for running many probes at once.
//!
//! - [`ParallelLimiter`]: FIFO admission gate bounding probes in flight
//! - [`TaskGroup`]: reusable completion barrier with any number of waiters
//! - [`Signal`]: single-slot wake-up that coalesces repeated raises

pub mod limiter;
pub mod signal;
pub mod task_group;

pub use limiter::{Admission, ParallelLimiter};
pub use signal::Signal;
pub use task_group::TaskGroup;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the guard if a previous holder panicked.
///
/// State guarded here is only ever touched in short, panic-free transitions.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
