//! Concurrent multi-probe traceroute orchestration.
//!
//! [`Tracer`] drives a trace over the primitives in `traceroute-core`: probes
//! are admitted through a [`ParallelLimiter`](traceroute_core::ParallelLimiter),
//! replies arrive through a [`ListenerChannel`](traceroute_core::ListenerChannel),
//! a [`TaskGroup`](traceroute_core::TaskGroup) marks the end of the trace and a
//! [`Signal`](traceroute_core::Signal) stops it early once the destination
//! answers. Protocol specifics live behind [`ProbeDriver`].

pub mod driver;
pub mod tracer;

pub use driver::{ProbeDriver, ProbeKey};
pub use tracer::Tracer;
