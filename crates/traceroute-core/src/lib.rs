//! Core types, concurrency primitives and result shaping for traceroute.
//!
//! This crate provides the machinery a multi-probe trace is built on:
//!
//! - [`ParallelLimiter`], [`TaskGroup`] and [`Signal`] to fan probes out and
//!   gather them back in
//! - [`ListenerChannel`] to receive replies on a shared socket
//! - [`reduce_final_result`] to trim raw per-hop outcomes into the route
//! - [`TracerouteError`] for error handling

pub mod error;
pub mod listener;
pub mod result;
pub mod sync;
pub mod traits;
pub mod types;

pub use error::{TracerouteError, TracerouteResult};
pub use listener::{
    Datagram, ListenerChannel, ListenerConfig, ReceivedMessage, StopHandle,
};
pub use result::{reduce_final_result, HopTable, TracerouteHop};
pub use sync::{Admission, ParallelLimiter, Signal, TaskGroup};
pub use traits::{PacketConn, UdpConn};
pub use types::TraceParams;
