//! Asynchronous reply listener over a shared connectionless socket.
//!
//! The listener runs a polling receive loop on its own task and publishes one
//! [`ReceivedMessage`] per read attempt onto a bounded, ordered stream. Read
//! failures, including the routine read-deadline expiry, are published as
//! data and never end the loop; only [`ListenerChannel::stop`] does.
//!
//! Cancellation is cooperative and checked before each read. A read that is
//! already in flight finishes (at the latest when its deadline passes) and a
//! publish into a full stream waits for the consumer, so callers must keep
//! draining the stream for a stop to take effect promptly.

use crate::{PacketConn, TracerouteError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Read deadline applied before every receive.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);
/// Size of the buffer allocated for every receive.
pub const DEFAULT_BUFFER_SIZE: usize = 1500;
/// Capacity of the message stream.
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Tuning for a [`ListenerChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Read deadline applied before every receive.
    pub read_timeout: Duration,
    /// Size of the buffer allocated for every receive.
    pub buffer_size: usize,
    /// Capacity of the message stream.
    pub queue_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// A datagram read from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Number of meaningful bytes at the start of `buf`.
    pub len: usize,
    /// Sender of the datagram.
    pub peer: SocketAddr,
    /// The receive buffer. Each datagram owns a freshly allocated one.
    pub buf: Vec<u8>,
}

impl Datagram {
    /// The bytes actually received, never more than the buffer holds.
    pub fn payload(&self) -> &[u8] {
        self.buf.get(..self.len).unwrap_or(&self.buf)
    }
}

/// Outcome of one receive attempt.
pub type ReceivedMessage = Result<Datagram, TracerouteError>;

/// Requests that a listener's receive loop stop.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    /// Asks the receive loop to exit before its next read.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Publishes everything read from a [`PacketConn`] onto an ordered stream.
pub struct ListenerChannel<C> {
    conn: Option<C>,
    config: ListenerConfig,
    stop: StopHandle,
    tx: Option<mpsc::Sender<ReceivedMessage>>,
    messages: mpsc::Receiver<ReceivedMessage>,
    task: Option<JoinHandle<()>>,
}

impl<C: PacketConn> ListenerChannel<C> {
    /// Creates a listener over `conn` with default settings.
    pub fn new(conn: C) -> Self {
        Self::with_config(conn, ListenerConfig::default())
    }

    /// Creates a listener over `conn`.
    pub fn with_config(conn: C, config: ListenerConfig) -> Self {
        let (tx, messages) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            conn: Some(conn),
            config,
            stop: StopHandle::default(),
            tx: Some(tx),
            messages,
            task: None,
        }
    }

    /// Spawns the receive loop. Must be called from within a tokio runtime.
    ///
    /// Calling this more than once has no effect.
    pub fn start(&mut self) {
        let (Some(conn), Some(tx)) = (self.conn.take(), self.tx.take()) else {
            warn!("Listener already started");
            return;
        };
        debug!(
            read_timeout_ms = self.config.read_timeout.as_millis() as u64,
            queue_capacity = self.config.queue_capacity,
            "Starting listener"
        );
        self.task = Some(tokio::spawn(receive_loop(
            conn,
            tx,
            self.stop.clone(),
            self.config,
        )));
    }

    /// Requests cooperative cancellation of the receive loop.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// A handle that can stop the loop from elsewhere.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Receives the next message, or `None` once the loop has exited and the
    /// stream is drained.
    pub async fn recv(&mut self) -> Option<ReceivedMessage> {
        self.messages.recv().await
    }

    /// The message stream, in receipt order.
    pub fn messages(&mut self) -> &mut mpsc::Receiver<ReceivedMessage> {
        &mut self.messages
    }

    /// Whether the receive loop has exited.
    pub fn is_finished(&self) -> bool {
        match &self.task {
            Some(task) => task.is_finished(),
            // Joined already if the connection was handed to the loop.
            None => self.conn.is_none(),
        }
    }

    /// Waits for the receive loop to exit.
    ///
    /// This does not drain the stream; a loop blocked on a full stream will
    /// not exit until someone does.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Listener task failed");
            }
        }
    }
}

impl<C> Drop for ListenerChannel<C> {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

/// Reads from `conn` until stopped or until the stream's receiver is gone.
pub(crate) async fn receive_loop<C: PacketConn>(
    mut conn: C,
    tx: mpsc::Sender<ReceivedMessage>,
    stop: StopHandle,
    config: ListenerConfig,
) {
    loop {
        if stop.is_stopped() {
            debug!("Listener stopped");
            return;
        }

        let message = receive_once(&mut conn, &config).await;
        if let Err(e) = &message {
            trace!(error = %e, "Receive attempt failed");
        }
        if tx.send(message).await.is_err() {
            debug!("Listener stream closed, stopping");
            return;
        }
    }
}

async fn receive_once<C: PacketConn>(conn: &mut C, config: &ListenerConfig) -> ReceivedMessage {
    let mut buf = vec![0u8; config.buffer_size];
    conn.set_read_deadline(Instant::now() + config.read_timeout)?;
    let (reported, peer) = conn.read_from(&mut buf).await?;
    let len = reported.min(buf.len());
    if len < reported {
        warn!(
            reported = reported,
            buffer = buf.len(),
            "Connection overstated datagram length"
        );
    }
    trace!(len = len, peer = %peer, "Received datagram");
    Ok(Datagram { len, peer, buf })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoConn {
        peer: SocketAddr,
    }

    #[async_trait]
    impl PacketConn for EchoConn {
        fn set_read_deadline(&mut self, _deadline: Instant) -> Result<(), TracerouteError> {
            Ok(())
        }

        async fn read_from(
            &mut self,
            buf: &mut [u8],
        ) -> Result<(usize, SocketAddr), TracerouteError> {
            buf[0] = 0xAB;
            Ok((1, self.peer))
        }
    }

    #[tokio::test]
    async fn test_loop_ends_when_stream_dropped() {
        let (tx, rx) = mpsc::channel(1);
        let conn = EchoConn {
            peer: "192.0.2.1:0".parse().unwrap(),
        };
        let task = tokio::spawn(receive_loop(
            conn,
            tx,
            StopHandle::default(),
            ListenerConfig::default(),
        ));

        drop(rx);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop should exit once nobody listens")
            .unwrap();
    }

    #[tokio::test]
    async fn test_loop_checks_stop_before_reading() {
        let (tx, mut rx) = mpsc::channel(4);
        let stop = StopHandle::default();
        stop.stop();
        let conn = EchoConn {
            peer: "192.0.2.1:0".parse().unwrap(),
        };

        receive_loop(conn, tx, stop, ListenerConfig::default()).await;
        assert!(rx.recv().await.is_none());
    }

    struct OverstatingConn;

    #[async_trait]
    impl PacketConn for OverstatingConn {
        fn set_read_deadline(&mut self, _deadline: Instant) -> Result<(), TracerouteError> {
            Ok(())
        }

        async fn read_from(
            &mut self,
            buf: &mut [u8],
        ) -> Result<(usize, SocketAddr), TracerouteError> {
            buf.fill(7);
            Ok((buf.len() + 100, "192.0.2.1:0".parse().unwrap()))
        }
    }

    #[tokio::test]
    async fn test_overstated_length_is_clamped() {
        let config = ListenerConfig {
            buffer_size: 16,
            ..Default::default()
        };
        let datagram = receive_once(&mut OverstatingConn, &config).await.unwrap();
        assert_eq!(datagram.len, 16);
        assert_eq!(datagram.payload(), &[7; 16]);
    }

    #[test]
    fn test_payload_never_reads_past_buffer() {
        let datagram = Datagram {
            len: 10,
            peer: "192.0.2.1:0".parse().unwrap(),
            buf: vec![1, 2, 3],
        };
        assert_eq!(datagram.payload(), &[1, 2, 3]);
    }

    #[test]
    fn test_datagram_payload_is_prefix() {
        let datagram = Datagram {
            len: 2,
            peer: "192.0.2.1:0".parse().unwrap(),
            buf: vec![1, 2, 0, 0],
        };
        assert_eq!(datagram.payload(), &[1, 2]);
    }
}
