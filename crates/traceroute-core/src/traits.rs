//! Socket abstraction consumed by the reply listener.

use crate::TracerouteError;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

/// A connectionless socket the listener can poll for replies.
///
/// Implementations are opened and bound by the caller (ICMP, UDP or raw,
/// depending on the probe type) and handed to the listener, which then owns
/// them exclusively.
#[async_trait]
pub trait PacketConn: Send + 'static {
    /// Sets the deadline for subsequent reads.
    fn set_read_deadline(&mut self, deadline: Instant) -> Result<(), TracerouteError>;

    /// Reads one datagram into `buf`, returning its length and sender.
    ///
    /// Returns [`TracerouteError::ReadTimeout`] once the read deadline passes.
    async fn read_from(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddr), TracerouteError>;
}

/// [`PacketConn`] over a tokio UDP socket.
#[derive(Debug)]
pub struct UdpConn {
    socket: UdpSocket,
    read_deadline: Option<Instant>,
}

impl UdpConn {
    /// Wraps an already-bound socket.
    pub fn new(socket: UdpSocket) -> Self {
        Self {
            socket,
            read_deadline: None,
        }
    }

    /// Binds a new socket to `addr`.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TracerouteError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(TracerouteError::SocketCreation)?;
        Ok(Self::new(socket))
    }

    /// The address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TracerouteError> {
        self.socket
            .local_addr()
            .map_err(TracerouteError::SocketCreation)
    }
}

#[async_trait]
impl PacketConn for UdpConn {
    fn set_read_deadline(&mut self, deadline: Instant) -> Result<(), TracerouteError> {
        self.read_deadline = Some(deadline);
        Ok(())
    }

    async fn read_from(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddr), TracerouteError> {
        let read = self.socket.recv_from(buf);
        let received = match self.read_deadline {
            Some(deadline) => timeout_at(deadline, read)
                .await
                .map_err(|_| TracerouteError::ReadTimeout)?,
            None => read.await,
        };
        Ok(received?)
    }
}
