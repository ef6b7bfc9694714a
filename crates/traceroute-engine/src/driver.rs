//! Protocol seam between the orchestrator and the wire.

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;
use traceroute_core::{Datagram, TracerouteError};

/// Identifies one outstanding probe.
///
/// Allocated by the tracer; drivers embed it in the probe (port, sequence
/// number, IP id...) and recover it from the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeKey {
    pub ttl: u16,
    pub seq: u32,
}

impl fmt::Display for ProbeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ttl={} seq={}", self.ttl, self.seq)
    }
}

/// Sends probes and correlates replies for one protocol.
#[async_trait]
pub trait ProbeDriver: Send + Sync + 'static {
    /// Emits one probe with the given TTL, tagged with `key`.
    async fn send_probe(&self, ttl: u16, key: ProbeKey) -> Result<(), TracerouteError>;

    /// Maps a received datagram to the probe it answers and the address that
    /// answered, or `None` if it answers none of ours.
    fn match_reply(&self, datagram: &Datagram) -> Option<(ProbeKey, IpAddr)>;
}
