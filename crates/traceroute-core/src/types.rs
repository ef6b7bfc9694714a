//! Core types for traceroute operations.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of probes sent per hop.
pub const DEFAULT_NUM_MEASUREMENTS: u16 = 3;
/// Default highest hop index probed.
pub const DEFAULT_MAX_HOPS: u16 = 30;
/// Default per-probe reply timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Parameters for a multi-probe trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceParams {
    /// First hop index (TTL) to probe.
    pub begin_hop: u16,
    /// Last hop index (TTL) to probe.
    pub max_hops: u16,
    /// Probes sent per hop.
    pub num_measurements: u16,
    /// Upper bound on probes in flight at once.
    pub parallel_requests: usize,
    /// How long a probe waits for its reply.
    #[serde(with = "millis")]
    pub timeout: Duration,
    /// Pause between advancing to the next hop.
    #[serde(with = "millis")]
    pub ttl_interval: Duration,
}

impl Default for TraceParams {
    fn default() -> Self {
        Self {
            begin_hop: 1,
            max_hops: DEFAULT_MAX_HOPS,
            num_measurements: DEFAULT_NUM_MEASUREMENTS,
            parallel_requests: DEFAULT_NUM_MEASUREMENTS as usize * 5,
            timeout: DEFAULT_PROBE_TIMEOUT,
            ttl_interval: Duration::ZERO,
        }
    }
}

impl TraceParams {
    /// Validates the parameters.
    pub fn validate(&self) -> Result<(), crate::TracerouteError> {
        if self.begin_hop == 0 || self.begin_hop > self.max_hops {
            return Err(crate::TracerouteError::InvalidTtlRange {
                begin_hop: self.begin_hop,
                max_hops: self.max_hops,
            });
        }
        if self.num_measurements == 0 {
            return Err(crate::TracerouteError::InvalidConfig(
                "num_measurements must be at least 1".to_string(),
            ));
        }
        if self.parallel_requests == 0 {
            return Err(crate::TracerouteError::InvalidConfig(
                "parallel_requests must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(crate::TracerouteError::InvalidConfig(
                "timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serde helper storing a [`Duration`] as integer milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
