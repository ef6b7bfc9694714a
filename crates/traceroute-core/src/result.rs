//! Per-hop probe outcomes and the final route reduction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerouteHop {
    /// Whether a reply was received for this probe.
    pub success: bool,
    /// The address that replied (None if no reply).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<IpAddr>,
    /// The TTL that produced this probe.
    pub ttl: u16,
    /// Round-trip time, present only on success.
    #[serde(
        rename = "rtt_ms",
        default,
        skip_serializing_if = "Option::is_none",
        with = "rtt_millis"
    )]
    pub rtt: Option<Duration>,
}

impl TracerouteHop {
    /// A probe that got a reply from `address` after `rtt`.
    pub fn reply(ttl: u16, address: IpAddr, rtt: Duration) -> Self {
        Self {
            success: true,
            address: Some(address),
            ttl,
            rtt: Some(rtt),
        }
    }

    /// A probe that went unanswered.
    pub fn timeout(ttl: u16) -> Self {
        Self {
            success: false,
            address: None,
            ttl,
            rtt: None,
        }
    }

    /// Whether this probe was answered by `destination`.
    ///
    /// IPv4-mapped IPv6 addresses compare equal to their IPv4 form.
    pub fn reached(&self, destination: IpAddr) -> bool {
        self.success
            && self
                .address
                .is_some_and(|addr| addr.to_canonical() == destination.to_canonical())
    }
}

/// Probe outcomes keyed by hop index, each in completion order.
pub type HopTable = BTreeMap<u16, Vec<TracerouteHop>>;

/// Trims a preliminary hop table down to the route that was actually walked.
///
/// Hops `1..max_hops` are visited in order. The first hop with no recorded
/// probes ends the route and is not included. A hop is otherwise copied as-is,
/// and the route ends after the first hop where a successful probe came from
/// `destination`. An IPv4-mapped reply such as `::ffff:1.1.1.1` counts as
/// the IPv4 destination `1.1.1.1`.
pub fn reduce_final_result(preliminary: &HopTable, max_hops: u16, destination: IpAddr) -> HopTable {
    let mut final_results = HopTable::new();
    for ttl in 1..max_hops {
        let Some(probes) = preliminary.get(&ttl) else {
            break;
        };
        let found_final = probes.iter().any(|probe| probe.reached(destination));
        final_results.insert(ttl, probes.clone());
        if found_final {
            break;
        }
    }
    final_results
}

mod rtt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(rtt) => serializer.serialize_f64(rtt.as_micros() as f64 / 1000.0),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let millis = Option::<f64>::deserialize(deserializer)?;
        Ok(millis
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .map(|ms| Duration::from_secs_f64(ms / 1000.0)))
    }
}
