//! Implementations of the CLI subcommands.

use std::collections::HashSet;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use traceroute_core::{
    reduce_final_result, HopTable, ListenerChannel, ListenerConfig, PacketConn, TracerouteError,
    UdpConn,
};
use traceroute_plugins::{Hook, PluginSet};
use tracing::{debug, info, trace, warn};

/// Parses a JSON hop table keyed by hop index.
pub fn parse_hop_table(json: &str) -> Result<HopTable, TracerouteError> {
    serde_json::from_str(json)
        .map_err(|e| TracerouteError::InvalidConfig(format!("Invalid hop table: {}", e)))
}

/// Replays the trace hooks for every hop of `table`, in hop order.
pub fn replay_hooks(table: &HopTable, plugins: &PluginSet) {
    let mut seen = HashSet::new();
    for (&ttl, hops) in table {
        plugins.fire(Hook::TtlChange { ttl });
        for hop in hops {
            if let Some(addr) = hop.address.filter(|_| hop.success) {
                if seen.insert(addr) {
                    plugins.fire(Hook::NewIpFound { addr });
                }
            }
        }
        plugins.fire(Hook::TtlCompleted { ttl, hops });
    }
}

/// Reduces the JSON hop table in `input`, keeping hops up to `max_hops`.
pub fn run_reduce(
    input: &str,
    destination: IpAddr,
    max_hops: u16,
    plugins: &PluginSet,
) -> Result<HopTable, TracerouteError> {
    let table = parse_hop_table(input)?;
    debug!(hops = table.len(), destination = %destination, "Loaded hop table");

    replay_hooks(&table, plugins);
    let route = reduce_final_result(&table, max_hops.saturating_add(1), destination);
    info!(hops = route.len(), "Reduced route");
    Ok(route)
}

/// Binds a UDP socket at `bind` and logs what arrives on it.
///
/// Returns the number of datagrams received once `count` is reached or
/// `shutdown` completes.
pub async fn run_listen<F>(
    bind: SocketAddr,
    count: Option<usize>,
    config: ListenerConfig,
    shutdown: F,
) -> Result<usize, TracerouteError>
where
    F: Future<Output = ()>,
{
    let conn = UdpConn::bind(bind).await?;
    info!(local_addr = %conn.local_addr()?, "Listening");

    let mut listener = ListenerChannel::with_config(conn, config);
    listener.start();
    let received = listen_until(&mut listener, count, shutdown).await;
    listener.stop();
    Ok(received)
}

async fn listen_until<C, F>(
    listener: &mut ListenerChannel<C>,
    count: Option<usize>,
    shutdown: F,
) -> usize
where
    C: PacketConn,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut received = 0;

    while count.map_or(true, |limit| received < limit) {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted");
                break;
            }
            message = listener.recv() => match message {
                Some(Ok(datagram)) => {
                    received += 1;
                    info!(peer = %datagram.peer, len = datagram.len, "Received datagram");
                }
                Some(Err(e)) if e.is_retryable() => trace!(error = %e, "No datagram yet"),
                Some(Err(e)) => warn!(error = %e, "Receive failed"),
                None => break,
            },
        }
    }
    received
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use traceroute_core::TracerouteHop;
    use traceroute_plugins::{Plugin, PluginError};

    const TABLE: &str = r#"{
        "1": [{"success": true, "address": "10.0.0.1", "ttl": 1, "rtt_ms": 1.5}],
        "2": [{"success": false, "ttl": 2},
              {"success": true, "address": "10.0.0.2", "ttl": 2, "rtt_ms": 3.0}],
        "3": [{"success": true, "address": "192.0.2.1", "ttl": 3, "rtt_ms": 4.25}],
        "4": [{"success": true, "address": "192.0.2.1", "ttl": 4, "rtt_ms": 4.5}]
    }"#;

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Plugin for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn on_new_ip_found(&self, addr: IpAddr) -> Result<(), PluginError> {
            self.0.lock().unwrap().push(format!("ip {addr}"));
            Ok(())
        }

        fn on_ttl_completed(&self, ttl: u16, hops: &[TracerouteHop]) -> Result<(), PluginError> {
            self.0.lock().unwrap().push(format!("done {ttl} x{}", hops.len()));
            Ok(())
        }
    }

    #[test]
    fn test_reduce_truncates_at_destination() {
        let destination = "192.0.2.1".parse().unwrap();
        let route = run_reduce(TABLE, destination, 30, &PluginSet::default()).unwrap();

        assert_eq!(route.keys().copied().collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(route[&2].len(), 2);
        assert_eq!(route[&1][0].rtt, Some(Duration::from_micros(1500)));
    }

    #[test]
    fn test_reduce_keeps_max_hops() {
        let destination = "198.51.100.1".parse().unwrap();
        let route = run_reduce(TABLE, destination, 2, &PluginSet::default()).unwrap();
        assert_eq!(route.keys().copied().collect::<Vec<_>>(), [1, 2]);
    }

    #[test]
    fn test_reduce_rejects_bad_input() {
        let destination = "192.0.2.1".parse().unwrap();
        let err = run_reduce("[1, 2]", destination, 30, &PluginSet::default()).unwrap_err();
        assert!(matches!(err, TracerouteError::InvalidConfig(_)));
    }

    #[test]
    fn test_replay_fires_hooks_in_hop_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let plugins = PluginSet::new(vec![Box::new(Recorder(Arc::clone(&events)))]);
        let table = parse_hop_table(TABLE).unwrap();

        replay_hooks(&table, &plugins);

        assert_eq!(
            *events.lock().unwrap(),
            [
                "ip 10.0.0.1",
                "done 1 x1",
                "ip 10.0.0.2",
                "done 2 x2",
                "ip 192.0.2.1",
                "done 3 x1",
                "done 4 x1",
            ]
        );
    }

    #[tokio::test]
    async fn test_listen_stops_after_count() {
        let conn = UdpConn::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let target = conn.local_addr().unwrap();
        let mut listener = ListenerChannel::new(conn);
        listener.start();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"one", target).await.unwrap();
        sender.send_to(b"two", target).await.unwrap();

        let received = tokio::time::timeout(
            Duration::from_secs(5),
            listen_until(&mut listener, Some(2), std::future::pending()),
        )
        .await
        .unwrap();
        assert_eq!(received, 2);
        listener.stop();
    }

    #[tokio::test]
    async fn test_listen_stops_on_shutdown() {
        let conn = UdpConn::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let mut listener = ListenerChannel::new(conn);
        listener.start();

        let received = listen_until(&mut listener, None, async {}).await;
        assert_eq!(received, 0);
        listener.stop();
    }
}
