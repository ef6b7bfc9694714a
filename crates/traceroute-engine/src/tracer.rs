//! The multi-probe trace loop.

use crate::{ProbeDriver, ProbeKey};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use traceroute_core::{
    reduce_final_result, HopTable, ListenerChannel, ListenerConfig, PacketConn,
    ParallelLimiter, Signal, TaskGroup, TraceParams, TracerouteError, TracerouteHop,
};
use traceroute_plugins::{Hook, PluginSet};
use tracing::{debug, info, trace, warn};

type PendingReplies = Arc<Mutex<HashMap<ProbeKey, oneshot::Sender<IpAddr>>>>;

#[derive(Debug, Default)]
struct TraceState {
    table: HopTable,
    seen: HashSet<IpAddr>,
    send_error: Option<TracerouteError>,
}

/// Everything a probe task needs, shared across all of them.
struct ProbeContext<D> {
    driver: Arc<D>,
    destination: IpAddr,
    probe_timeout: Duration,
    num_measurements: usize,
    pending: PendingReplies,
    state: Mutex<TraceState>,
    destination_reached: Signal,
    plugins: Arc<PluginSet>,
}

/// Runs traces towards one destination.
pub struct Tracer<D> {
    driver: Arc<D>,
    destination: IpAddr,
    hostname: Option<String>,
    params: TraceParams,
    listener_config: ListenerConfig,
    plugins: Arc<PluginSet>,
}

impl<D: ProbeDriver> Tracer<D> {
    pub fn new(driver: Arc<D>, destination: IpAddr, params: TraceParams, plugins: PluginSet) -> Self {
        Self {
            driver,
            destination,
            hostname: None,
            params,
            listener_config: ListenerConfig::default(),
            plugins: Arc::new(plugins),
        }
    }

    /// Records the hostname the destination was resolved from.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_listener_config(mut self, config: ListenerConfig) -> Self {
        self.listener_config = config;
        self
    }

    pub fn params(&self) -> &TraceParams {
        &self.params
    }

    /// Traces the route, reading replies from `conn`.
    ///
    /// Returns the reduced route, or the first error hit while sending.
    pub async fn run<C: PacketConn>(&self, conn: C) -> Result<HopTable, TracerouteError> {
        self.params.validate()?;
        let params = &self.params;

        if let Some(hostname) = &self.hostname {
            self.plugins.fire(Hook::DnsResolve {
                domain: hostname.as_str(),
            });
        }

        info!(
            destination = %self.destination,
            begin_hop = params.begin_hop,
            max_hops = params.max_hops,
            num_measurements = params.num_measurements,
            "Starting traceroute"
        );

        let mut listener = ListenerChannel::with_config(conn, self.listener_config);
        listener.start();
        let stop = listener.stop_handle();

        let ctx = Arc::new(ProbeContext {
            driver: Arc::clone(&self.driver),
            destination: self.destination,
            probe_timeout: params.timeout,
            num_measurements: params.num_measurements as usize,
            pending: PendingReplies::default(),
            state: Mutex::new(TraceState::default()),
            destination_reached: Signal::new(),
            plugins: Arc::clone(&self.plugins),
        });
        let dispatcher = tokio::spawn(dispatch_replies(
            listener,
            Arc::clone(&self.driver),
            Arc::clone(&ctx.pending),
        ));

        let limiter = ParallelLimiter::new(params.parallel_requests);
        let group = TaskGroup::new();
        let mut seq: u32 = 0;

        for ttl in params.begin_hop..=params.max_hops {
            if ctx.destination_reached.try_take() {
                debug!(ttl = ttl, "Destination reached, not probing further");
                break;
            }
            self.plugins.fire(Hook::TtlChange { ttl });

            for _ in 0..params.num_measurements {
                limiter.start().await;
                group.add();

                let key = ProbeKey { ttl, seq };
                seq = seq.wrapping_add(1);
                let slot = ProbeSlot {
                    limiter: limiter.clone(),
                    group: group.clone(),
                };
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    let _slot = slot;
                    ctx.probe(ttl, key).await;
                });
            }

            if !params.ttl_interval.is_zero() {
                tokio::time::sleep(params.ttl_interval).await;
            }
        }

        group.wait().await;
        stop.stop();
        match dispatcher.await {
            Ok(mut listener) => listener.join().await,
            Err(e) => warn!(error = %e, "Reply dispatcher failed"),
        }

        let mut state = ctx.state.lock().await;
        if let Some(e) = state.send_error.take() {
            return Err(e);
        }
        let route = reduce_final_result(
            &state.table,
            params.max_hops.saturating_add(1),
            self.destination,
        );
        info!(hops = route.len(), "Traceroute complete");
        Ok(route)
    }
}

/// Returns a probe's admission and group membership when the probe ends,
/// however it ends.
struct ProbeSlot {
    limiter: ParallelLimiter,
    group: TaskGroup,
}

impl Drop for ProbeSlot {
    fn drop(&mut self) {
        self.limiter.finished();
        self.group.done();
    }
}

impl<D: ProbeDriver> ProbeContext<D> {
    async fn probe(&self, ttl: u16, key: ProbeKey) {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(key, tx);

        let sent_at = Instant::now();
        if let Err(e) = self.driver.send_probe(ttl, key).await {
            debug!(probe = %key, error = %e, "Failed to send probe");
            self.pending.lock().await.remove(&key);
            self.state.lock().await.send_error.get_or_insert(e);
            return;
        }
        trace!(probe = %key, "Probe sent");

        let hop = match tokio::time::timeout(self.probe_timeout, rx).await {
            Ok(Ok(addr)) => TracerouteHop::reply(ttl, addr, sent_at.elapsed()),
            _ => {
                self.pending.lock().await.remove(&key);
                trace!(probe = %key, "Probe timed out");
                TracerouteHop::timeout(ttl)
            }
        };
        self.record(hop).await;
    }

    async fn record(&self, hop: TracerouteHop) {
        let ttl = hop.ttl;
        let reached = hop.reached(self.destination);
        let answered_by = hop.address.filter(|_| hop.success);

        let (new_ip, completed) = {
            let mut state = self.state.lock().await;
            let new_ip = answered_by.filter(|addr| state.seen.insert(*addr));
            let hops = state.table.entry(ttl).or_default();
            hops.push(hop);
            let completed = (hops.len() == self.num_measurements).then(|| hops.clone());
            (new_ip, completed)
        };

        if reached {
            self.destination_reached.signal();
        }
        if let Some(addr) = new_ip {
            self.plugins.fire(Hook::NewIpFound { addr });
        }
        if let Some(hops) = completed {
            self.plugins.fire(Hook::TtlCompleted { ttl, hops: &hops });
        }
    }
}

/// Hands each matched reply to the probe waiting for it.
///
/// Runs until the listener is stopped and its stream drained, then returns
/// the listener so its receive task can be joined.
async fn dispatch_replies<C: PacketConn, D: ProbeDriver>(
    mut listener: ListenerChannel<C>,
    driver: Arc<D>,
    pending: PendingReplies,
) -> ListenerChannel<C> {
    while let Some(message) = listener.recv().await {
        let datagram = match message {
            Ok(datagram) => datagram,
            Err(e) => {
                trace!(error = %e, "Listener error");
                continue;
            }
        };
        let Some((key, addr)) = driver.match_reply(&datagram) else {
            trace!(peer = %datagram.peer, "Ignoring unmatched datagram");
            continue;
        };
        match pending.lock().await.remove(&key) {
            // The probe may have timed out between lookup and send.
            Some(reply) => {
                let _ = reply.send(addr);
            }
            None => trace!(probe = %key, "Reply for a probe no longer waiting"),
        }
    }
    listener
}
