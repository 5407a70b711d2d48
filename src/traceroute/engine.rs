//! Multipath traceroute orchestration
//!
//! [`MultipathTracer`] owns one complete run: resolve the target, start
//! the capture thread, emit the full probe matrix, wait out the drain
//! window, then correlate and annotate. An instance is single-shot; a
//! second `run()` call fails with [`TracerouteError::AlreadyRan`]
//! instead of blocking behind the first.

use crate::debug_print;
use crate::dns;
use crate::net::raw::{RawIcmpSource, RawProbeSender};
use crate::net::{self, PacketSource, ProbeSender, Sniffer};
use crate::probe::{ProbeBuilder, SentProbe};
use crate::traceroute::correlate::correlate_flows;
use crate::traceroute::error::TracerouteError;
use crate::traceroute::result::TracerouteResults;
use crate::traceroute::TracerouteConfig;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Lifecycle of a tracer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Done,
}

/// Packet transport for a run: how probes leave and responses arrive.
struct Transport {
    sender: Box<dyn ProbeSender>,
    source: Box<dyn PacketSource>,
    source_addr: IpAddr,
}

/// NAT-aware multipath traceroute engine.
///
/// Construct with [`MultipathTracer::new`], then call
/// [`run`](MultipathTracer::run) exactly once.
pub struct MultipathTracer {
    config: TracerouteConfig,
    state: Mutex<RunState>,
    transport: Mutex<Option<Transport>>,
}

impl MultipathTracer {
    /// Create a tracer for the given configuration.
    ///
    /// Validation happens here; `run()` never starts with parameters
    /// that cannot produce a complete probe matrix.
    pub fn new(config: TracerouteConfig) -> Result<Self, TracerouteError> {
        config.validate().map_err(TracerouteError::ConfigError)?;
        crate::set_verbosity(config.verbose);
        Ok(Self {
            config,
            state: Mutex::new(RunState::Idle),
            transport: Mutex::new(None),
        })
    }

    /// Create a tracer that sends and captures through the supplied
    /// transport instead of raw sockets.
    ///
    /// `source_addr` is the address probes claim to originate from.
    /// This is the seam the deterministic tests plug into; it needs no
    /// privileges and touches no network.
    pub fn with_transport(
        config: TracerouteConfig,
        sender: Box<dyn ProbeSender>,
        source: Box<dyn PacketSource>,
        source_addr: IpAddr,
    ) -> Result<Self, TracerouteError> {
        let tracer = Self::new(config)?;
        *tracer.transport.lock().expect("mutex poisoned") = Some(Transport {
            sender,
            source,
            source_addr,
        });
        Ok(tracer)
    }

    /// The configuration this tracer was built with.
    pub fn config(&self) -> &TracerouteConfig {
        &self.config
    }

    /// Run the traceroute to completion.
    ///
    /// Sends `npaths x (max_ttl - min_ttl + 1)` probes, waits out the
    /// drain window, and returns the correlated per-flow results.
    /// Returns [`TracerouteError::AlreadyRan`] if this instance has
    /// already started a run.
    pub async fn run(&self) -> Result<TracerouteResults, TracerouteError> {
        {
            let mut state = self.state.lock().expect("mutex poisoned");
            if *state != RunState::Idle {
                return Err(TracerouteError::AlreadyRan);
            }
            *state = RunState::Running;
        }
        let result = self.run_inner().await;
        *self.state.lock().expect("mutex poisoned") = RunState::Done;
        result
    }

    async fn run_inner(&self) -> Result<TracerouteResults, TracerouteError> {
        let started = Instant::now();

        let target_ip = dns::resolve_target(&self.config.target, self.config.ipv6)
            .await
            .map_err(|e| TracerouteError::ResolutionError(e.to_string()))?;
        debug_print!(1, "resolved {} to {}", self.config.target, target_ip);

        let transport = match self.transport.lock().expect("mutex poisoned").take() {
            Some(transport) => transport,
            None => self.open_raw_transport(target_ip)?,
        };
        let Transport {
            sender,
            source,
            source_addr,
        } = transport;

        let builder = ProbeBuilder::new(&self.config, source_addr, target_ip)
            .map_err(|e| TracerouteError::ConfigError(e.to_string()))?;

        // The listener must be live before the first probe leaves.
        let sniffer = Sniffer::start(source);

        let mut sent: Vec<SentProbe> = Vec::with_capacity(self.config.probe_count());
        for path_index in 0..self.config.npaths {
            for ttl in self.config.min_ttl..=self.config.max_ttl {
                let packet = builder
                    .build(path_index, ttl)
                    .map_err(|e| TracerouteError::ConfigError(e.to_string()))?;
                let sent_at = Instant::now();
                let dispatched = match sender.send(&packet, target_ip) {
                    Ok(()) => true,
                    Err(e) => {
                        // A single lost probe just leaves a silent hop.
                        debug_print!(
                            1,
                            "send failed for path {path_index} ttl {ttl}: {e}"
                        );
                        false
                    }
                };
                sent.push(SentProbe {
                    packet,
                    sent_at,
                    dispatched,
                });
                if !self.config.delay.is_zero() {
                    tokio::time::sleep(self.config.delay).await;
                }
            }
        }
        debug_print!(
            1,
            "sent {} probes across {} paths",
            sent.len(),
            self.config.npaths
        );

        // Let late responses trickle in before tearing down the capture.
        tokio::time::sleep(self.config.drain_timeout).await;

        let captured = tokio::task::spawn_blocking(move || sniffer.stop())
            .await
            .map_err(|e| TracerouteError::CaptureError(e.to_string()))?;
        debug_print!(1, "captured {} packets", captured.len());

        let mut flows = correlate_flows(&self.config, target_ip, &sent, &captured);

        let destination_reached = flows
            .values()
            .flat_map(|flow| flow.hops.iter())
            .any(|hop| hop.is_destination(target_ip));

        if self.config.enable_rdns {
            annotate_hostnames(&mut flows).await;
        }

        Ok(TracerouteResults {
            target: self.config.target.clone(),
            target_ip,
            flows,
            destination_reached,
            total_duration: started.elapsed(),
        })
    }

    /// Open the real raw-socket transport for a run.
    fn open_raw_transport(&self, target_ip: IpAddr) -> Result<Transport, TracerouteError> {
        let sender = RawProbeSender::open(self.config.ipv6)
            .map_err(|e| socket_error(&e, "send"))?;
        let source = RawIcmpSource::open(self.config.ipv6)
            .map_err(|e| socket_error(&e, "capture"))?;
        // Best-effort: with no route to the target, probes still go out
        // with an unspecified source and the kernel fills it in.
        let source_addr = net::local_source_addr(target_ip).unwrap_or(match target_ip {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        });
        Ok(Transport {
            sender: Box::new(sender),
            source: Box::new(source),
            source_addr,
        })
    }
}

/// Map a raw-socket open failure to the right error variant.
fn socket_error(err: &anyhow::Error, role: &str) -> TracerouteError {
    let text = err.to_string();
    let lower = text.to_lowercase();
    if lower.contains("permission denied") || lower.contains("operation not permitted") {
        return TracerouteError::InsufficientPermissions {
            required: "root or the CAP_NET_RAW capability".to_string(),
            suggestion: "Run with sudo, or grant the binary cap_net_raw".to_string(),
        };
    }
    if role == "capture" {
        TracerouteError::CaptureError(text)
    } else {
        TracerouteError::SocketError(text)
    }
}

/// Fill in `hostname` on every responding hop, one lookup per distinct
/// address. Lookup failures leave the field empty.
async fn annotate_hostnames(flows: &mut std::collections::BTreeMap<u8, crate::traceroute::Flow>) {
    let resolver = Arc::new(dns::create_default_resolver());
    let mut cache: HashMap<IpAddr, Option<String>> = HashMap::new();

    for flow in flows.values_mut() {
        for hop in &mut flow.hops {
            let Some(addr) = hop.addr else { continue };
            let entry = match cache.get(&addr) {
                Some(cached) => cached.clone(),
                None => {
                    let looked_up = dns::reverse_dns_lookup(addr, Some(Arc::clone(&resolver)))
                        .await
                        .ok();
                    cache.insert(addr, looked_up.clone());
                    looked_up
                }
            };
            hop.hostname = entry;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbePacket;
    use anyhow::Result;
    use std::time::Duration;

    struct NullSender;

    impl ProbeSender for NullSender {
        fn send(&self, _probe: &ProbePacket, _target: IpAddr) -> Result<()> {
            Ok(())
        }
    }

    struct EmptySource;

    impl PacketSource for EmptySource {
        fn recv(&mut self, _timeout: Duration) -> Result<Option<(Vec<u8>, IpAddr)>> {
            Ok(None)
        }
    }

    fn quiet_config() -> TracerouteConfig {
        TracerouteConfig::builder()
            .target("192.0.2.1")
            .npaths(2)
            .max_ttl(2)
            .delay(Duration::ZERO)
            .drain_timeout(Duration::ZERO)
            .enable_rdns(false)
            .build()
            .unwrap()
    }

    fn mock_tracer(config: TracerouteConfig) -> MultipathTracer {
        MultipathTracer::with_transport(
            config,
            Box::new(NullSender),
            Box::new(EmptySource),
            IpAddr::V4(Ipv4Addr::new(192, 168, 0, 2)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_with_no_responses() {
        let tracer = mock_tracer(quiet_config());
        let results = tracer.run().await.unwrap();

        assert_eq!(results.flow_count(), 2);
        assert!(!results.destination_reached);
        for flow in results.flows.values() {
            assert_eq!(flow.hops.len(), 2);
            assert_eq!(flow.responding_hops(), 0);
        }
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let tracer = mock_tracer(quiet_config());
        tracer.run().await.unwrap();

        let err = tracer.run().await.unwrap_err();
        assert!(matches!(err, TracerouteError::AlreadyRan));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_construction() {
        let config = TracerouteConfig::builder()
            .target("192.0.2.1")
            .min_ttl(5)
            .max_ttl(1)
            .build();
        assert!(config.is_err());
    }

    #[tokio::test]
    async fn test_send_failures_leave_silent_hops() {
        struct FailingSender;
        impl ProbeSender for FailingSender {
            fn send(&self, _probe: &ProbePacket, _target: IpAddr) -> Result<()> {
                anyhow::bail!("network is down")
            }
        }

        let tracer = MultipathTracer::with_transport(
            quiet_config(),
            Box::new(FailingSender),
            Box::new(EmptySource),
            IpAddr::V4(Ipv4Addr::new(192, 168, 0, 2)),
        )
        .unwrap();

        // Send failures are absorbed, not fatal.
        let results = tracer.run().await.unwrap();
        assert!(!results.destination_reached);
    }

    #[tokio::test]
    async fn test_family_mismatch_is_resolution_error() {
        let config = TracerouteConfig::builder()
            .target("192.0.2.1")
            .ipv6(true)
            .drain_timeout(Duration::ZERO)
            .enable_rdns(false)
            .build()
            .unwrap();
        let tracer = MultipathTracer::with_transport(
            config,
            Box::new(NullSender),
            Box::new(EmptySource),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
        )
        .unwrap();

        let err = tracer.run().await.unwrap_err();
        assert!(matches!(err, TracerouteError::ResolutionError(_)));
    }

    #[test]
    fn test_tracer_is_send_and_sync() {
        fn is_send_sync<T: Send + Sync>() {}
        is_send_sync::<MultipathTracer>();
    }
}
